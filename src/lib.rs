pub mod ai_utils;
pub mod api;
pub mod assessment;
pub mod config;
pub mod content;
pub mod error;
pub mod progress;
pub mod roadmap;
pub mod server;
pub mod store;
pub mod tutor;
pub mod user;
pub mod utils;

#[cfg(test)]
mod testing;
