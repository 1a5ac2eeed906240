use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use roadmap_tutor::{
    ai_utils::{AiCollaborator, OpenAiCompleter},
    config::Config,
    server::{AppState, build_app, session_store},
    store::Store,
    utils::init_log,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Roadmap tutor web server")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    database: Option<PathBuf>,
    #[arg(short = 'H', long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    /// Directory for daily rotated log files, stdout when absent
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_log(args.log_dir.clone())?;

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.server.database = database;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store = Store::connect(&config.server.database).await?;
    store.init_schema().await?;
    let sessions = session_store(&store).await?;
    let ai = AiCollaborator::new(Arc::new(OpenAiCompleter::from_env()?), &config.ai);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let tls = config
        .server
        .tls_paths()
        .map(|(cert, key)| (cert.to_path_buf(), key.to_path_buf()));
    let app = build_app(AppState::new(store, ai, config), sessions);

    match tls {
        Some((cert, key)) => {
            rustls::crypto::aws_lc_rs::default_provider()
                .install_default()
                .map_err(|e| anyhow::anyhow!("Failed to initialize rustls crypto provider: {:?}", e))?;
            let tls_config = RustlsConfig::from_pem_file(cert, key).await?;
            info!("Starting server at https://{}", addr);
            info!("Swagger UI available at https://{}/swagger-ui/", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("Starting server at http://{}", addr);
            info!("Swagger UI available at http://{}/swagger-ui/", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }
    Ok(())
}
