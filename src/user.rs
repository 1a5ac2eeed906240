use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    error::{Error, Result},
    store::{Store, UserRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[repr(i64)]
pub enum Role {
    Learner = 0,
    Tutor = 1,
    Admin = 2,
}

impl TryFrom<i64> for Role {
    type Error = anyhow::Error;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Role::Learner,
            1 => Role::Tutor,
            2 => Role::Admin,
            _ => anyhow::bail!("unknown role {}", value),
        })
    }
}

impl Role {
    pub fn can_tutor(&self) -> bool {
        matches!(self, Role::Tutor | Role::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl TryFrom<UserRecord> for UserInfo {
    type Error = Error;
    fn try_from(record: UserRecord) -> Result<Self> {
        Ok(UserInfo {
            id: record.id,
            name: record.name,
            email: record.email,
            role: Role::try_from(record.role)?,
        })
    }
}

pub async fn create_user(
    store: &Store,
    name: String,
    email: String,
    password: String,
    role: Role,
) -> Result<i64> {
    let email = email.trim().to_lowercase();
    if name.trim().is_empty() || email.is_empty() || password.is_empty() {
        return Err(Error::BadRequest(
            "name, email and password are required".to_string(),
        ));
    }
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(Error::Conflict(format!("email {} is already registered", email)));
    }
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    let id = store.insert_user(name.trim(), &email, &password_hash, role).await?;
    info!("created {:?} account {} for {}", role, id, email);
    Ok(id)
}

/// Verifies credentials; unknown email and wrong password are indistinguishable
pub async fn login(store: &Store, email: &str, password: &str) -> Result<UserInfo> {
    let email = email.trim().to_lowercase();
    let user = store
        .find_user_by_email(&email)
        .await?
        .ok_or(Error::Unauthorized)?;
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| Error::Unauthorized)?;
    UserInfo::try_from(user)
}

pub async fn get_user_info(store: &Store, id: i64) -> Result<UserInfo> {
    store.get_user(id).await?.ok_or(Error::not_found("user", id))
}

pub async fn list_users(store: &Store) -> Result<Vec<UserInfo>> {
    store.list_users().await
}
