use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::gateway::{Gateway, GatewayError};
use crate::models::user::{Account, CreateAccount};
use crate::session::{CurrentUser, SessionStore};
use crate::utils::{
    pwd::{hash_password, verify_password},
    time::time_now,
    validator::validate_password,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub redirect: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: CurrentUser,
    pub redirect_to: String,
}

pub async fn register(gateway: &dyn Gateway, input: RegisterRequest) -> Result<Account> {
    input.validate()?;
    if input.password != input.confirm_password {
        return Err(Error::PasswordMismatch);
    }

    let email = input.email.trim().to_lowercase();
    let password_hash = hash_password(&input.password)?;
    let account = gateway
        .create_account(CreateAccount {
            email: email.clone(),
            password_hash,
            created_at: time_now(),
        })
        .await
        .map_err(|error| match error {
            GatewayError::Conflict(_) => Error::EmailExist(email.clone()),
            other => Error::Gateway(other),
        })?;

    info!(user_id = %account.id, "account registered");
    Ok(account)
}

pub async fn login(
    gateway: &dyn Gateway,
    sessions: &SessionStore,
    email: &str,
    password: &str,
) -> Result<(String, CurrentUser)> {
    let email = email.trim().to_lowercase();
    let Some(account) = gateway.account_by_email(&email).await? else {
        warn!("login for unknown email");
        return Err(Error::InvalidLoginDetails);
    };

    if !verify_password(password, &account.password_hash)? {
        warn!(user_id = %account.id, "login with wrong password");
        return Err(Error::InvalidLoginDetails);
    }

    let opened = sessions.open(&account.id, &account.email).await?;
    info!(user_id = %account.id, "session opened");
    Ok(opened)
}

pub async fn logout(sessions: &SessionStore, user: &CurrentUser) -> bool {
    let closed = sessions.close(&user.session_id).await;
    info!(user_id = %user.id, closed, "session closed");
    closed
}
