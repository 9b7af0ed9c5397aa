use argon2::password_hash::Error as ArError;
use axum::{Json, http::StatusCode, response::IntoResponse};
use jsonwebtoken::errors::Error as JWError;
use serde_json::json;

use thiserror::Error;
use tracing::error;

use crate::gateway::GatewayError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Argon 2 Error: {0}")]
    Argon2Error(#[from] ArError),

    #[error("Jason web token Error: {0}")]
    JwTError(#[from] JWError),

    #[error("Gateway Error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Validator Error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Json Rejection Error: {0}")]
    AxumJsonRejection(#[from] axum::extract::rejection::JsonRejection),

    #[error("Missing required configuration `{0}`")]
    MissingConfig(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Invalid login detail")]
    InvalidLoginDetails,

    #[error("User with email `{0}` already exists!")]
    EmailExist(String),

    #[error("Not Found")]
    NotFound,

    #[error("Access denied")]
    AccessDenied,

    // ! Auth
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid authorization token")]
    InvalidToken,
    #[error("Invalid authorization scheme")]
    InvalidScheme,
    #[error("Token expired")]
    TokenExpired,

    // ! Invitations
    #[error("Invitation is invalid or has expired")]
    InvitationInvalidOrExpired,
    #[error("Invitation has already been answered")]
    InvitationClosed,
    #[error("Failed to update invitation: {0}")]
    InvitationUpdate(GatewayError),
    #[error("Failed to check list membership: {0}")]
    MembershipCheck(GatewayError),
    #[error("Failed to add list membership: {0}")]
    MembershipInsert(GatewayError),

    // ! Webhooks
    #[error("Missing webhook signature or secret")]
    MissingWebhookSecret,
    #[error("Webhook signature verification failed: {0}")]
    WebhookSignature(String),
    #[error("Invalid webhook payload: {0}")]
    WebhookPayload(String),
    #[error("Failed to apply webhook event: {0}")]
    WebhookDispatch(GatewayError),
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Error".to_string(),
    )
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Error::Argon2Error(error) => {
                error!("Argon 2 Error:{:#?}", error);
                internal()
            }
            Error::JwTError(error) => {
                error!("JWT Error:{:#?}", error);
                internal()
            }
            Error::Gateway(GatewayError::NotFound) => {
                (StatusCode::NOT_FOUND, "Not Found".to_string())
            }
            Error::Gateway(GatewayError::Conflict(what)) => {
                (StatusCode::CONFLICT, format!("Already exists: {}", what))
            }
            Error::Gateway(error) => {
                error!("Gateway Error:{:#?}", error);
                internal()
            }
            Error::IoError(error) => {
                error!("Io  Error:{:#?}", error);
                internal()
            }
            Error::MissingConfig(name) => {
                error!("Missing configuration {}", name);
                internal()
            }
            Error::ValidationError(error) => {
                let message = format!("Input validation error: [{}]", error).replace('\n', ", ");
                error!("Validation Error:{:#?}", error);
                (StatusCode::BAD_REQUEST, message)
            }
            Error::AxumJsonRejection(error) => {
                error!("Axum Json Rejection Error:{:#?}", error);
                (StatusCode::BAD_REQUEST, error.to_string())
            }
            Error::InvalidInput(reason) => (StatusCode::BAD_REQUEST, reason),
            Error::PasswordMismatch => {
                (StatusCode::BAD_REQUEST, "Passwords do not match".to_string())
            }
            Error::InvalidLoginDetails => {
                error!("Invalid login details");
                (StatusCode::BAD_REQUEST, "Invalid Login Details".to_string())
            }
            Error::EmailExist(email) => (
                StatusCode::BAD_REQUEST,
                format!("User with email {} already exists!", email),
            ),
            Error::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            Error::AccessDenied => (StatusCode::FORBIDDEN, "Access denied".to_string()),
            Error::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Missing authorization token".to_string(),
            ),
            Error::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid authorization token".to_string(),
            ),
            Error::InvalidScheme => (
                StatusCode::UNAUTHORIZED,
                "Invalid authorization scheme".to_string(),
            ),
            Error::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired".to_string()),
            Error::InvitationInvalidOrExpired => (
                StatusCode::GONE,
                "Invitation is invalid or has expired".to_string(),
            ),
            Error::InvitationClosed => (
                StatusCode::CONFLICT,
                "Invitation has already been answered".to_string(),
            ),
            Error::InvitationUpdate(error) => {
                error!("Invitation update failed:{:#?}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to update invitation".to_string(),
                )
            }
            Error::MembershipCheck(error) => {
                error!("Membership check failed:{:#?}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to check list membership".to_string(),
                )
            }
            Error::MembershipInsert(error) => {
                error!("Membership insert failed:{:#?}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to add list membership".to_string(),
                )
            }
            Error::MissingWebhookSecret => (
                StatusCode::BAD_REQUEST,
                "Missing webhook signature or secret".to_string(),
            ),
            Error::WebhookSignature(reason) => {
                error!("Webhook signature rejected: {}", reason);
                (StatusCode::BAD_REQUEST, reason)
            }
            Error::WebhookPayload(reason) => {
                error!("Webhook payload rejected: {}", reason);
                (StatusCode::BAD_REQUEST, reason)
            }
            Error::WebhookDispatch(error) => {
                error!("Webhook dispatch failed:{:#?}", error);
                (
                    StatusCode::BAD_REQUEST,
                    "Failed to apply webhook event".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
