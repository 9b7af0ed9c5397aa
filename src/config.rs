use std::env;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Surreal,
    Memory,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PriceIds {
    pub monthly: Option<String>,
    pub yearly: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    /// Absent for the in-memory backend.
    pub platform: Option<PlatformConfig>,
    pub app_origin: String,
    pub jwt_secret: String,
    pub webhook_secret: Option<String>,
    pub prices: PriceIds,
    pub bind_addr: String,
}

fn env_required(name: &'static str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(Error::MissingConfig(name))
}

fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend = match env_or("PLATFORM_BACKEND", "surreal").as_str() {
            "memory" => Backend::Memory,
            "surreal" => Backend::Surreal,
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown PLATFORM_BACKEND `{other}`"
                )));
            }
        };

        let platform = match backend {
            Backend::Surreal => Some(PlatformConfig {
                url: env_required("PLATFORM_URL")?,
                user: env_required("PLATFORM_USER")?,
                password: env_required("PLATFORM_PASSWORD")?,
                namespace: env_or("PLATFORM_NAMESPACE", "sharelist"),
                database: env_or("PLATFORM_DATABASE", "sharelist"),
            }),
            Backend::Memory => None,
        };

        Ok(Self {
            backend,
            platform,
            app_origin: env_required("APP_ORIGIN")?
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: env_required("JWT_SECRET")?,
            webhook_secret: env_optional("STRIPE_WEBHOOK_SECRET"),
            prices: PriceIds {
                monthly: env_optional("STRIPE_PRICE_MONTHLY"),
                yearly: env_optional("STRIPE_PRICE_YEARLY"),
            },
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:3587"),
        })
    }

    /// Memory-backed configuration used by tests and local runs.
    pub fn for_memory(app_origin: &str, jwt_secret: &str) -> Self {
        Self {
            backend: Backend::Memory,
            platform: None,
            app_origin: app_origin.trim_end_matches('/').to_string(),
            jwt_secret: jwt_secret.to_string(),
            webhook_secret: None,
            prices: PriceIds {
                monthly: None,
                yearly: None,
            },
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }
}
