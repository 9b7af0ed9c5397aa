use std::sync::Arc;

use tracing::info;

use crate::config::{Backend, Config};
use crate::errors::{Error, Result};
use crate::gateway::{Gateway, memory::MemoryGateway, surreal::SurrealGateway};
use crate::session::SessionStore;
use crate::sync::notifications::SettledInvitations;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub settled: SettledInvitations,
}

impl AppState {
    pub async fn init(config: Config) -> Result<Self> {
        let gateway: Arc<dyn Gateway> = match config.backend {
            Backend::Surreal => {
                let platform = config
                    .platform
                    .as_ref()
                    .ok_or(Error::MissingConfig("PLATFORM_URL"))?;
                info!(url = %platform.url, ns = %platform.namespace, db = %platform.database, "connecting to platform");
                Arc::new(SurrealGateway::connect(platform).await?)
            }
            Backend::Memory => {
                info!("using in-memory platform");
                Arc::new(MemoryGateway::new())
            }
        };

        Ok(Self::with_gateway(config, gateway))
    }

    pub fn with_gateway(config: Config, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            sessions: SessionStore::new(&config.jwt_secret),
            settled: SettledInvitations::default(),
            config: Arc::new(config),
            gateway,
        }
    }
}
