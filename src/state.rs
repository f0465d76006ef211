use std::sync::Arc;

use tracing::info;

use crate::classifier::{Classifier, HttpClassifier};
use crate::config::{AppConfig, StoreConfig};
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::storage::{self, StorageClient};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub classifier: Arc<dyn Classifier>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Builds every backend from `config`. For the Postgres store the pool is
    /// returned too, so the caller can run migrations on it.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, Option<sqlx::PgPool>)> {
        let mut pool = None;
        let store: Arc<dyn Store> = match &config.store {
            StoreConfig::Postgres { database_url } => {
                let pg = PgStore::connect(database_url).await?;
                pool = Some(pg.pool().clone());
                Arc::new(pg)
            }
            StoreConfig::Memory => {
                info!("using in-memory store; data is lost on exit");
                Arc::new(MemoryStore::new())
            }
        };

        let storage = storage::from_config(&config.storage).await?;
        let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(&config.classifier)?);
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => Arc::new(LogMailer),
        };

        let state = Self {
            store,
            config: Arc::new(config),
            storage,
            classifier,
            mailer,
        };
        Ok((state, pool))
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        crate::testing::Harness::new().state
    }
}
