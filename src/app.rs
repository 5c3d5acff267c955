// Service wiring shared by the CLI and the API server.

use crate::bulk::BulkOperationService;
use crate::config::AppConfig;
use crate::db::{RecordStore, SqliteStore};
use crate::notification::NotificationService;
use crate::stats::PetugasStatsService;
use crate::workflow::ValidationWorkflowService;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ClinicServices {
    pub store: Arc<dyn RecordStore>,
    pub notifications: Arc<NotificationService>,
    pub stats: Arc<PetugasStatsService>,
    pub workflow: Arc<ValidationWorkflowService>,
    pub bulk: Arc<BulkOperationService>,
}

impl ClinicServices {
    /// Open (and migrate) the configured database and build every service on it
    pub fn open(config: &AppConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.database_path).with_context(|| {
            format!("Failed to open database {}", config.database_path.display())
        })?;
        info!(path = %config.database_path.display(), "database ready");

        Ok(Self::with_store(Arc::new(store), config))
    }

    pub fn with_store(store: Arc<dyn RecordStore>, config: &AppConfig) -> Self {
        let notifications = Arc::new(NotificationService::from_config(
            &config.telegram,
            store.clone(),
        ));
        let stats = Arc::new(PetugasStatsService::new(store.clone(), &config.stats));
        let workflow = Arc::new(
            ValidationWorkflowService::new(
                store.clone(),
                config.validation.clone(),
                notifications.clone(),
            )
            .with_stats(stats.clone()),
        );
        let bulk = Arc::new(BulkOperationService::new(workflow.clone(), &config.bulk));

        ClinicServices {
            store,
            notifications,
            stats,
            workflow,
            bulk,
        }
    }
}
