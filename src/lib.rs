// Clinic Validation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod app;
pub mod audit;
pub mod bulk;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notification;
pub mod records;
pub mod roles;
pub mod stats;
pub mod workflow;

// Re-export commonly used types
pub use app::ClinicServices;
pub use audit::{AuditAction, AuditEntry};
pub use bulk::{BulkOperationService, BulkResult, RowError};
pub use config::{AppConfig, ConfigError, KindThresholds, ValidationConfig};
pub use db::{
    setup_database, timestamp_now, InsertOutcome, RecordFilter, RecordStore, SqliteStore,
};
pub use error::WorkflowError;
pub use notification::{
    DatabaseNotifier, DeliveryReport, LogNotifier, Notification, NotificationService, Notifier,
    Recipient, TelegramNotifier,
};
pub use records::{
    NewRecord, ProcedureStatus, RecordDetails, RecordKind, RecordUpdate, ValidatableRecord,
    ValidationStatus,
};
pub use roles::{Actor, ApprovalTier, SYSTEM_ACTOR_ID};
pub use stats::{PetugasStats, PetugasStatsService, PetugasSummary, StatsPeriod};
pub use workflow::{
    BatchAction, BatchItemError, BatchResult, DecisionOptions, ValidationStats,
    ValidationWorkflowService, WorkflowResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
