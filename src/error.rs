// Error taxonomy of the validation workflow.
//
// Everything except `Storage` is an expected outcome and is reported back to
// callers as `{success: false, error}`; `Storage` means the database itself
// failed and is surfaced as a hard error.

use crate::records::{RecordKind, ValidationStatus};
use crate::roles::ApprovalTier;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("incomplete data: missing {}", .missing.join(", "))]
    IncompleteData { missing: Vec<String> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} #{id} not found")]
    NotFound { kind: RecordKind, id: i64 },

    #[error("unknown model type '{0}'")]
    UnknownModelType(String),

    #[error("record has not yet been submitted for validation")]
    NotSubmitted,

    #[error("record has already been submitted for validation")]
    AlreadySubmitted,

    #[error("record has already been approved")]
    AlreadyApproved,

    #[error("record has already been processed (status: {status})")]
    AlreadyProcessed { status: ValidationStatus },

    #[error("record is awaiting revision and must be resubmitted first")]
    AwaitingRevision,

    #[error("record is not awaiting revision")]
    NotInRevision,

    #[error("record can no longer be modified (status: {status})")]
    NotEditable { status: ValidationStatus },

    #[error(
        "insufficient permissions: {required} approval required, role '{role}' has {actual}"
    )]
    InsufficientPermission {
        required: ApprovalTier,
        actual: ApprovalTier,
        role: String,
    },

    #[error("a reason is required")]
    MissingReason,

    #[error("record was modified concurrently, reload and retry")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Expected failures are returned as values, never as hard errors
    pub fn is_expected(&self) -> bool {
        !matches!(self, WorkflowError::Storage(_))
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::IncompleteData { .. } => "incomplete_data",
            WorkflowError::InvalidInput(_) => "invalid_input",
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::UnknownModelType(_) => "unknown_model_type",
            WorkflowError::NotSubmitted => "not_submitted",
            WorkflowError::AlreadySubmitted => "already_submitted",
            WorkflowError::AlreadyApproved => "already_approved",
            WorkflowError::AlreadyProcessed { .. } => "already_processed",
            WorkflowError::AwaitingRevision => "awaiting_revision",
            WorkflowError::NotInRevision => "not_in_revision",
            WorkflowError::NotEditable { .. } => "not_editable",
            WorkflowError::InsufficientPermission { .. } => "insufficient_permissions",
            WorkflowError::MissingReason => "missing_reason",
            WorkflowError::Conflict => "conflict",
            WorkflowError::Storage(_) => "storage",
        }
    }

    /// Invalid state transitions as a group
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            WorkflowError::NotSubmitted
                | WorkflowError::AlreadySubmitted
                | WorkflowError::AlreadyApproved
                | WorkflowError::AlreadyProcessed { .. }
                | WorkflowError::AwaitingRevision
                | WorkflowError::NotInRevision
                | WorkflowError::NotEditable { .. }
        )
    }

    pub fn incomplete(missing: &[&str]) -> Self {
        WorkflowError::IncompleteData {
            missing: missing.iter().map(|m| m.to_string()).collect(),
        }
    }
}
