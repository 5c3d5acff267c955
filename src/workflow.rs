// ✅ Validation workflow - submission, auto-approval and role-gated sign-off
//
//   pending ──submit──▶ pending[submitted] ──approve──▶ approved   (terminal)
//      │                    │      │
//      │ (below threshold)  │      └──reject──▶ rejected           (terminal)
//      └──────▶ approved    └──request revision──▶ revision ──resubmit──▶ pending[submitted]
//
// Every operation takes the acting user explicitly. Expected failures are
// `WorkflowError` values; only storage failures are hard errors.

use crate::audit::{AuditAction, AuditEntry};
use crate::config::ValidationConfig;
use crate::db::{timestamp_now, InsertOutcome, RecordFilter, RecordStore};
use crate::error::WorkflowError;
use crate::notification::{Notification, NotificationService, Recipient};
use crate::records::{
    NewRecord, ProcedureStatus, RecordKind, RecordUpdate, ValidatableRecord, ValidationStatus,
};
use crate::roles::{Actor, ApprovalTier, SYSTEM_ACTOR_ID};
use crate::stats::PetugasStatsService;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// RESULT SHAPES
// ============================================================================

/// `{success, status?, error?, auto_approved?, requires_approval_from?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<RecordKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ValidationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_approval_from: Option<ApprovalTier>,
}

impl WorkflowResult {
    fn for_record(record: &ValidatableRecord) -> Self {
        WorkflowResult {
            success: true,
            model_type: Some(record.kind),
            record_id: Some(record.id),
            status: Some(record.status_validasi),
            error: None,
            error_code: None,
            auto_approved: None,
            requires_approval_from: None,
        }
    }

    pub fn failure(kind: RecordKind, id: i64, err: &WorkflowError) -> Self {
        WorkflowResult {
            success: false,
            model_type: Some(kind),
            record_id: Some(id),
            status: None,
            error: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
            auto_approved: None,
            requires_approval_from: None,
        }
    }

    /// Fold expected failures into `success: false`; storage failures stay errors
    pub fn settle(
        kind: RecordKind,
        id: i64,
        outcome: Result<WorkflowResult, WorkflowError>,
    ) -> anyhow::Result<WorkflowResult> {
        match outcome {
            Ok(result) => Ok(result),
            Err(WorkflowError::Storage(e)) => Err(e),
            Err(e) => Ok(WorkflowResult::failure(kind, id, &e)),
        }
    }
}

/// Options shared by approve / reject / request revision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionOptions {
    /// Free-text note stored with an approval
    #[serde(default)]
    pub comment: Option<String>,
    /// Skip notifying the submitter
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Approve,
    Reject,
}

impl BatchAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Some(BatchAction::Approve),
            "reject" => Some(BatchAction::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub id: i64,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// True when no item failed
    pub success: bool,
    pub processed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub failed: usize,
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub model_type: Option<RecordKind>,
    pub window_days: u32,
    /// None when the window is unbounded
    pub since: Option<DateTime<Utc>>,
    pub total: usize,
    pub pending: usize,
    /// Pending and submitted, i.e. waiting on an approver
    pub awaiting_decision: usize,
    pub approved: usize,
    pub rejected: usize,
    pub revision: usize,
    pub auto_approved: usize,
    pub total_amount: Decimal,
    pub approved_amount: Decimal,
    /// Percentage of records in the window that are approved
    pub approval_rate: f64,
    /// Mean submit → approve time for manual approvals
    pub avg_approval_hours: Option<f64>,
}

fn check_new_record(new: &NewRecord) -> Result<(), WorkflowError> {
    if new.amount <= Decimal::ZERO {
        return Err(WorkflowError::InvalidInput(format!(
            "amount must be positive, got {}",
            new.amount
        )));
    }
    if new.input_by.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("input_by is required".to_string()));
    }
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn rupiah(amount: Decimal) -> String {
    format!("Rp {}", amount.normalize())
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ValidationWorkflowService {
    store: Arc<dyn RecordStore>,
    config: ValidationConfig,
    notifications: Arc<NotificationService>,
    stats: Option<Arc<PetugasStatsService>>,
}

impl ValidationWorkflowService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: ValidationConfig,
        notifications: Arc<NotificationService>,
    ) -> Self {
        ValidationWorkflowService {
            store,
            config,
            notifications,
            stats: None,
        }
    }

    /// Invalidate cached petugas stats whenever a record changes
    pub fn with_stats(mut self, stats: Arc<PetugasStatsService>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // ========================================================================
    // RECORD CRUD (only while editable)
    // ========================================================================

    pub fn create_record(
        &self,
        new: &NewRecord,
        actor: &Actor,
    ) -> Result<InsertOutcome, WorkflowError> {
        check_new_record(new)?;

        let outcome = self.store.insert_record(new, &actor.id)?;
        self.record_created(&outcome, new, actor);
        Ok(outcome)
    }

    /// Create a batch of records in one storage transaction. Rows that fail
    /// validation never reach the store; the rest are written together.
    pub fn create_records(
        &self,
        batch: &[NewRecord],
        actor: &Actor,
    ) -> Result<Vec<Result<InsertOutcome, WorkflowError>>, WorkflowError> {
        let checks: Vec<Result<(), WorkflowError>> = batch.iter().map(check_new_record).collect();
        let valid: Vec<NewRecord> = batch
            .iter()
            .zip(&checks)
            .filter(|(_, check)| check.is_ok())
            .map(|(new, _)| new.clone())
            .collect();

        let mut stored = self.store.insert_records(&valid, &actor.id)?.into_iter();

        let mut outcomes = Vec::with_capacity(batch.len());
        for (new, check) in batch.iter().zip(checks) {
            let outcome = match check {
                Err(e) => Err(e),
                Ok(()) => match stored.next() {
                    Some(Ok(outcome)) => {
                        self.record_created(&outcome, new, actor);
                        Ok(outcome)
                    }
                    Some(Err(e)) => Err(WorkflowError::from(e)),
                    None => Err(WorkflowError::from(anyhow::anyhow!(
                        "store returned fewer outcomes than rows"
                    ))),
                },
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn record_created(&self, outcome: &InsertOutcome, new: &NewRecord, actor: &Actor) {
        match outcome {
            InsertOutcome::Inserted(record) => {
                info!(kind = %record.kind, id = record.id, actor = %actor.id, "record created");
                self.invalidate_stats(&record.input_by);
            }
            InsertOutcome::Duplicate => {
                debug!(kind = %new.kind(), "duplicate record skipped");
            }
        }
    }

    pub fn get_record(&self, kind: RecordKind, id: i64) -> Result<ValidatableRecord, WorkflowError> {
        match self.store.get_record(kind, id)? {
            Some(record) if !record.is_deleted() => Ok(record),
            _ => Err(WorkflowError::NotFound { kind, id }),
        }
    }

    pub fn update_record(
        &self,
        kind: RecordKind,
        id: i64,
        update: &RecordUpdate,
        actor: &Actor,
    ) -> Result<ValidatableRecord, WorkflowError> {
        let mut record = self.get_record(kind, id)?;

        if !record.is_editable() {
            return Err(WorkflowError::NotEditable {
                status: record.status_validasi,
            });
        }
        if update.is_empty() {
            return Err(WorkflowError::InvalidInput("nothing to update".to_string()));
        }
        if let Some(details) = &update.details {
            if details.kind() != kind {
                return Err(WorkflowError::InvalidInput(format!(
                    "details of kind {} cannot be applied to {}",
                    details.kind(),
                    kind
                )));
            }
        }
        if let Some(amount) = update.amount {
            if amount <= Decimal::ZERO {
                return Err(WorkflowError::InvalidInput(format!(
                    "amount must be positive, got {}",
                    amount
                )));
            }
        }

        let before_amount = record.amount;
        if let Some(amount) = update.amount {
            record.amount = amount;
        }
        if let Some(tanggal) = update.tanggal {
            record.tanggal = tanggal;
        }
        if let Some(details) = &update.details {
            record.details = details.clone();
        }
        record.updated_at = timestamp_now();

        let entry = AuditEntry::new(
            &actor.id,
            AuditAction::Updated,
            kind,
            id,
            serde_json::json!({
                "amount": {"from": before_amount.to_string(), "to": record.amount.to_string()},
                "update": update,
            }),
        );

        self.commit(record, entry, AuditAction::Updated)
    }

    /// Soft delete; only records still pending may be removed
    pub fn delete_record(
        &self,
        kind: RecordKind,
        id: i64,
        actor: &Actor,
    ) -> Result<ValidatableRecord, WorkflowError> {
        let mut record = self.get_record(kind, id)?;

        if record.status_validasi != ValidationStatus::Pending {
            return Err(WorkflowError::NotEditable {
                status: record.status_validasi,
            });
        }

        let now = timestamp_now();
        record.deleted_at = Some(now);
        record.updated_at = now;

        let entry = AuditEntry::new(
            &actor.id,
            AuditAction::Deleted,
            kind,
            id,
            serde_json::json!({"amount": record.amount.to_string()}),
        );

        let record = self.commit(record, entry, AuditAction::Deleted)?;
        info!(kind = %kind, id, actor = %actor.id, "record soft-deleted");
        Ok(record)
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    pub fn submit_for_validation(
        &self,
        kind: RecordKind,
        id: i64,
        actor: &Actor,
    ) -> Result<WorkflowResult, WorkflowError> {
        let mut record = self.get_record(kind, id)?;

        match record.status_validasi {
            ValidationStatus::Approved | ValidationStatus::Rejected => {
                return Err(WorkflowError::AlreadyProcessed {
                    status: record.status_validasi,
                });
            }
            ValidationStatus::Revision => return Err(WorkflowError::AwaitingRevision),
            ValidationStatus::Pending if record.is_submitted() => {
                return Err(WorkflowError::AlreadySubmitted);
            }
            ValidationStatus::Pending => {}
        }

        let missing = record.missing_required_fields();
        if !missing.is_empty() {
            warn!(kind = %kind, id, ?missing, "submission rejected: incomplete data");
            return Err(WorkflowError::incomplete(&missing));
        }

        let now = timestamp_now();
        record.submitted_at = Some(now);
        record.submitted_by = Some(actor.id.clone());
        record.updated_at = now;

        let thresholds = self.config.thresholds(kind).clone();

        match self.config.required_tier(kind, record.amount) {
            None => {
                record.status_validasi = ValidationStatus::Approved;
                record.approved_by = Some(SYSTEM_ACTOR_ID.to_string());
                record.approved_at = Some(now);
                record.auto_approved = true;
                record.required_tier = None;
                if kind == RecordKind::Tindakan {
                    record.status = Some(ProcedureStatus::Selesai);
                }

                let entry = AuditEntry::new(
                    &actor.id,
                    AuditAction::Approved,
                    kind,
                    id,
                    serde_json::json!({
                        "auto_approved": true,
                        "approved_by": SYSTEM_ACTOR_ID,
                        "amount": record.amount.to_string(),
                        "threshold": thresholds.auto_approve_below.to_string(),
                    }),
                );

                let record = self.commit(record, entry, AuditAction::Submitted)?;
                info!(kind = %kind, id, amount = %record.amount, "auto-approved on submission");

                self.notify(
                    Notification::new(
                        Recipient::User(record.input_by.clone()),
                        "Disetujui otomatis",
                        &format!(
                            "{} #{} sebesar {} disetujui otomatis oleh sistem",
                            kind.label(),
                            id,
                            rupiah(record.amount)
                        ),
                    )
                    .about(kind, id),
                );

                let mut result = WorkflowResult::for_record(&record);
                result.auto_approved = Some(true);
                Ok(result)
            }
            Some(tier) => {
                record.required_tier = Some(tier);

                let entry = AuditEntry::new(
                    &actor.id,
                    AuditAction::Submitted,
                    kind,
                    id,
                    serde_json::json!({
                        "auto_approved": false,
                        "requires_approval_from": tier,
                        "amount": record.amount.to_string(),
                    }),
                );

                let record = self.commit(record, entry, AuditAction::Submitted)?;
                info!(kind = %kind, id, tier = %tier, "submitted for validation");

                self.notify_approvers(&record, tier, "Validasi diperlukan");

                let mut result = WorkflowResult::for_record(&record);
                result.auto_approved = Some(false);
                result.requires_approval_from = Some(tier);
                Ok(result)
            }
        }
    }

    // ========================================================================
    // DECISIONS
    // ========================================================================

    pub fn approve(
        &self,
        kind: RecordKind,
        id: i64,
        actor: &Actor,
        opts: &DecisionOptions,
    ) -> Result<WorkflowResult, WorkflowError> {
        let mut record = self.get_record(kind, id)?;
        ensure_decidable(&record, AuditAction::Approved)?;
        let required = self.ensure_authority(&record, actor)?;

        let now = timestamp_now();
        record.status_validasi = ValidationStatus::Approved;
        record.approved_by = Some(actor.id.clone());
        record.approved_at = Some(now);
        record.approval_comment = opts.comment.clone();
        record.updated_at = now;
        if kind == RecordKind::Tindakan {
            record.status = Some(ProcedureStatus::Selesai);
        }

        let entry = AuditEntry::new(
            &actor.id,
            AuditAction::Approved,
            kind,
            id,
            serde_json::json!({
                "auto_approved": false,
                "role": actor.role,
                "required_tier": required,
                "comment": opts.comment,
            }),
        );

        let record = self.commit(record, entry, AuditAction::Approved)?;
        info!(kind = %kind, id, actor = %actor.id, "record approved");

        if !opts.silent {
            self.notify(
                Notification::new(
                    Recipient::User(record.input_by.clone()),
                    "Data disetujui",
                    &format!("{} #{} disetujui oleh {}", kind.label(), id, actor.id),
                )
                .about(kind, id),
            );
        }

        let mut result = WorkflowResult::for_record(&record);
        result.auto_approved = Some(false);
        Ok(result)
    }

    pub fn reject(
        &self,
        kind: RecordKind,
        id: i64,
        reason: &str,
        actor: &Actor,
        opts: &DecisionOptions,
    ) -> Result<WorkflowResult, WorkflowError> {
        let reason = required_reason(reason)?;
        let mut record = self.get_record(kind, id)?;
        ensure_decidable(&record, AuditAction::Rejected)?;
        self.ensure_authority(&record, actor)?;

        let now = timestamp_now();
        record.status_validasi = ValidationStatus::Rejected;
        record.rejected_by = Some(actor.id.clone());
        record.rejected_at = Some(now);
        record.rejection_reason = Some(reason.clone());
        record.updated_at = now;
        if kind == RecordKind::Tindakan {
            record.status = Some(ProcedureStatus::Batal);
        }

        let entry = AuditEntry::new(
            &actor.id,
            AuditAction::Rejected,
            kind,
            id,
            serde_json::json!({"role": actor.role, "reason": reason}),
        );

        let record = self.commit(record, entry, AuditAction::Rejected)?;
        info!(kind = %kind, id, actor = %actor.id, "record rejected");

        if !opts.silent {
            self.notify(
                Notification::new(
                    Recipient::User(record.input_by.clone()),
                    "Data ditolak",
                    &format!("{} #{} ditolak: {}", kind.label(), id, reason),
                )
                .about(kind, id),
            );
        }

        Ok(WorkflowResult::for_record(&record))
    }

    pub fn request_revision(
        &self,
        kind: RecordKind,
        id: i64,
        reason: &str,
        actor: &Actor,
        opts: &DecisionOptions,
    ) -> Result<WorkflowResult, WorkflowError> {
        let reason = required_reason(reason)?;
        let mut record = self.get_record(kind, id)?;
        ensure_decidable(&record, AuditAction::RevisionRequested)?;
        self.ensure_authority(&record, actor)?;

        let now = timestamp_now();
        record.status_validasi = ValidationStatus::Revision;
        record.revision_requested_by = Some(actor.id.clone());
        record.revision_requested_at = Some(now);
        record.revision_reason = Some(reason.clone());
        record.updated_at = now;

        let entry = AuditEntry::new(
            &actor.id,
            AuditAction::RevisionRequested,
            kind,
            id,
            serde_json::json!({"role": actor.role, "reason": reason}),
        );

        let record = self.commit(record, entry, AuditAction::RevisionRequested)?;
        info!(kind = %kind, id, actor = %actor.id, "revision requested");

        if !opts.silent {
            self.notify(
                Notification::new(
                    Recipient::User(record.input_by.clone()),
                    "Revisi diperlukan",
                    &format!("{} #{} perlu direvisi: {}", kind.label(), id, reason),
                )
                .about(kind, id),
            );
        }

        Ok(WorkflowResult::for_record(&record))
    }

    /// Back to pending[submitted]; never auto-approves
    pub fn resubmit_after_revision(
        &self,
        kind: RecordKind,
        id: i64,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<WorkflowResult, WorkflowError> {
        let mut record = self.get_record(kind, id)?;

        match record.status_validasi {
            ValidationStatus::Revision => {}
            ValidationStatus::Approved => return Err(WorkflowError::AlreadyApproved),
            ValidationStatus::Rejected => {
                return Err(WorkflowError::AlreadyProcessed {
                    status: record.status_validasi,
                });
            }
            _ => return Err(WorkflowError::NotInRevision),
        }

        let missing = record.missing_required_fields();
        if !missing.is_empty() {
            return Err(WorkflowError::incomplete(&missing));
        }

        let tier = self
            .config
            .required_tier(kind, record.amount)
            .unwrap_or(ApprovalTier::Supervisor);
        let previous_reason = record.revision_reason.take();

        let now = timestamp_now();
        record.status_validasi = ValidationStatus::Pending;
        record.submitted_at = Some(now);
        record.submitted_by = Some(actor.id.clone());
        record.required_tier = Some(tier);
        record.revision_requested_by = None;
        record.revision_requested_at = None;
        record.updated_at = now;

        let entry = AuditEntry::new(
            &actor.id,
            AuditAction::Resubmitted,
            kind,
            id,
            serde_json::json!({
                "notes": notes,
                "previous_revision_reason": previous_reason,
                "requires_approval_from": tier,
                "amount": record.amount.to_string(),
            }),
        );

        let record = self.commit(record, entry, AuditAction::Resubmitted)?;
        info!(kind = %kind, id, tier = %tier, "resubmitted after revision");

        self.notify_approvers(&record, tier, "Revisi dikirim ulang");

        let mut result = WorkflowResult::for_record(&record);
        result.auto_approved = Some(false);
        result.requires_approval_from = Some(tier);
        Ok(result)
    }

    // ========================================================================
    // BATCH
    // ========================================================================

    /// Each id is decided independently; a failing id never stops the batch
    pub fn batch_approval(
        &self,
        ids: &[i64],
        kind: RecordKind,
        action: BatchAction,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<BatchResult, WorkflowError> {
        let reason = match action {
            BatchAction::Reject => required_reason(reason.unwrap_or_default())?,
            BatchAction::Approve => String::new(),
        };
        let opts = DecisionOptions::default();
        let mut result = BatchResult::default();

        for &id in ids {
            result.processed += 1;

            let outcome = match action {
                BatchAction::Approve => self.approve(kind, id, actor, &opts),
                BatchAction::Reject => self.reject(kind, id, &reason, actor, &opts),
            };

            match outcome {
                Ok(_) => match action {
                    BatchAction::Approve => result.approved += 1,
                    BatchAction::Reject => result.rejected += 1,
                },
                Err(e) => {
                    if !e.is_expected() {
                        error!(kind = %kind, id, "batch item failed: {}", e);
                    }
                    result.failed += 1;
                    result.errors.push(BatchItemError {
                        id,
                        code: e.code().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.success = result.failed == 0;
        info!(
            kind = %kind,
            processed = result.processed,
            approved = result.approved,
            rejected = result.rejected,
            failed = result.failed,
            "batch {:?} finished",
            action
        );

        Ok(result)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Counts over records created in the trailing `window_days`
    pub fn get_validation_stats(
        &self,
        kind: Option<RecordKind>,
        window_days: u32,
    ) -> Result<ValidationStats, WorkflowError> {
        // a window reaching past the calendar's start means "everything"
        let since =
            timestamp_now().checked_sub_signed(Duration::days(i64::from(window_days)));
        let records = self.store.list_records(&RecordFilter {
            kind,
            created_since: since,
            ..Default::default()
        })?;

        let count = |status: ValidationStatus| {
            records
                .iter()
                .filter(|r| r.status_validasi == status)
                .count()
        };

        let total = records.len();
        let approved = count(ValidationStatus::Approved);

        let approval_hours: Vec<f64> = records
            .iter()
            .filter(|r| r.status_validasi == ValidationStatus::Approved && !r.auto_approved)
            .filter_map(|r| match (r.submitted_at, r.approved_at) {
                (Some(submitted), Some(approved_at)) => {
                    Some((approved_at - submitted).num_seconds() as f64 / 3600.0)
                }
                _ => None,
            })
            .collect();

        let avg_approval_hours = if approval_hours.is_empty() {
            None
        } else {
            Some(round2(
                approval_hours.iter().sum::<f64>() / approval_hours.len() as f64,
            ))
        };

        Ok(ValidationStats {
            model_type: kind,
            window_days,
            since,
            total,
            pending: count(ValidationStatus::Pending),
            awaiting_decision: records.iter().filter(|r| r.is_awaiting_decision()).count(),
            approved,
            rejected: count(ValidationStatus::Rejected),
            revision: count(ValidationStatus::Revision),
            auto_approved: records.iter().filter(|r| r.auto_approved).count(),
            total_amount: records.iter().map(|r| r.amount).sum(),
            approved_amount: records
                .iter()
                .filter(|r| r.status_validasi == ValidationStatus::Approved)
                .map(|r| r.amount)
                .sum(),
            approval_rate: if total == 0 {
                0.0
            } else {
                round2(approved as f64 / total as f64 * 100.0)
            },
            avg_approval_hours,
        })
    }

    pub fn audit_trail(&self, kind: RecordKind, id: i64) -> Result<Vec<AuditEntry>, WorkflowError> {
        // Deleted records keep their history
        if self.store.get_record(kind, id)?.is_none() {
            return Err(WorkflowError::NotFound { kind, id });
        }
        Ok(self.store.audit_trail(kind, id)?)
    }

    /// Submitted pending records the actor is allowed to decide
    pub fn pending_queue(
        &self,
        actor: &Actor,
        kind: Option<RecordKind>,
    ) -> Result<Vec<ValidatableRecord>, WorkflowError> {
        let tier = self.tier_of(actor);
        if tier == ApprovalTier::None {
            return Ok(Vec::new());
        }

        let records = self.store.list_records(&RecordFilter {
            kind,
            status: Some(ValidationStatus::Pending),
            submitted_only: true,
            ..Default::default()
        })?;

        Ok(records
            .into_iter()
            .filter(|r| tier.covers(r.required_tier.unwrap_or(ApprovalTier::Supervisor)))
            .collect())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// The system identity only ever auto-approves
    fn tier_of(&self, actor: &Actor) -> ApprovalTier {
        if actor.is_system() {
            return ApprovalTier::None;
        }
        self.config.tier_for_role(&actor.role)
    }

    fn ensure_authority(
        &self,
        record: &ValidatableRecord,
        actor: &Actor,
    ) -> Result<ApprovalTier, WorkflowError> {
        let required = record
            .required_tier
            .or_else(|| self.config.required_tier(record.kind, record.amount))
            .unwrap_or(ApprovalTier::Supervisor)
            .max(ApprovalTier::Supervisor);
        let actual = self.tier_of(actor);

        if !actual.covers(required) {
            warn!(
                kind = %record.kind,
                id = record.id,
                actor = %actor.id,
                role = %actor.role,
                "insufficient permissions: {} required",
                required
            );
            return Err(WorkflowError::InsufficientPermission {
                required,
                actual,
                role: actor.role.clone(),
            });
        }

        Ok(required)
    }

    /// Compare-and-swap the record; a lost race is reported the same way a
    /// late caller would see it.
    fn commit(
        &self,
        mut record: ValidatableRecord,
        entry: AuditEntry,
        attempted: AuditAction,
    ) -> Result<ValidatableRecord, WorkflowError> {
        if self.store.save_transition(&record, &entry)? {
            record.version += 1;
            self.invalidate_stats(&record.input_by);
            return Ok(record);
        }

        let current = self.get_record(record.kind, record.id)?;
        debug!(
            kind = %record.kind,
            id = record.id,
            "lost race, record now {}",
            current.status_validasi
        );

        match attempted {
            AuditAction::Approved | AuditAction::Rejected | AuditAction::RevisionRequested => {
                ensure_decidable(&current, attempted)?;
            }
            AuditAction::Submitted if current.status_validasi.is_terminal() => {
                return Err(WorkflowError::AlreadyProcessed {
                    status: current.status_validasi,
                });
            }
            AuditAction::Submitted if current.is_submitted() => {
                return Err(WorkflowError::AlreadySubmitted);
            }
            _ => {}
        }
        Err(WorkflowError::Conflict)
    }

    fn notify_approvers(&self, record: &ValidatableRecord, tier: ApprovalTier, title: &str) {
        self.notify(
            Notification::new(
                Recipient::Tier(tier),
                title,
                &format!(
                    "{} #{} sebesar {} menunggu validasi {}",
                    record.kind.label(),
                    record.id,
                    rupiah(record.amount),
                    tier
                ),
            )
            .about(record.kind, record.id),
        );
    }

    fn notify(&self, notification: Notification) {
        let reports = self.notifications.notify(&notification);
        let failed = reports.iter().filter(|r| !r.success).count();
        if failed > 0 {
            debug!(
                recipient = %notification.recipient.key(),
                failed,
                "some notification channels failed"
            );
        }
    }

    fn invalidate_stats(&self, user_id: &str) {
        if let Some(stats) = &self.stats {
            stats.invalidate_user(user_id);
        }
    }
}

/// The record must be pending[submitted] for approve / reject / revision
fn ensure_decidable(
    record: &ValidatableRecord,
    attempted: AuditAction,
) -> Result<(), WorkflowError> {
    match record.status_validasi {
        ValidationStatus::Approved if attempted == AuditAction::Approved => {
            Err(WorkflowError::AlreadyApproved)
        }
        ValidationStatus::Approved | ValidationStatus::Rejected => {
            Err(WorkflowError::AlreadyProcessed {
                status: record.status_validasi,
            })
        }
        ValidationStatus::Revision => Err(WorkflowError::AwaitingRevision),
        ValidationStatus::Pending if !record.is_submitted() => Err(WorkflowError::NotSubmitted),
        ValidationStatus::Pending => Ok(()),
    }
}

fn required_reason(reason: &str) -> Result<String, WorkflowError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::MissingReason);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::notification::DatabaseNotifier;
    use crate::records::RecordDetails;
    use chrono::NaiveDate;

    fn service() -> ValidationWorkflowService {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let notifications = NotificationService::new()
            .with_channel(Box::new(DatabaseNotifier::new(store.clone())));
        ValidationWorkflowService::new(store, ValidationConfig::default(), Arc::new(notifications))
    }

    fn petugas() -> Actor {
        Actor::new("petugas-1", "petugas")
    }

    fn supervisor() -> Actor {
        Actor::new("sup-1", "supervisor")
    }

    fn manager() -> Actor {
        Actor::new("mgr-1", "manager")
    }

    fn procedure(amount: i64, shift: Option<i64>) -> NewRecord {
        NewRecord::new(
            RecordDetails::Tindakan {
                shift_id: shift,
                pasien_id: Some(11),
                jenis_tindakan_id: Some(5),
                dokter_id: Some(2),
                paramedis_id: None,
            },
            Decimal::from(amount),
            NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            "petugas-1",
        )
    }

    fn create(svc: &ValidationWorkflowService, new: NewRecord) -> i64 {
        match svc.create_record(&new, &petugas()).unwrap() {
            InsertOutcome::Inserted(record) => record.id,
            InsertOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    fn submitted(svc: &ValidationWorkflowService, amount: i64) -> i64 {
        let id = create(svc, procedure(amount, Some(1)));
        svc.submit_for_validation(RecordKind::Tindakan, id, &petugas())
            .unwrap();
        id
    }

    #[test]
    fn test_small_procedure_auto_approved() {
        let svc = service();
        let id = create(&svc, procedure(50_000, Some(1)));

        let result = svc
            .submit_for_validation(RecordKind::Tindakan, id, &petugas())
            .unwrap();

        assert!(result.success);
        assert_eq!(result.status, Some(ValidationStatus::Approved));
        assert_eq!(result.auto_approved, Some(true));
        assert_eq!(result.requires_approval_from, None);

        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert_eq!(record.approved_by.as_deref(), Some(SYSTEM_ACTOR_ID));
        assert_eq!(record.status, Some(ProcedureStatus::Selesai));
        assert!(record.submitted_at.is_some());
        assert!(record.decision_markers_consistent());

        let trail = svc.audit_trail(RecordKind::Tindakan, id).unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.action, AuditAction::Approved);
        assert!(last.flag("auto_approved"));
    }

    #[test]
    fn test_threshold_boundary_stays_pending() {
        let svc = service();
        let id = create(&svc, procedure(100_000, Some(1)));

        let result = svc
            .submit_for_validation(RecordKind::Tindakan, id, &petugas())
            .unwrap();

        assert_eq!(result.status, Some(ValidationStatus::Pending));
        assert_eq!(result.auto_approved, Some(false));
        assert_eq!(result.requires_approval_from, Some(ApprovalTier::Supervisor));
    }

    #[test]
    fn test_medium_procedure_needs_supervisor() {
        let svc = service();
        let id = create(&svc, procedure(150_000, Some(1)));

        let result = svc
            .submit_for_validation(RecordKind::Tindakan, id, &petugas())
            .unwrap();
        assert_eq!(result.status, Some(ValidationStatus::Pending));
        assert_eq!(result.requires_approval_from, Some(ApprovalTier::Supervisor));

        let approved = svc
            .approve(RecordKind::Tindakan, id, &supervisor(), &DecisionOptions::default())
            .unwrap();
        assert_eq!(approved.status, Some(ValidationStatus::Approved));

        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert_eq!(record.approved_by.as_deref(), Some("sup-1"));
        assert_eq!(record.status, Some(ProcedureStatus::Selesai));
    }

    #[test]
    fn test_large_procedure_needs_manager() {
        let svc = service();
        let id = create(&svc, procedure(2_000_000, Some(1)));

        let result = svc
            .submit_for_validation(RecordKind::Tindakan, id, &petugas())
            .unwrap();
        assert_eq!(result.requires_approval_from, Some(ApprovalTier::Manager));

        let err = svc
            .approve(RecordKind::Tindakan, id, &supervisor(), &DecisionOptions::default())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InsufficientPermission { .. }));
        assert!(err.to_string().contains("insufficient permissions"));

        // Failed attempt changed nothing
        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert_eq!(record.status_validasi, ValidationStatus::Pending);

        let ok = svc
            .approve(RecordKind::Tindakan, id, &manager(), &DecisionOptions::default())
            .unwrap();
        assert_eq!(ok.status, Some(ValidationStatus::Approved));
    }

    #[test]
    fn test_petugas_cannot_approve() {
        let svc = service();
        let id = submitted(&svc, 150_000);

        let err = svc
            .approve(RecordKind::Tindakan, id, &petugas(), &DecisionOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InsufficientPermission {
                actual: ApprovalTier::None,
                ..
            }
        ));
    }

    #[test]
    fn test_incomplete_data_blocks_submission() {
        let svc = service();
        let id = create(&svc, procedure(150_000, None));

        let err = svc
            .submit_for_validation(RecordKind::Tindakan, id, &petugas())
            .unwrap_err();
        match err {
            WorkflowError::IncompleteData { missing } => assert_eq!(missing, vec!["shift_id"]),
            other => panic!("unexpected error: {:?}", other),
        }

        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert!(record.submitted_at.is_none());
    }

    #[test]
    fn test_decisions_require_submission() {
        let svc = service();
        let id = create(&svc, procedure(150_000, Some(1)));
        let opts = DecisionOptions::default();

        assert!(matches!(
            svc.approve(RecordKind::Tindakan, id, &manager(), &opts),
            Err(WorkflowError::NotSubmitted)
        ));
        assert!(matches!(
            svc.reject(RecordKind::Tindakan, id, "salah input", &manager(), &opts),
            Err(WorkflowError::NotSubmitted)
        ));
        assert!(matches!(
            svc.request_revision(RecordKind::Tindakan, id, "cek lagi", &manager(), &opts),
            Err(WorkflowError::NotSubmitted)
        ));
    }

    #[test]
    fn test_terminal_records_stay_terminal() {
        let svc = service();
        let opts = DecisionOptions::default();

        let approved_id = submitted(&svc, 150_000);
        svc.approve(RecordKind::Tindakan, approved_id, &supervisor(), &opts)
            .unwrap();
        let before = svc.get_record(RecordKind::Tindakan, approved_id).unwrap();

        assert!(matches!(
            svc.approve(RecordKind::Tindakan, approved_id, &manager(), &opts),
            Err(WorkflowError::AlreadyApproved)
        ));
        assert!(matches!(
            svc.reject(RecordKind::Tindakan, approved_id, "late", &manager(), &opts),
            Err(WorkflowError::AlreadyProcessed {
                status: ValidationStatus::Approved
            })
        ));
        assert_eq!(
            svc.get_record(RecordKind::Tindakan, approved_id).unwrap(),
            before
        );

        let rejected_id = submitted(&svc, 150_000);
        svc.reject(RecordKind::Tindakan, rejected_id, "duplikat", &supervisor(), &opts)
            .unwrap();
        assert!(matches!(
            svc.approve(RecordKind::Tindakan, rejected_id, &manager(), &opts),
            Err(WorkflowError::AlreadyProcessed {
                status: ValidationStatus::Rejected
            })
        ));
        assert!(matches!(
            svc.submit_for_validation(RecordKind::Tindakan, rejected_id, &petugas()),
            Err(WorkflowError::AlreadyProcessed { .. })
        ));
    }

    #[test]
    fn test_reject_sets_batal_and_reason() {
        let svc = service();
        let id = submitted(&svc, 150_000);

        assert!(matches!(
            svc.reject(RecordKind::Tindakan, id, "  ", &supervisor(), &DecisionOptions::default()),
            Err(WorkflowError::MissingReason)
        ));

        svc.reject(
            RecordKind::Tindakan,
            id,
            "pasien tidak terdaftar",
            &supervisor(),
            &DecisionOptions::default(),
        )
        .unwrap();

        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert_eq!(record.status_validasi, ValidationStatus::Rejected);
        assert_eq!(record.status, Some(ProcedureStatus::Batal));
        assert_eq!(record.rejected_by.as_deref(), Some("sup-1"));
        assert_eq!(
            record.rejection_reason.as_deref(),
            Some("pasien tidak terdaftar")
        );
        assert!(record.decision_markers_consistent());

        let inbox = svc
            .store()
            .notifications_for(&Recipient::User("petugas-1".to_string()), true)
            .unwrap();
        assert_eq!(inbox[0].title, "Data ditolak");
    }

    #[test]
    fn test_revision_roundtrip() {
        let svc = service();
        let opts = DecisionOptions::default();
        let id = submitted(&svc, 150_000);

        // Resubmitting something not in revision is refused
        assert!(matches!(
            svc.resubmit_after_revision(RecordKind::Tindakan, id, None, &petugas()),
            Err(WorkflowError::NotInRevision)
        ));

        svc.request_revision(RecordKind::Tindakan, id, "nominal salah", &supervisor(), &opts)
            .unwrap();
        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert_eq!(record.status_validasi, ValidationStatus::Revision);
        assert!(record.decision_markers_consistent());

        // Cannot decide while the petugas is revising
        assert!(matches!(
            svc.approve(RecordKind::Tindakan, id, &supervisor(), &opts),
            Err(WorkflowError::AwaitingRevision)
        ));

        // Fix the amount; it now crosses the manager threshold
        svc.update_record(
            RecordKind::Tindakan,
            id,
            &RecordUpdate {
                amount: Some(Decimal::from(750_000)),
                ..Default::default()
            },
            &petugas(),
        )
        .unwrap();

        let result = svc
            .resubmit_after_revision(RecordKind::Tindakan, id, Some("nominal diperbaiki"), &petugas())
            .unwrap();
        assert_eq!(result.status, Some(ValidationStatus::Pending));
        assert_eq!(result.requires_approval_from, Some(ApprovalTier::Manager));

        let record = svc.get_record(RecordKind::Tindakan, id).unwrap();
        assert!(record.is_awaiting_decision());
        assert!(record.revision_requested_by.is_none());
        assert!(record.decision_markers_consistent());

        svc.approve(RecordKind::Tindakan, id, &manager(), &opts)
            .unwrap();

        let actions: Vec<AuditAction> = svc
            .audit_trail(RecordKind::Tindakan, id)
            .unwrap()
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Created,
                AuditAction::Submitted,
                AuditAction::RevisionRequested,
                AuditAction::Updated,
                AuditAction::Resubmitted,
                AuditAction::Approved,
            ]
        );
    }

    #[test]
    fn test_resubmit_small_amount_is_not_auto_approved() {
        let svc = service();
        let id = submitted(&svc, 150_000);
        svc.request_revision(RecordKind::Tindakan, id, "terlalu besar", &supervisor(), &DecisionOptions::default())
            .unwrap();
        svc.update_record(
            RecordKind::Tindakan,
            id,
            &RecordUpdate {
                amount: Some(Decimal::from(20_000)),
                ..Default::default()
            },
            &petugas(),
        )
        .unwrap();

        let result = svc
            .resubmit_after_revision(RecordKind::Tindakan, id, None, &petugas())
            .unwrap();
        assert_eq!(result.status, Some(ValidationStatus::Pending));
        assert_eq!(result.requires_approval_from, Some(ApprovalTier::Supervisor));
    }

    #[test]
    fn test_submitted_record_is_not_editable() {
        let svc = service();
        let id = submitted(&svc, 150_000);

        let err = svc
            .update_record(
                RecordKind::Tindakan,
                id,
                &RecordUpdate {
                    amount: Some(Decimal::from(1)),
                    ..Default::default()
                },
                &petugas(),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotEditable { .. }));

        assert!(matches!(
            svc.submit_for_validation(RecordKind::Tindakan, id, &petugas()),
            Err(WorkflowError::AlreadySubmitted)
        ));
    }

    #[test]
    fn test_soft_delete_only_while_pending() {
        let svc = service();
        let pending_id = create(&svc, procedure(150_000, Some(1)));
        svc.delete_record(RecordKind::Tindakan, pending_id, &petugas())
            .unwrap();
        assert!(matches!(
            svc.get_record(RecordKind::Tindakan, pending_id),
            Err(WorkflowError::NotFound { .. })
        ));
        // History survives the delete
        let trail = svc.audit_trail(RecordKind::Tindakan, pending_id).unwrap();
        assert_eq!(trail.last().unwrap().action, AuditAction::Deleted);

        let approved_id = create(&svc, procedure(10_000, Some(1)));
        svc.submit_for_validation(RecordKind::Tindakan, approved_id, &petugas())
            .unwrap();
        assert!(matches!(
            svc.delete_record(RecordKind::Tindakan, approved_id, &manager()),
            Err(WorkflowError::NotEditable {
                status: ValidationStatus::Approved
            })
        ));
    }

    #[test]
    fn test_batch_partial_failure() {
        let svc = service();
        let a = submitted(&svc, 150_000);
        let b = submitted(&svc, 2_000_000); // needs manager
        let c = submitted(&svc, 200_000);
        let unsubmitted = create(&svc, procedure(300_000, Some(1)));
        let ids = vec![a, b, c, unsubmitted, 9_999];

        let result = svc
            .batch_approval(&ids, RecordKind::Tindakan, BatchAction::Approve, None, &supervisor())
            .unwrap();

        assert_eq!(result.processed, ids.len());
        assert_eq!(result.approved, 2);
        assert_eq!(result.failed, 3);
        assert_eq!(result.processed, result.approved + result.failed);
        assert!(!result.success);

        let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["insufficient_permissions", "not_submitted", "not_found"]
        );

        // The failure in the middle did not block c
        let record = svc.get_record(RecordKind::Tindakan, c).unwrap();
        assert_eq!(record.status_validasi, ValidationStatus::Approved);
    }

    #[test]
    fn test_batch_reject_needs_reason() {
        let svc = service();
        let a = submitted(&svc, 150_000);

        assert!(matches!(
            svc.batch_approval(&[a], RecordKind::Tindakan, BatchAction::Reject, None, &manager()),
            Err(WorkflowError::MissingReason)
        ));

        let result = svc
            .batch_approval(
                &[a],
                RecordKind::Tindakan,
                BatchAction::Reject,
                Some("tutup buku"),
                &manager(),
            )
            .unwrap();
        assert!(result.success);
        assert_eq!(result.rejected, 1);
    }

    #[test]
    fn test_first_approver_wins() {
        let svc = Arc::new(service());
        let id = submitted(&svc, 150_000);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || {
                    let actor = Actor::new(format!("mgr-{}", i), "manager");
                    svc.approve(RecordKind::Tindakan, id, &actor, &DecisionOptions::default())
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(winners, 1);
        for outcome in outcomes.iter().filter(|o| o.is_err()) {
            assert!(matches!(outcome, Err(WorkflowError::AlreadyApproved)));
        }

        let approvals = svc
            .audit_trail(RecordKind::Tindakan, id)
            .unwrap()
            .iter()
            .filter(|e| e.action == AuditAction::Approved)
            .count();
        assert_eq!(approvals, 1);
    }

    #[test]
    fn test_validation_stats() {
        let svc = service();
        let opts = DecisionOptions::default();

        let auto = create(&svc, procedure(10_000, Some(1)));
        svc.submit_for_validation(RecordKind::Tindakan, auto, &petugas())
            .unwrap();
        let manual = submitted(&svc, 150_000);
        svc.approve(RecordKind::Tindakan, manual, &supervisor(), &opts)
            .unwrap();
        let rejected = submitted(&svc, 150_000);
        svc.reject(RecordKind::Tindakan, rejected, "salah", &supervisor(), &opts)
            .unwrap();
        submitted(&svc, 150_000);

        let stats = svc
            .get_validation_stats(Some(RecordKind::Tindakan), 30)
            .unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.awaiting_decision, 1);
        assert_eq!(stats.auto_approved, 1);
        assert_eq!(stats.approval_rate, 50.0);
        assert_eq!(stats.approved_amount, Decimal::from(160_000));
        assert!(stats.avg_approval_hours.is_some());

        let other = svc
            .get_validation_stats(Some(RecordKind::Pengeluaran), 30)
            .unwrap();
        assert_eq!(other.total, 0);
        assert_eq!(other.approval_rate, 0.0);
    }

    struct DeadChannel;

    impl crate::notification::Notifier for DeadChannel {
        fn channel(&self) -> &str {
            "dead"
        }

        fn deliver(&self, _notification: &Notification) -> crate::notification::DeliveryReport {
            crate::notification::DeliveryReport::failed(self.channel(), "connection refused")
        }
    }

    #[test]
    fn test_transitions_survive_failing_notifications() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let notifications = NotificationService::new().with_channel(Box::new(DeadChannel));
        let svc = ValidationWorkflowService::new(
            store,
            ValidationConfig::default(),
            Arc::new(notifications),
        );
        let opts = DecisionOptions::default();
        let last_action = |id: i64| {
            svc.audit_trail(RecordKind::Tindakan, id)
                .unwrap()
                .last()
                .map(|entry| entry.action)
        };

        let approved = create(&svc, procedure(150_000, Some(1)));
        let result = svc
            .submit_for_validation(RecordKind::Tindakan, approved, &petugas())
            .unwrap();
        assert!(result.success);
        assert_eq!(last_action(approved), Some(AuditAction::Submitted));

        let result = svc
            .approve(RecordKind::Tindakan, approved, &supervisor(), &opts)
            .unwrap();
        assert!(result.success);
        assert_eq!(last_action(approved), Some(AuditAction::Approved));

        let rejected = submitted(&svc, 150_000);
        let result = svc
            .reject(RecordKind::Tindakan, rejected, "bukti kurang", &supervisor(), &opts)
            .unwrap();
        assert!(result.success);
        assert_eq!(last_action(rejected), Some(AuditAction::Rejected));

        let revised = submitted(&svc, 150_000);
        let result = svc
            .request_revision(RecordKind::Tindakan, revised, "nominal salah", &supervisor(), &opts)
            .unwrap();
        assert!(result.success);
        assert_eq!(last_action(revised), Some(AuditAction::RevisionRequested));

        let result = svc
            .resubmit_after_revision(RecordKind::Tindakan, revised, None, &petugas())
            .unwrap();
        assert!(result.success);
        assert_eq!(last_action(revised), Some(AuditAction::Resubmitted));
        assert!(svc
            .get_record(RecordKind::Tindakan, revised)
            .unwrap()
            .is_awaiting_decision());
    }

    #[test]
    fn test_validation_stats_huge_window_covers_everything() {
        let svc = service();
        submitted(&svc, 150_000);
        create(&svc, procedure(10_000, Some(1)));

        let stats = svc.get_validation_stats(None, u32::MAX).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.awaiting_decision, 1);

        let stats = svc.get_validation_stats(None, 200_000_000).unwrap();
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_pending_queue_respects_tier() {
        let svc = service();
        submitted(&svc, 150_000);
        submitted(&svc, 2_000_000);
        create(&svc, procedure(300_000, Some(1)));

        assert_eq!(svc.pending_queue(&supervisor(), None).unwrap().len(), 1);
        assert_eq!(svc.pending_queue(&manager(), None).unwrap().len(), 2);
        assert!(svc.pending_queue(&petugas(), None).unwrap().is_empty());
    }

    #[test]
    fn test_system_actor_cannot_sign_off() {
        let svc = service();
        let id = submitted(&svc, 150_000);
        let system_as_admin = Actor::new(SYSTEM_ACTOR_ID, "admin");

        assert!(matches!(
            svc.approve(RecordKind::Tindakan, id, &system_as_admin, &DecisionOptions::default()),
            Err(WorkflowError::InsufficientPermission { .. })
        ));
        assert!(svc.pending_queue(&Actor::system(), None).unwrap().is_empty());
    }

    #[test]
    fn test_settle_folds_expected_errors() {
        let svc = service();
        let id = create(&svc, procedure(150_000, Some(1)));

        let result = WorkflowResult::settle(
            RecordKind::Tindakan,
            id,
            svc.approve(RecordKind::Tindakan, id, &manager(), &DecisionOptions::default()),
        )
        .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("not_submitted"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("auto_approved").is_none());
    }

    #[test]
    fn test_approvers_notified_on_submission() {
        let svc = service();
        submitted(&svc, 2_000_000);

        let inbox = svc
            .store()
            .notifications_for(&Recipient::Tier(ApprovalTier::Manager), true)
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].message.contains("Rp 2000000"));
    }
}
