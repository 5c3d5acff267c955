// 🧾 Validatable records - the four kinds of clinic transactions that need sign-off
//
// Tindakan (procedures), PendapatanHarian (daily revenue), PengeluaranHarian
// (daily expenses) and Pengeluaran (general expenses) share one lifecycle.
// Kind-specific fields live in RecordDetails, a tagged union that knows its own
// required fields.

use crate::roles::ApprovalTier;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// RECORD KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Tindakan,
    PendapatanHarian,
    PengeluaranHarian,
    Pengeluaran,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Tindakan,
        RecordKind::PendapatanHarian,
        RecordKind::PengeluaranHarian,
        RecordKind::Pengeluaran,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Tindakan => "tindakan",
            RecordKind::PendapatanHarian => "pendapatan_harian",
            RecordKind::PengeluaranHarian => "pengeluaran_harian",
            RecordKind::Pengeluaran => "pengeluaran",
        }
    }

    /// Human label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Tindakan => "Tindakan",
            RecordKind::PendapatanHarian => "Pendapatan Harian",
            RecordKind::PengeluaranHarian => "Pengeluaran Harian",
            RecordKind::Pengeluaran => "Pengeluaran",
        }
    }

    /// Accepts snake_case names as well as model-style names ("PendapatanHarian")
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "tindakan" => Some(RecordKind::Tindakan),
            "pendapatanharian" => Some(RecordKind::PendapatanHarian),
            "pengeluaranharian" => Some(RecordKind::PengeluaranHarian),
            "pengeluaran" => Some(RecordKind::Pengeluaran),
            _ => None,
        }
    }

    /// Query form: "all" (or empty) means no kind filter, `None` means unknown
    pub fn parse_filter(s: &str) -> Option<Option<Self>> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Some(None);
        }
        RecordKind::parse(trimmed).map(Some)
    }

    /// Revenue kinds count positively in stats, everything else is spending
    pub fn is_revenue(&self) -> bool {
        matches!(self, RecordKind::Tindakan | RecordKind::PendapatanHarian)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STATUSES
// ============================================================================

/// `status_validasi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
    Revision,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::Revision => "revision",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ValidationStatus::Pending),
            "approved" => Some(ValidationStatus::Approved),
            "rejected" => Some(ValidationStatus::Rejected),
            "revision" => Some(ValidationStatus::Revision),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationStatus::Approved | ValidationStatus::Rejected)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downstream `status` of a procedure, driven by the validation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureStatus {
    Pending,
    Selesai,
    Batal,
}

impl ProcedureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureStatus::Pending => "pending",
            ProcedureStatus::Selesai => "selesai",
            ProcedureStatus::Batal => "batal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcedureStatus::Pending),
            "selesai" => Some(ProcedureStatus::Selesai),
            "batal" => Some(ProcedureStatus::Batal),
            _ => None,
        }
    }
}

// ============================================================================
// KIND-SPECIFIC DETAILS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordDetails {
    Tindakan {
        #[serde(default)]
        shift_id: Option<i64>,
        #[serde(default)]
        pasien_id: Option<i64>,
        #[serde(default)]
        jenis_tindakan_id: Option<i64>,
        #[serde(default)]
        dokter_id: Option<i64>,
        #[serde(default)]
        paramedis_id: Option<i64>,
    },
    PendapatanHarian {
        #[serde(default)]
        shift_id: Option<i64>,
        #[serde(default)]
        pendapatan_id: Option<i64>,
    },
    PengeluaranHarian {
        #[serde(default)]
        shift_id: Option<i64>,
        #[serde(default)]
        pengeluaran_id: Option<i64>,
    },
    Pengeluaran {
        #[serde(default)]
        nama_pengeluaran: Option<String>,
        #[serde(default)]
        keterangan: Option<String>,
    },
}

impl RecordDetails {
    /// Details of the given kind with every field unset
    pub fn empty(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Tindakan => RecordDetails::Tindakan {
                shift_id: None,
                pasien_id: None,
                jenis_tindakan_id: None,
                dokter_id: None,
                paramedis_id: None,
            },
            RecordKind::PendapatanHarian => RecordDetails::PendapatanHarian {
                shift_id: None,
                pendapatan_id: None,
            },
            RecordKind::PengeluaranHarian => RecordDetails::PengeluaranHarian {
                shift_id: None,
                pengeluaran_id: None,
            },
            RecordKind::Pengeluaran => RecordDetails::Pengeluaran {
                nama_pengeluaran: None,
                keterangan: None,
            },
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            RecordDetails::Tindakan { .. } => RecordKind::Tindakan,
            RecordDetails::PendapatanHarian { .. } => RecordKind::PendapatanHarian,
            RecordDetails::PengeluaranHarian { .. } => RecordKind::PengeluaranHarian,
            RecordDetails::Pengeluaran { .. } => RecordKind::Pengeluaran,
        }
    }

    pub fn shift_id(&self) -> Option<i64> {
        match self {
            RecordDetails::Tindakan { shift_id, .. }
            | RecordDetails::PendapatanHarian { shift_id, .. }
            | RecordDetails::PengeluaranHarian { shift_id, .. } => *shift_id,
            RecordDetails::Pengeluaran { .. } => None,
        }
    }

    /// Names of required fields that are still unset
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        match self {
            RecordDetails::Tindakan {
                shift_id,
                pasien_id,
                jenis_tindakan_id,
                ..
            } => {
                if shift_id.is_none() {
                    missing.push("shift_id");
                }
                if pasien_id.is_none() {
                    missing.push("pasien_id");
                }
                if jenis_tindakan_id.is_none() {
                    missing.push("jenis_tindakan_id");
                }
            }
            RecordDetails::PendapatanHarian {
                shift_id,
                pendapatan_id,
            } => {
                if shift_id.is_none() {
                    missing.push("shift_id");
                }
                if pendapatan_id.is_none() {
                    missing.push("pendapatan_id");
                }
            }
            RecordDetails::PengeluaranHarian {
                shift_id,
                pengeluaran_id,
            } => {
                if shift_id.is_none() {
                    missing.push("shift_id");
                }
                if pengeluaran_id.is_none() {
                    missing.push("pengeluaran_id");
                }
            }
            RecordDetails::Pengeluaran {
                nama_pengeluaran, ..
            } => {
                if nama_pengeluaran
                    .as_deref()
                    .map_or(true, |name| name.trim().is_empty())
                {
                    missing.push("nama_pengeluaran");
                }
            }
        }

        missing
    }
}

// ============================================================================
// NEW RECORD (form input)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub details: RecordDetails,
    pub amount: Decimal,
    pub tanggal: NaiveDate,
    /// Petugas who entered the record
    pub input_by: String,
    /// Set by bulk import so the same row is never inserted twice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_hash: Option<String>,
}

impl NewRecord {
    pub fn new(details: RecordDetails, amount: Decimal, tanggal: NaiveDate, input_by: &str) -> Self {
        NewRecord {
            details,
            amount,
            tanggal,
            input_by: input_by.to_string(),
            idempotency_hash: None,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.details.kind()
    }

    /// SHA-256 over the fields that identify a row in an import file.
    /// This is for DEDUPLICATION, not identity (identity is the row id).
    pub fn compute_idempotency_hash(&self) -> String {
        let details_json = serde_json::to_string(&self.details).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.kind(),
            self.tanggal,
            self.amount.normalize(),
            self.input_by,
            details_json
        ));
        format!("{:x}", hasher.finalize())
    }

    pub fn with_idempotency_hash(mut self) -> Self {
        self.idempotency_hash = Some(self.compute_idempotency_hash());
        self
    }
}

/// Partial edit of a record that is still editable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub tanggal: Option<NaiveDate>,
    #[serde(default)]
    pub details: Option<RecordDetails>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.tanggal.is_none() && self.details.is_none()
    }
}

// ============================================================================
// VALIDATABLE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatableRecord {
    pub id: i64,
    pub kind: RecordKind,
    pub details: RecordDetails,
    pub amount: Decimal,
    pub tanggal: NaiveDate,
    pub input_by: String,

    // ========================================================================
    // VALIDATION STATE
    // ========================================================================
    pub status_validasi: ValidationStatus,
    /// Downstream status, procedures only
    pub status: Option<ProcedureStatus>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<String>,
    pub required_tier: Option<ApprovalTier>,
    pub auto_approved: bool,

    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_comment: Option<String>,

    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,

    pub revision_requested_by: Option<String>,
    pub revision_requested_at: Option<DateTime<Utc>>,
    pub revision_reason: Option<String>,

    // ========================================================================
    // BOOKKEEPING
    // ========================================================================
    /// Optimistic concurrency counter, bumped on every stored change
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub idempotency_hash: Option<String>,
}

impl ValidatableRecord {
    /// A freshly stored record; `id` is assigned by the store
    pub fn from_new(id: i64, new: &NewRecord, now: DateTime<Utc>) -> Self {
        let kind = new.kind();
        ValidatableRecord {
            id,
            kind,
            details: new.details.clone(),
            amount: new.amount,
            tanggal: new.tanggal,
            input_by: new.input_by.clone(),
            status_validasi: ValidationStatus::Pending,
            status: (kind == RecordKind::Tindakan).then_some(ProcedureStatus::Pending),
            submitted_at: None,
            submitted_by: None,
            required_tier: None,
            auto_approved: false,
            approved_by: None,
            approved_at: None,
            approval_comment: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            revision_requested_by: None,
            revision_requested_at: None,
            revision_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            idempotency_hash: new.idempotency_hash.clone(),
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    /// Pending and submitted: the only state an approver can act on
    pub fn is_awaiting_decision(&self) -> bool {
        self.status_validasi == ValidationStatus::Pending && self.is_submitted()
    }

    /// Details may be edited before submission and while a revision is requested
    pub fn is_editable(&self) -> bool {
        match self.status_validasi {
            ValidationStatus::Pending => !self.is_submitted(),
            ValidationStatus::Revision => true,
            _ => false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Required fields still missing, including a positive amount
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = self.details.missing_required_fields();
        if self.amount <= Decimal::ZERO {
            missing.push("amount");
        }
        missing
    }

    /// The user whose decision moved the record out of pending, if any
    pub fn decided_by(&self) -> Option<&str> {
        match self.status_validasi {
            ValidationStatus::Approved => self.approved_by.as_deref(),
            ValidationStatus::Rejected => self.rejected_by.as_deref(),
            ValidationStatus::Revision => self.revision_requested_by.as_deref(),
            ValidationStatus::Pending => None,
        }
    }

    /// Exactly one decision marker is set once the record leaves pending
    pub fn decision_markers_consistent(&self) -> bool {
        let set = [
            self.approved_by.is_some(),
            self.rejected_by.is_some(),
            self.revision_requested_by.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();

        match self.status_validasi {
            ValidationStatus::Pending => set == 0,
            _ => set == 1 && self.decided_by().is_some(),
        }
    }
}
