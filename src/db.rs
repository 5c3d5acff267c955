// 🗄️ Record store - repository interface + SQLite implementation
//
// The workflow only ever talks to `RecordStore`. State changes go through
// `save_transition`, which is a compare-and-swap on `version` executed in the
// same transaction as the audit insert: two approvers racing on the same
// record cannot both win.

use crate::audit::{AuditAction, AuditEntry};
use crate::notification::{Notification, Recipient};
use crate::records::{
    NewRecord, ProcedureStatus, RecordDetails, RecordKind, ValidatableRecord, ValidationStatus,
};
use crate::roles::ApprovalTier;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Current time at the precision the store keeps (microseconds)
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// REPOSITORY INTERFACE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(ValidatableRecord),
    /// A record with the same idempotency hash already exists
    Duplicate,
}

/// Query over records; unset fields do not filter
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub status: Option<ValidationStatus>,
    pub input_by: Option<String>,
    pub submitted_only: bool,
    pub tanggal_from: Option<NaiveDate>,
    pub tanggal_to: Option<NaiveDate>,
    pub created_since: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

impl RecordFilter {
    pub fn kind(kind: RecordKind) -> Self {
        RecordFilter {
            kind: Some(kind),
            ..Default::default()
        }
    }
}

pub trait RecordStore: Send + Sync {
    /// Insert a record and its `created` audit entry
    fn insert_record(&self, new: &NewRecord, actor: &str) -> Result<InsertOutcome>;

    /// Insert a batch in one transaction. The outer error means nothing was
    /// written; inner errors belong to single rows, which were rolled back.
    fn insert_records(&self, batch: &[NewRecord], actor: &str)
        -> Result<Vec<Result<InsertOutcome>>>;

    fn get_record(&self, kind: RecordKind, id: i64) -> Result<Option<ValidatableRecord>>;

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ValidatableRecord>>;

    /// Persist `record` only if the stored version still equals `record.version`.
    /// On success the stored version becomes `record.version + 1` and `entry`
    /// is appended in the same transaction. Returns false when the version moved.
    fn save_transition(&self, record: &ValidatableRecord, entry: &AuditEntry) -> Result<bool>;

    fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Oldest first
    fn audit_trail(&self, kind: RecordKind, id: i64) -> Result<Vec<AuditEntry>>;

    fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// Newest first
    fn notifications_for(&self, recipient: &Recipient, unread_only: bool)
        -> Result<Vec<Notification>>;

    fn mark_notification_read(&self, notification_id: &str) -> Result<bool>;

    fn count_records(&self) -> Result<i64>;
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            details TEXT NOT NULL,
            amount TEXT NOT NULL,
            tanggal TEXT NOT NULL,
            input_by TEXT NOT NULL,
            status_validasi TEXT NOT NULL DEFAULT 'pending',
            status TEXT,
            submitted_at TEXT,
            submitted_by TEXT,
            required_tier TEXT,
            auto_approved INTEGER NOT NULL DEFAULT 0,
            approved_by TEXT,
            approved_at TEXT,
            approval_comment TEXT,
            rejected_by TEXT,
            rejected_at TEXT,
            rejection_reason TEXT,
            revision_requested_by TEXT,
            revision_requested_at TEXT,
            revision_reason TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT,
            idempotency_hash TEXT UNIQUE
        )",
        [],
    )?;

    // ==========================================================================
    // Audit log (append-only, enforced by triggers)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            model_type TEXT NOT NULL,
            model_id INTEGER NOT NULL,
            changes TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS audit_log_no_update
         BEFORE UPDATE ON audit_log
         BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
         BEFORE DELETE ON audit_log
         BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            notification_id TEXT UNIQUE NOT NULL,
            recipient TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            model_type TEXT,
            model_id INTEGER,
            created_at TEXT NOT NULL,
            read_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_kind_status ON records(kind, status_validasi)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_input_by ON records(input_by, tanggal)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_model ON audit_log(model_type, model_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const RECORD_COLUMNS: &str = "id, kind, details, amount, tanggal, input_by,
    status_validasi, status, submitted_at, submitted_by, required_tier, auto_approved,
    approved_by, approved_at, approval_comment,
    rejected_by, rejected_at, rejection_reason,
    revision_requested_by, revision_requested_at, revision_reason,
    version, created_at, updated_at, deleted_at, idempotency_hash";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, s)).transpose()
}

fn parse_kind(idx: usize, raw: String) -> rusqlite::Result<RecordKind> {
    RecordKind::parse(&raw).ok_or_else(|| conversion_error(idx, format!("bad kind '{}'", raw)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ValidatableRecord> {
    let details_json: String = row.get(2)?;
    let details: RecordDetails = serde_json::from_str(&details_json)
        .map_err(|e| conversion_error(2, format!("bad details: {}", e)))?;

    let amount_raw: String = row.get(3)?;
    let amount = Decimal::from_str(&amount_raw)
        .map_err(|e| conversion_error(3, format!("bad amount '{}': {}", amount_raw, e)))?;

    let tanggal_raw: String = row.get(4)?;
    let tanggal = NaiveDate::parse_from_str(&tanggal_raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(4, format!("bad tanggal '{}': {}", tanggal_raw, e)))?;

    let status_raw: String = row.get(6)?;
    let status_validasi = ValidationStatus::parse(&status_raw)
        .ok_or_else(|| conversion_error(6, format!("bad status_validasi '{}'", status_raw)))?;

    let status: Option<String> = row.get(7)?;
    let required_tier: Option<String> = row.get(10)?;

    Ok(ValidatableRecord {
        id: row.get(0)?,
        kind: parse_kind(1, row.get(1)?)?,
        details,
        amount,
        tanggal,
        input_by: row.get(5)?,
        status_validasi,
        status: status.as_deref().and_then(ProcedureStatus::parse),
        submitted_at: parse_opt_ts(8, row.get(8)?)?,
        submitted_by: row.get(9)?,
        required_tier: required_tier.as_deref().and_then(ApprovalTier::parse),
        auto_approved: row.get(11)?,
        approved_by: row.get(12)?,
        approved_at: parse_opt_ts(13, row.get(13)?)?,
        approval_comment: row.get(14)?,
        rejected_by: row.get(15)?,
        rejected_at: parse_opt_ts(16, row.get(16)?)?,
        rejection_reason: row.get(17)?,
        revision_requested_by: row.get(18)?,
        revision_requested_at: parse_opt_ts(19, row.get(19)?)?,
        revision_reason: row.get(20)?,
        version: row.get(21)?,
        created_at: parse_ts(22, row.get(22)?)?,
        updated_at: parse_ts(23, row.get(23)?)?,
        deleted_at: parse_opt_ts(24, row.get(24)?)?,
        idempotency_hash: row.get(25)?,
    })
}

fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action_raw: String = row.get(2)?;
    let changes_json: String = row.get(5)?;

    Ok(AuditEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        action: AuditAction::parse(&action_raw)
            .ok_or_else(|| conversion_error(2, format!("bad action '{}'", action_raw)))?,
        model_type: parse_kind(3, row.get(3)?)?,
        model_id: row.get(4)?,
        changes: serde_json::from_str(&changes_json)
            .map_err(|e| conversion_error(5, format!("bad changes: {}", e)))?,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let recipient_raw: String = row.get(1)?;
    let model_type: Option<String> = row.get(4)?;

    Ok(Notification {
        id: row.get(0)?,
        recipient: Recipient::parse_key(&recipient_raw)
            .ok_or_else(|| conversion_error(1, format!("bad recipient '{}'", recipient_raw)))?,
        title: row.get(2)?,
        message: row.get(3)?,
        model_type: model_type.map(|k| parse_kind(4, k)).transpose()?,
        model_id: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
        read_at: parse_opt_ts(7, row.get(7)?)?,
    })
}

fn insert_audit(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    let changes_json = serde_json::to_string(&entry.changes)?;

    conn.execute(
        "INSERT INTO audit_log (
            entry_id, user_id, action, model_type, model_id, changes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            entry.user_id,
            entry.action.as_str(),
            entry.model_type.as_str(),
            entry.model_id,
            changes_json,
            ts(&entry.created_at),
        ],
    )?;

    Ok(())
}

fn insert_new_record(conn: &Connection, new: &NewRecord, actor: &str) -> Result<InsertOutcome> {
    let now = timestamp_now();
    let kind = new.kind();
    let details_json = serde_json::to_string(&new.details)?;
    let status = (kind == RecordKind::Tindakan).then_some(ProcedureStatus::Pending.as_str());

    let result = conn.execute(
        "INSERT INTO records (
            kind, details, amount, tanggal, input_by, status_validasi, status,
            auto_approved, version, created_at, updated_at, idempotency_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, 0, 1, ?7, ?7, ?8)",
        params![
            kind.as_str(),
            details_json,
            new.amount.to_string(),
            new.tanggal.format("%Y-%m-%d").to_string(),
            new.input_by,
            status,
            ts(&now),
            new.idempotency_hash,
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Ok(InsertOutcome::Duplicate);
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    let record = ValidatableRecord::from_new(id, new, now);

    let entry = AuditEntry::new(
        actor,
        AuditAction::Created,
        kind,
        id,
        serde_json::json!({
            "amount": new.amount.to_string(),
            "tanggal": new.tanggal,
            "input_by": new.input_by,
        }),
    );
    insert_audit(conn, &entry)?;

    Ok(InsertOutcome::Inserted(record))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        SqliteStore::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        SqliteStore::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }
}

impl RecordStore for SqliteStore {
    fn insert_record(&self, new: &NewRecord, actor: &str) -> Result<InsertOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let outcome = insert_new_record(&tx, new, actor)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn insert_records(
        &self,
        batch: &[NewRecord],
        actor: &str,
    ) -> Result<Vec<Result<InsertOutcome>>> {
        let mut conn = self.lock()?;
        let mut tx = conn.transaction()?;
        let mut outcomes = Vec::with_capacity(batch.len());

        // A savepoint per row keeps one failed row from taking the batch down
        for new in batch {
            let sp = tx.savepoint()?;
            match insert_new_record(&sp, new, actor) {
                Ok(outcome) => {
                    sp.commit()?;
                    outcomes.push(Ok(outcome));
                }
                Err(e) => outcomes.push(Err(e)),
            }
        }

        tx.commit()?;
        Ok(outcomes)
    }

    fn get_record(&self, kind: RecordKind, id: i64) -> Result<Option<ValidatableRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM records WHERE id = ?1 AND kind = ?2",
            RECORD_COLUMNS
        );

        let record = conn
            .query_row(&sql, params![id, kind.as_str()], row_to_record)
            .optional()?;

        Ok(record)
    }

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ValidatableRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(kind) = filter.kind {
            clauses.push("kind = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status_validasi = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(user) = &filter.input_by {
            clauses.push("input_by = ?");
            values.push(Value::Text(user.clone()));
        }
        if filter.submitted_only {
            clauses.push("submitted_at IS NOT NULL");
        }
        if let Some(from) = filter.tanggal_from {
            clauses.push("tanggal >= ?");
            values.push(Value::Text(from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = filter.tanggal_to {
            clauses.push("tanggal <= ?");
            values.push(Value::Text(to.format("%Y-%m-%d").to_string()));
        }
        if let Some(since) = filter.created_since {
            clauses.push("created_at >= ?");
            values.push(Value::Text(ts(&since)));
        }
        if !filter.include_deleted {
            clauses.push("deleted_at IS NULL");
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM records {} ORDER BY id ASC",
            RECORD_COLUMNS, where_clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn save_transition(&self, record: &ValidatableRecord, entry: &AuditEntry) -> Result<bool> {
        let details_json = serde_json::to_string(&record.details)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE records SET
                details = ?1, amount = ?2, tanggal = ?3,
                status_validasi = ?4, status = ?5,
                submitted_at = ?6, submitted_by = ?7, required_tier = ?8, auto_approved = ?9,
                approved_by = ?10, approved_at = ?11, approval_comment = ?12,
                rejected_by = ?13, rejected_at = ?14, rejection_reason = ?15,
                revision_requested_by = ?16, revision_requested_at = ?17, revision_reason = ?18,
                updated_at = ?19, deleted_at = ?20,
                version = version + 1
             WHERE id = ?21 AND kind = ?22 AND version = ?23",
            params![
                details_json,
                record.amount.to_string(),
                record.tanggal.format("%Y-%m-%d").to_string(),
                record.status_validasi.as_str(),
                record.status.map(|s| s.as_str()),
                record.submitted_at.as_ref().map(ts),
                record.submitted_by,
                record.required_tier.map(|t| t.as_str()),
                record.auto_approved,
                record.approved_by,
                record.approved_at.as_ref().map(ts),
                record.approval_comment,
                record.rejected_by,
                record.rejected_at.as_ref().map(ts),
                record.rejection_reason,
                record.revision_requested_by,
                record.revision_requested_at.as_ref().map(ts),
                record.revision_reason,
                ts(&record.updated_at),
                record.deleted_at.as_ref().map(ts),
                record.id,
                record.kind.as_str(),
                record.version,
            ],
        )?;

        if changed == 0 {
            // Dropping the transaction rolls it back
            return Ok(false);
        }

        insert_audit(&tx, entry)?;
        tx.commit()?;

        Ok(true)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.lock()?;
        insert_audit(&conn, entry)
    }

    fn audit_trail(&self, kind: RecordKind, id: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entry_id, user_id, action, model_type, model_id, changes, created_at
             FROM audit_log
             WHERE model_type = ?1 AND model_id = ?2
             ORDER BY id ASC",
        )?;

        let entries = stmt
            .query_map(params![kind.as_str(), id], row_to_audit)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications (
                notification_id, recipient, title, message, model_type, model_id, created_at, read_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                notification.id,
                notification.recipient.key(),
                notification.title,
                notification.message,
                notification.model_type.map(|k| k.as_str()),
                notification.model_id,
                ts(&notification.created_at),
                notification.read_at.as_ref().map(ts),
            ],
        )?;

        Ok(())
    }

    fn notifications_for(
        &self,
        recipient: &Recipient,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let sql = if unread_only {
            "SELECT notification_id, recipient, title, message, model_type, model_id, created_at, read_at
             FROM notifications WHERE recipient = ?1 AND read_at IS NULL ORDER BY id DESC"
        } else {
            "SELECT notification_id, recipient, title, message, model_type, model_id, created_at, read_at
             FROM notifications WHERE recipient = ?1 ORDER BY id DESC"
        };

        let mut stmt = conn.prepare(sql)?;
        let notifications = stmt
            .query_map(params![recipient.key()], row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    fn mark_notification_read(&self, notification_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notifications SET read_at = ?1 WHERE notification_id = ?2 AND read_at IS NULL",
            params![ts(&timestamp_now()), notification_id],
        )?;
        Ok(changed > 0)
    }

    fn count_records(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(count)
    }
}
