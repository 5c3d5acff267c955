// 📦 Bulk operations - chunked create / update / delete / submit and CSV import
//
// Items are processed independently: one bad row is reported in `errors` and
// never aborts the rest of the batch. Creates and imports write each chunk of
// `batch_size` rows in one SQLite transaction; updates, deletes and submits are
// per-record transitions, so for them a chunk is only a progress unit.

use crate::config::BulkConfig;
use crate::db::InsertOutcome;
use crate::error::WorkflowError;
use crate::records::{NewRecord, RecordDetails, RecordKind, RecordUpdate};
use crate::roles::Actor;
use crate::workflow::ValidationWorkflowService;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based item position (CSV rows count the header as row 1)
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    pub success: bool,
    pub processed: usize,
    pub succeeded: usize,
    /// Duplicates recognised by idempotency hash
    pub skipped: usize,
    pub failed: usize,
    pub auto_approved: usize,
    pub errors: Vec<RowError>,
    pub created_ids: Vec<i64>,
}

impl BulkResult {
    fn fail(&mut self, row: usize, id: Option<i64>, err: &WorkflowError) {
        if !err.is_expected() {
            warn!(row, "bulk item hit a storage error: {}", err);
        }
        self.failed += 1;
        self.errors.push(RowError {
            row,
            id,
            code: err.code().to_string(),
            error: err.to_string(),
        });
    }

    fn finish(mut self, operation: &str) -> Self {
        self.success = self.failed == 0;
        // Imports fail bad rows before their chunk is flushed
        self.errors.sort_by_key(|e| e.row);
        info!(
            processed = self.processed,
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed,
            "bulk {} finished",
            operation
        );
        self
    }
}

/// One line of an import file
#[derive(Debug, Clone, Default, Deserialize)]
struct ImportRow {
    kind: String,
    tanggal: String,
    amount: String,
    input_by: String,
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
    #[serde(default)]
    pendapatan_id: Option<i64>,
    #[serde(default)]
    pengeluaran_id: Option<i64>,
    #[serde(default)]
    nama_pengeluaran: Option<String>,
    #[serde(default)]
    keterangan: Option<String>,
}

impl ImportRow {
    fn into_new_record(self) -> Result<NewRecord, WorkflowError> {
        let kind = RecordKind::parse(&self.kind)
            .ok_or_else(|| WorkflowError::UnknownModelType(self.kind.clone()))?;

        let tanggal = NaiveDate::parse_from_str(self.tanggal.trim(), "%Y-%m-%d").map_err(|_| {
            WorkflowError::InvalidInput(format!("invalid tanggal '{}'", self.tanggal))
        })?;

        let amount = Decimal::from_str(self.amount.trim()).map_err(|_| {
            WorkflowError::InvalidInput(format!("invalid amount '{}'", self.amount))
        })?;

        let details = match kind {
            RecordKind::Tindakan => RecordDetails::Tindakan {
                shift_id: self.shift_id,
                pasien_id: self.pasien_id,
                jenis_tindakan_id: self.jenis_tindakan_id,
                dokter_id: self.dokter_id,
                paramedis_id: self.paramedis_id,
            },
            RecordKind::PendapatanHarian => RecordDetails::PendapatanHarian {
                shift_id: self.shift_id,
                pendapatan_id: self.pendapatan_id,
            },
            RecordKind::PengeluaranHarian => RecordDetails::PengeluaranHarian {
                shift_id: self.shift_id,
                pengeluaran_id: self.pengeluaran_id,
            },
            RecordKind::Pengeluaran => RecordDetails::Pengeluaran {
                nama_pengeluaran: non_empty(self.nama_pengeluaran),
                keterangan: non_empty(self.keterangan),
            },
        };

        Ok(NewRecord::new(details, amount, tanggal, self.input_by.trim()).with_idempotency_hash())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct BulkOperationService {
    workflow: Arc<ValidationWorkflowService>,
    batch_size: usize,
}

impl BulkOperationService {
    pub fn new(workflow: Arc<ValidationWorkflowService>, config: &BulkConfig) -> Self {
        BulkOperationService {
            workflow,
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn bulk_create(&self, records: &[NewRecord], actor: &Actor) -> BulkResult {
        let mut result = BulkResult::default();

        for (chunk_no, chunk) in records.chunks(self.batch_size).enumerate() {
            let first_row = chunk_no * self.batch_size + 1;
            let rows: Vec<usize> = (first_row..first_row + chunk.len()).collect();
            self.create_chunk(&mut result, &rows, chunk, actor);
        }

        result.finish("create")
    }

    pub fn bulk_update(
        &self,
        kind: RecordKind,
        updates: &[(i64, RecordUpdate)],
        actor: &Actor,
    ) -> BulkResult {
        let mut result = BulkResult::default();

        for (chunk_no, chunk) in updates.chunks(self.batch_size).enumerate() {
            debug!(chunk = chunk_no, size = chunk.len(), "bulk update chunk");
            for (offset, (id, update)) in chunk.iter().enumerate() {
                let row = chunk_no * self.batch_size + offset + 1;
                result.processed += 1;
                match self.workflow.update_record(kind, *id, update, actor) {
                    Ok(_) => result.succeeded += 1,
                    Err(e) => result.fail(row, Some(*id), &e),
                }
            }
        }

        result.finish("update")
    }

    pub fn bulk_delete(&self, kind: RecordKind, ids: &[i64], actor: &Actor) -> BulkResult {
        let mut result = BulkResult::default();

        for (chunk_no, chunk) in ids.chunks(self.batch_size).enumerate() {
            debug!(chunk = chunk_no, size = chunk.len(), "bulk delete chunk");
            for (offset, id) in chunk.iter().enumerate() {
                let row = chunk_no * self.batch_size + offset + 1;
                result.processed += 1;
                match self.workflow.delete_record(kind, *id, actor) {
                    Ok(_) => result.succeeded += 1,
                    Err(e) => result.fail(row, Some(*id), &e),
                }
            }
        }

        result.finish("delete")
    }

    pub fn bulk_submit(&self, kind: RecordKind, ids: &[i64], actor: &Actor) -> BulkResult {
        let mut result = BulkResult::default();

        for (chunk_no, chunk) in ids.chunks(self.batch_size).enumerate() {
            debug!(chunk = chunk_no, size = chunk.len(), "bulk submit chunk");
            for (offset, id) in chunk.iter().enumerate() {
                let row = chunk_no * self.batch_size + offset + 1;
                result.processed += 1;
                match self.workflow.submit_for_validation(kind, *id, actor) {
                    Ok(outcome) => {
                        result.succeeded += 1;
                        if outcome.auto_approved == Some(true) {
                            result.auto_approved += 1;
                        }
                    }
                    Err(e) => result.fail(row, Some(*id), &e),
                }
            }
        }

        result.finish("submit")
    }

    /// Import records from CSV. Rows already imported are skipped.
    pub fn import_csv(&self, csv_path: &Path, actor: &Actor) -> Result<BulkResult> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(csv_path)
            .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

        let mut result = BulkResult::default();
        let mut lines = Vec::with_capacity(self.batch_size);
        let mut pending = Vec::with_capacity(self.batch_size);

        for (index, row) in rdr.deserialize::<ImportRow>().enumerate() {
            // Header is line 1
            let line = index + 2;

            let new = row
                .map_err(|e| WorkflowError::InvalidInput(format!("malformed row: {}", e)))
                .and_then(ImportRow::into_new_record);

            match new {
                Ok(new) => {
                    lines.push(line);
                    pending.push(new);
                }
                Err(e) => {
                    result.processed += 1;
                    result.fail(line, None, &e);
                }
            }

            if pending.len() == self.batch_size {
                self.create_chunk(&mut result, &lines, &pending, actor);
                lines.clear();
                pending.clear();
            }
        }
        if !pending.is_empty() {
            self.create_chunk(&mut result, &lines, &pending, actor);
        }

        info!(path = %csv_path.display(), "csv import done");
        Ok(result.finish("import"))
    }

    /// One chunk is one storage transaction; `rows` holds the positions reported in errors
    fn create_chunk(
        &self,
        result: &mut BulkResult,
        rows: &[usize],
        chunk: &[NewRecord],
        actor: &Actor,
    ) {
        debug!(first_row = rows.first().copied(), size = chunk.len(), "bulk create chunk");

        let outcomes = match self.workflow.create_records(chunk, actor) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                // The whole transaction failed, so no row in it was written
                for row in rows {
                    result.processed += 1;
                    result.fail(*row, None, &e);
                }
                return;
            }
        };

        for (row, outcome) in rows.iter().zip(outcomes) {
            result.processed += 1;
            match outcome {
                Ok(InsertOutcome::Inserted(record)) => {
                    result.succeeded += 1;
                    result.created_ids.push(record.id);
                }
                Ok(InsertOutcome::Duplicate) => result.skipped += 1,
                Err(e) => result.fail(*row, None, &e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::db::{RecordStore, SqliteStore};
    use crate::notification::NotificationService;
    use crate::records::ValidationStatus;
    use std::io::Write;

    const HEADER: &str = "kind,tanggal,amount,input_by,shift_id,pasien_id,jenis_tindakan_id,dokter_id,paramedis_id,pendapatan_id,pengeluaran_id,nama_pengeluaran,keterangan";

    fn service(batch_size: usize) -> BulkOperationService {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let workflow = ValidationWorkflowService::new(
            store,
            ValidationConfig::default(),
            Arc::new(NotificationService::new()),
        );
        BulkOperationService::new(Arc::new(workflow), &BulkConfig { batch_size })
    }

    fn actor() -> Actor {
        Actor::new("petugas-1", "petugas")
    }

    fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn procedure(amount: i64) -> NewRecord {
        NewRecord::new(
            RecordDetails::Tindakan {
                shift_id: Some(1),
                pasien_id: Some(2),
                jenis_tindakan_id: Some(3),
                dokter_id: None,
                paramedis_id: None,
            },
            Decimal::from(amount),
            NaiveDate::from_ymd_opt(2025, 2, 5).unwrap(),
            "petugas-1",
        )
    }

    #[test]
    fn test_import_csv_skips_bad_rows_and_duplicates() {
        let svc = service(2);
        let file = write_csv(&[
            "tindakan,2025-02-05,150000,petugas-1,1,10,3,2,,,,,",
            "pendapatan_harian,2025-02-05,750000.50,petugas-1,1,,,,,4,,,",
            "pengeluaran,2025-02-05,85000,petugas-1,,,,,,,,Listrik,Token PLN",
            "laundry,2025-02-05,1000,petugas-1,,,,,,,,,",
            "tindakan,05/02/2025,1000,petugas-1,1,,,,,,,,",
            "tindakan,2025-02-05,abc,petugas-1,1,,,,,,,,",
        ]);

        let result = svc.import_csv(file.path(), &actor()).unwrap();
        assert_eq!(result.processed, 6);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 3);
        assert!(!result.success);
        assert_eq!(result.created_ids.len(), 3);

        let rows: Vec<usize> = result.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![5, 6, 7]);
        assert_eq!(result.errors[0].code, "unknown_model_type");
        assert_eq!(result.errors[1].code, "invalid_input");

        // Same file again: every good row is a duplicate
        let again = svc.import_csv(file.path(), &actor()).unwrap();
        assert_eq!(again.succeeded, 0);
        assert_eq!(again.skipped, 3);
    }

    #[test]
    fn test_import_duplicate_inside_one_chunk() {
        let svc = service(3);
        let file = write_csv(&[
            "pengeluaran,2025-02-05,85000,petugas-1,,,,,,,,Listrik,Token PLN",
            "pengeluaran,2025-02-05,85000,petugas-1,,,,,,,,Listrik,Token PLN",
            "pengeluaran,2025-02-05,-5,petugas-1,,,,,,,,Air,",
            "pengeluaran,2025-02-06,40000,petugas-1,,,,,,,,Air,Galon",
        ]);

        let result = svc.import_csv(file.path(), &actor()).unwrap();
        assert_eq!(result.processed, 4);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].row, 4);
        assert_eq!(result.errors[0].code, "invalid_input");

        let store = svc.workflow.store();
        for id in &result.created_ids {
            let trail = store.audit_trail(RecordKind::Pengeluaran, *id).unwrap();
            assert_eq!(trail.len(), 1);
        }
    }

    #[test]
    fn test_import_missing_file() {
        let svc = service(10);
        assert!(svc
            .import_csv(Path::new("/nonexistent/records.csv"), &actor())
            .is_err());
    }

    #[test]
    fn test_bulk_create_and_submit_across_chunks() {
        let svc = service(2);
        let records: Vec<NewRecord> = vec![
            procedure(50_000),
            procedure(150_000),
            procedure(0),
            procedure(2_000_000),
            procedure(20_000),
        ];

        let created = svc.bulk_create(&records, &actor());
        assert_eq!(created.processed, 5);
        assert_eq!(created.succeeded, 4);
        assert_eq!(created.failed, 1);
        assert_eq!(created.errors[0].row, 3);

        let submitted = svc.bulk_submit(RecordKind::Tindakan, &created.created_ids, &actor());
        assert!(submitted.success);
        assert_eq!(submitted.succeeded, 4);
        assert_eq!(submitted.auto_approved, 2);
    }

    #[test]
    fn test_bulk_update_and_delete_respect_editability() {
        let svc = service(100);
        let created = svc.bulk_create(&[procedure(150_000), procedure(10_000)], &actor());
        let (editable, approved) = (created.created_ids[0], created.created_ids[1]);
        svc.bulk_submit(RecordKind::Tindakan, &[approved], &actor());

        let update = RecordUpdate {
            amount: Some(Decimal::from(175_000)),
            ..Default::default()
        };
        let updated = svc.bulk_update(
            RecordKind::Tindakan,
            &[(editable, update.clone()), (approved, update)],
            &actor(),
        );
        assert_eq!(updated.succeeded, 1);
        assert_eq!(updated.errors[0].id, Some(approved));
        assert_eq!(updated.errors[0].code, "not_editable");

        let deleted = svc.bulk_delete(RecordKind::Tindakan, &[editable, approved], &actor());
        assert_eq!(deleted.succeeded, 1);
        assert_eq!(deleted.failed, 1);

        let remaining = svc
            .workflow
            .get_record(RecordKind::Tindakan, approved)
            .unwrap();
        assert_eq!(remaining.status_validasi, ValidationStatus::Approved);
    }
}
