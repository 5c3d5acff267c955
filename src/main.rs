use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clinic_validation::logging::init_tracing;
use clinic_validation::{
    Actor, AppConfig, BatchAction, ClinicServices, DecisionOptions, InsertOutcome, NewRecord,
    RecordDetails, RecordKind, StatsPeriod, WorkflowError, WorkflowResult,
};

#[derive(Parser)]
#[command(name = "clinic-validation", version, about = "Clinic financial record validation")]
struct Cli {
    /// JSON config file (falls back to CLINIC_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the config file
    #[arg(long, global = true, env = "CLINIC_DB_PATH")]
    db: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true, env = "CLINIC_ACTOR", default_value = "system")]
    actor: String,

    /// Acting user's role (petugas, supervisor, manager, ...)
    #[arg(long, global = true, env = "CLINIC_ROLE", default_value = "petugas")]
    role: String,

    #[command(subcommand)]
    cmd: Commands,
}

/// A kind or "all"
#[derive(Clone, Copy)]
struct KindFilter(Option<RecordKind>);

#[derive(Args)]
struct RecordRef {
    /// tindakan | pendapatan_harian | pengeluaran_harian | pengeluaran
    #[arg(value_parser = parse_kind)]
    kind: RecordKind,
    id: i64,
}

#[derive(Args)]
struct CreateArgs {
    #[arg(value_parser = parse_kind)]
    kind: RecordKind,
    amount: String,
    /// Record date, YYYY-MM-DD (default: today)
    #[arg(long)]
    tanggal: Option<String>,
    /// Petugas who entered the record (default: --actor)
    #[arg(long)]
    input_by: Option<String>,
    #[arg(long)]
    shift_id: Option<i64>,
    #[arg(long)]
    pasien_id: Option<i64>,
    #[arg(long)]
    jenis_tindakan_id: Option<i64>,
    #[arg(long)]
    dokter_id: Option<i64>,
    #[arg(long)]
    paramedis_id: Option<i64>,
    #[arg(long)]
    pendapatan_id: Option<i64>,
    #[arg(long)]
    pengeluaran_id: Option<i64>,
    #[arg(long)]
    nama_pengeluaran: Option<String>,
    #[arg(long)]
    keterangan: Option<String>,
    /// Submit for validation right after creating
    #[arg(long)]
    submit: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Create a record
    Create(CreateArgs),
    /// Import records from a CSV file
    Import {
        #[arg(value_name = "CSV")]
        file: PathBuf,
    },
    /// Submit a record for validation
    Submit(RecordRef),
    /// Approve a submitted record
    Approve {
        #[command(flatten)]
        record: RecordRef,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Reject a submitted record
    Reject {
        #[command(flatten)]
        record: RecordRef,
        #[arg(long)]
        reason: String,
    },
    /// Send a submitted record back for revision
    Revise {
        #[command(flatten)]
        record: RecordRef,
        #[arg(long)]
        reason: String,
    },
    /// Resubmit a record after revision
    Resubmit {
        #[command(flatten)]
        record: RecordRef,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Approve or reject many records at once
    Batch {
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// approve | reject
        #[arg(value_parser = parse_action)]
        action: BatchAction,
        /// Comma-separated record ids
        #[arg(value_delimiter = ',', required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show one record
    Show(RecordRef),
    /// Show the audit trail of a record
    Audit(RecordRef),
    /// Records waiting for the acting role
    Queue {
        #[arg(long, value_parser = parse_kind_filter)]
        kind: Option<KindFilter>,
    },
    /// Validation statistics over a trailing window
    Stats {
        /// A record kind or "all"
        #[arg(long, value_parser = parse_kind_filter)]
        kind: Option<KindFilter>,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Per-petugas statistics
    PetugasStats {
        /// User id (default: --actor)
        user: Option<String>,
        /// today | week | month; omit for all three
        #[arg(long, value_parser = parse_period)]
        period: Option<StatsPeriod>,
        /// Reference date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
}

fn parse_kind(s: &str) -> std::result::Result<RecordKind, String> {
    RecordKind::parse(s).ok_or_else(|| WorkflowError::UnknownModelType(s.to_string()).to_string())
}

fn parse_kind_filter(s: &str) -> std::result::Result<KindFilter, String> {
    RecordKind::parse_filter(s)
        .map(KindFilter)
        .ok_or_else(|| WorkflowError::UnknownModelType(s.to_string()).to_string())
}

fn parse_action(s: &str) -> std::result::Result<BatchAction, String> {
    BatchAction::parse(s).ok_or_else(|| format!("unknown batch action '{}'", s))
}

fn parse_period(s: &str) -> std::result::Result<StatsPeriod, String> {
    StatsPeriod::parse(s).ok_or_else(|| format!("unknown period '{}'", s))
}

fn parse_date(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s)),
        None => Ok(Utc::now().date_naive()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a workflow outcome; expected failures give exit code 2
fn report(kind: RecordKind, id: i64, outcome: Result<WorkflowResult, WorkflowError>) -> Result<ExitCode> {
    let result = WorkflowResult::settle(kind, id, outcome)?;
    if result.success {
        println!("✅ {} #{} → {:?}", kind.label(), id, result.status);
    } else {
        eprintln!("❌ {} #{}: {}", kind.label(), id, result.error.as_deref().unwrap_or("failed"));
    }
    print_json(&result)?;
    Ok(if result.success { ExitCode::SUCCESS } else { ExitCode::from(2) })
}

/// Expected failures outside the transition operations
fn expected<T>(outcome: std::result::Result<T, WorkflowError>) -> Result<std::result::Result<T, ExitCode>> {
    match outcome {
        Ok(value) => Ok(Ok(value)),
        Err(WorkflowError::Storage(e)) => Err(e),
        Err(e) => {
            eprintln!("❌ {}", e);
            Ok(Err(ExitCode::from(2)))
        }
    }
}

fn details_for(args: &CreateArgs) -> RecordDetails {
    match args.kind {
        RecordKind::Tindakan => RecordDetails::Tindakan {
            shift_id: args.shift_id,
            pasien_id: args.pasien_id,
            jenis_tindakan_id: args.jenis_tindakan_id,
            dokter_id: args.dokter_id,
            paramedis_id: args.paramedis_id,
        },
        RecordKind::PendapatanHarian => RecordDetails::PendapatanHarian {
            shift_id: args.shift_id,
            pendapatan_id: args.pendapatan_id,
        },
        RecordKind::PengeluaranHarian => RecordDetails::PengeluaranHarian {
            shift_id: args.shift_id,
            pengeluaran_id: args.pengeluaran_id,
        },
        RecordKind::Pengeluaran => RecordDetails::Pengeluaran {
            nama_pengeluaran: args.nama_pengeluaran.clone(),
            keterangan: args.keterangan.clone(),
        },
    }
}

fn main() -> Result<ExitCode> {
    init_tracing("clinic_validation=info");
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }

    let services = ClinicServices::open(&config)?;
    let actor = Actor::new(cli.actor.as_str(), cli.role.as_str());
    let workflow = &services.workflow;

    match cli.cmd {
        Commands::Init => {
            println!("🔧 Database initialized at {}", config.database_path.display());
            println!("✓ {} records on file", services.store.count_records()?);
        }

        Commands::Create(args) => {
            let amount = Decimal::from_str(args.amount.trim())
                .with_context(|| format!("Invalid amount '{}'", args.amount))?;
            let tanggal = parse_date(args.tanggal.as_deref())?;
            let input_by = args.input_by.clone().unwrap_or_else(|| actor.id.clone());
            let new = NewRecord::new(details_for(&args), amount, tanggal, &input_by);

            let record = match expected(workflow.create_record(&new, &actor))? {
                Ok(InsertOutcome::Inserted(record)) => record,
                Ok(InsertOutcome::Duplicate) => {
                    println!("⚠️  Duplicate record skipped");
                    return Ok(ExitCode::SUCCESS);
                }
                Err(code) => return Ok(code),
            };
            println!("✓ Created {} #{}", record.kind.label(), record.id);

            if args.submit {
                return report(
                    record.kind,
                    record.id,
                    workflow.submit_for_validation(record.kind, record.id, &actor),
                );
            }
            print_json(&record)?;
        }

        Commands::Import { file } => {
            println!("📂 Importing {}...", file.display());
            let result = services.bulk.import_csv(&file, &actor)?;
            println!(
                "✓ {} created, {} duplicates skipped, {} failed",
                result.succeeded, result.skipped, result.failed
            );
            print_json(&result)?;
            if !result.success {
                return Ok(ExitCode::from(2));
            }
        }

        Commands::Submit(r) => {
            return report(r.kind, r.id, workflow.submit_for_validation(r.kind, r.id, &actor));
        }

        Commands::Approve { record: r, comment } => {
            let opts = DecisionOptions {
                comment,
                ..Default::default()
            };
            return report(r.kind, r.id, workflow.approve(r.kind, r.id, &actor, &opts));
        }

        Commands::Reject { record: r, reason } => {
            let opts = DecisionOptions::default();
            return report(r.kind, r.id, workflow.reject(r.kind, r.id, &reason, &actor, &opts));
        }

        Commands::Revise { record: r, reason } => {
            let opts = DecisionOptions::default();
            return report(
                r.kind,
                r.id,
                workflow.request_revision(r.kind, r.id, &reason, &actor, &opts),
            );
        }

        Commands::Resubmit { record: r, notes } => {
            return report(
                r.kind,
                r.id,
                workflow.resubmit_after_revision(r.kind, r.id, notes.as_deref(), &actor),
            );
        }

        Commands::Batch {
            kind,
            action,
            ids,
            reason,
        } => {
            let result = match expected(workflow.batch_approval(
                &ids,
                kind,
                action,
                reason.as_deref(),
                &actor,
            ))? {
                Ok(result) => result,
                Err(code) => return Ok(code),
            };
            println!(
                "✓ {} processed: {} approved, {} rejected, {} failed",
                result.processed, result.approved, result.rejected, result.failed
            );
            print_json(&result)?;
            if !result.success {
                return Ok(ExitCode::from(2));
            }
        }

        Commands::Show(r) => match expected(workflow.get_record(r.kind, r.id))? {
            Ok(record) => print_json(&record)?,
            Err(code) => return Ok(code),
        },

        Commands::Audit(r) => match expected(workflow.audit_trail(r.kind, r.id))? {
            Ok(trail) => {
                for entry in &trail {
                    println!("{}  {:<18} {}", entry.created_at.to_rfc3339(), entry.action.as_str(), entry.user_id);
                }
                print_json(&trail)?;
            }
            Err(code) => return Ok(code),
        },

        Commands::Queue { kind } => {
            let kind = kind.and_then(|k| k.0);
            match expected(workflow.pending_queue(&actor, kind))? {
                Ok(queue) => {
                    println!("📋 {} record(s) waiting for {}", queue.len(), actor.role);
                    print_json(&queue)?;
                }
                Err(code) => return Ok(code),
            }
        }

        Commands::Stats { kind, days } => {
            let kind = kind.and_then(|k| k.0);
            match expected(workflow.get_validation_stats(kind, days))? {
                Ok(stats) => print_json(&stats)?,
                Err(code) => return Ok(code),
            }
        }

        Commands::PetugasStats { user, period, date } => {
            let user = user.unwrap_or_else(|| actor.id.clone());
            let reference = parse_date(date.as_deref())?;
            match period {
                Some(period) => print_json(&services.stats.stats_for(&user, period, reference)?)?,
                None => print_json(&services.stats.summary(&user, reference)?)?,
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
