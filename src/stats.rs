// 📊 Petugas statistics - per-user daily / weekly / monthly figures
//
// Computed from the record store and cached per (user, period, date).
// The workflow invalidates a user's entries whenever one of their records
// changes.

use crate::config::StatsConfig;
use crate::db::{timestamp_now, RecordFilter, RecordStore};
use crate::records::{RecordKind, ValidationStatus};
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use moka::sync::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsPeriod {
    Today,
    /// Monday through Sunday
    ThisWeek,
    ThisMonth,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Today => "today",
            StatsPeriod::ThisWeek => "this_week",
            StatsPeriod::ThisMonth => "this_month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "today" | "day" => Some(StatsPeriod::Today),
            "this_week" | "week" => Some(StatsPeriod::ThisWeek),
            "this_month" | "month" => Some(StatsPeriod::ThisMonth),
            _ => None,
        }
    }

    /// Inclusive date range containing `reference`
    pub fn range(&self, reference: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            StatsPeriod::Today => (reference, reference),
            StatsPeriod::ThisWeek => {
                let offset = i64::from(reference.weekday().num_days_from_monday());
                let monday = reference - Duration::days(offset);
                (monday, monday + Duration::days(6))
            }
            StatsPeriod::ThisMonth => {
                let first = reference.with_day(1).unwrap_or(reference);
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(reference);
                (first, last)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetugasStats {
    pub user_id: String,
    pub period: StatsPeriod,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_records: usize,
    pub by_kind: BTreeMap<RecordKind, usize>,
    pub tindakan_count: usize,
    // Money totals leave rejected records out
    pub tindakan_total: Decimal,
    pub pendapatan_total: Decimal,
    pub pengeluaran_total: Decimal,
    pub net_income: Decimal,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub revision: usize,
    pub approval_rate: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetugasSummary {
    pub today: PetugasStats,
    pub this_week: PetugasStats,
    pub this_month: PetugasStats,
}

pub struct PetugasStatsService {
    store: Arc<dyn RecordStore>,
    cache: Cache<String, PetugasStats>,
}

impl PetugasStatsService {
    pub fn new(store: Arc<dyn RecordStore>, config: &StatsConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(std::time::Duration::from_secs(config.cache_ttl_secs))
            .build();

        PetugasStatsService { store, cache }
    }

    fn cache_key(user_id: &str, period: StatsPeriod, reference: NaiveDate) -> String {
        format!("{}|{}|{}", user_id, period.as_str(), reference)
    }

    pub fn stats_for(
        &self,
        user_id: &str,
        period: StatsPeriod,
        reference: NaiveDate,
    ) -> Result<PetugasStats> {
        let key = Self::cache_key(user_id, period, reference);
        if let Some(cached) = self.cache.get(&key) {
            debug!(user = user_id, period = period.as_str(), "stats cache hit");
            return Ok(cached);
        }

        let stats = self.compute(user_id, period, reference)?;
        self.cache.insert(key, stats.clone());
        Ok(stats)
    }

    pub fn summary(&self, user_id: &str, reference: NaiveDate) -> Result<PetugasSummary> {
        Ok(PetugasSummary {
            today: self.stats_for(user_id, StatsPeriod::Today, reference)?,
            this_week: self.stats_for(user_id, StatsPeriod::ThisWeek, reference)?,
            this_month: self.stats_for(user_id, StatsPeriod::ThisMonth, reference)?,
        })
    }

    /// Drop every cached entry for this user
    pub fn invalidate_user(&self, user_id: &str) {
        let prefix = format!("{}|", user_id);
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &keys {
            self.cache.invalidate(key);
        }
        if !keys.is_empty() {
            debug!(user = user_id, entries = keys.len(), "stats cache invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    fn compute(
        &self,
        user_id: &str,
        period: StatsPeriod,
        reference: NaiveDate,
    ) -> Result<PetugasStats> {
        let (from, to) = period.range(reference);
        let records = self.store.list_records(&RecordFilter {
            input_by: Some(user_id.to_string()),
            tanggal_from: Some(from),
            tanggal_to: Some(to),
            ..Default::default()
        })?;

        let mut by_kind: BTreeMap<RecordKind, usize> = BTreeMap::new();
        let mut totals: BTreeMap<RecordKind, Decimal> = BTreeMap::new();
        let (mut pending, mut approved, mut rejected, mut revision) = (0, 0, 0, 0);

        for record in &records {
            *by_kind.entry(record.kind).or_insert(0) += 1;

            match record.status_validasi {
                ValidationStatus::Pending => pending += 1,
                ValidationStatus::Approved => approved += 1,
                ValidationStatus::Rejected => rejected += 1,
                ValidationStatus::Revision => revision += 1,
            }

            if record.status_validasi != ValidationStatus::Rejected {
                *totals.entry(record.kind).or_insert(Decimal::ZERO) += record.amount;
            }
        }

        let total_of = |kind: RecordKind| totals.get(&kind).copied().unwrap_or(Decimal::ZERO);
        let tindakan_total = total_of(RecordKind::Tindakan);
        let pendapatan_total = total_of(RecordKind::PendapatanHarian);
        let pengeluaran_total =
            total_of(RecordKind::PengeluaranHarian) + total_of(RecordKind::Pengeluaran);

        let revenue: Decimal = totals
            .iter()
            .filter(|(kind, _)| kind.is_revenue())
            .map(|(_, amount)| *amount)
            .sum();

        let total_records = records.len();
        let approval_rate = if total_records == 0 {
            0.0
        } else {
            (approved as f64 / total_records as f64 * 10_000.0).round() / 100.0
        };

        debug!(
            user = user_id,
            period = period.as_str(),
            records = total_records,
            "stats computed"
        );

        Ok(PetugasStats {
            user_id: user_id.to_string(),
            period,
            from,
            to,
            total_records,
            tindakan_count: by_kind.get(&RecordKind::Tindakan).copied().unwrap_or(0),
            by_kind,
            tindakan_total,
            pendapatan_total,
            pengeluaran_total,
            net_income: revenue - pengeluaran_total,
            pending,
            approved,
            rejected,
            revision,
            approval_rate,
            generated_at: timestamp_now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InsertOutcome, SqliteStore};
    use crate::records::{NewRecord, RecordDetails};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(store: &dyn RecordStore, kind: RecordKind, amount: i64, day: NaiveDate, user: &str) {
        let new = NewRecord::new(RecordDetails::empty(kind), Decimal::from(amount), day, user);
        match store.insert_record(&new, user).unwrap() {
            InsertOutcome::Inserted(_) => {}
            InsertOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    fn service() -> (Arc<dyn RecordStore>, PetugasStatsService) {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let stats = PetugasStatsService::new(store.clone(), &StatsConfig::default());
        (store, stats)
    }

    #[test]
    fn test_period_ranges() {
        // 2025-02-05 is a Wednesday
        let wed = date(2025, 2, 5);
        assert_eq!(StatsPeriod::Today.range(wed), (wed, wed));
        assert_eq!(
            StatsPeriod::ThisWeek.range(wed),
            (date(2025, 2, 3), date(2025, 2, 9))
        );
        assert_eq!(
            StatsPeriod::ThisMonth.range(wed),
            (date(2025, 2, 1), date(2025, 2, 28))
        );
        assert_eq!(
            StatsPeriod::ThisMonth.range(date(2024, 12, 31)),
            (date(2024, 12, 1), date(2024, 12, 31))
        );
        assert_eq!(StatsPeriod::parse("week"), Some(StatsPeriod::ThisWeek));
        assert_eq!(StatsPeriod::parse("year"), None);
    }

    #[test]
    fn test_totals_by_kind() {
        let (store, stats) = service();
        let day = date(2025, 2, 5);
        seed(store.as_ref(), RecordKind::Tindakan, 150_000, day, "petugas-1");
        seed(store.as_ref(), RecordKind::Tindakan, 50_000, day, "petugas-1");
        seed(store.as_ref(), RecordKind::PendapatanHarian, 300_000, day, "petugas-1");
        seed(store.as_ref(), RecordKind::Pengeluaran, 80_000, day, "petugas-1");
        seed(store.as_ref(), RecordKind::Tindakan, 999_000, day, "petugas-2");
        seed(store.as_ref(), RecordKind::Tindakan, 10_000, date(2025, 1, 31), "petugas-1");

        let today = stats.stats_for("petugas-1", StatsPeriod::Today, day).unwrap();
        assert_eq!(today.total_records, 4);
        assert_eq!(today.tindakan_count, 2);
        assert_eq!(today.tindakan_total, Decimal::from(200_000));
        assert_eq!(today.pendapatan_total, Decimal::from(300_000));
        assert_eq!(today.pengeluaran_total, Decimal::from(80_000));
        assert_eq!(today.net_income, Decimal::from(420_000));
        assert_eq!(today.pending, 4);
        assert_eq!(today.approval_rate, 0.0);

        // January record falls outside February
        let month = stats.stats_for("petugas-1", StatsPeriod::ThisMonth, day).unwrap();
        assert_eq!(month.total_records, 4);
    }

    #[test]
    fn test_cache_and_invalidation() {
        let (store, stats) = service();
        let day = date(2025, 2, 5);
        seed(store.as_ref(), RecordKind::Tindakan, 150_000, day, "petugas-1");

        let first = stats.stats_for("petugas-1", StatsPeriod::Today, day).unwrap();
        assert_eq!(first.total_records, 1);

        seed(store.as_ref(), RecordKind::Tindakan, 175_000, day, "petugas-1");
        let cached = stats.stats_for("petugas-1", StatsPeriod::Today, day).unwrap();
        assert_eq!(cached.total_records, 1);

        stats.invalidate_user("petugas-1");
        let fresh = stats.stats_for("petugas-1", StatsPeriod::Today, day).unwrap();
        assert_eq!(fresh.total_records, 2);
    }

    #[test]
    fn test_summary_serializes() {
        let (_store, stats) = service();
        let summary = stats.summary("nobody", date(2025, 2, 5)).unwrap();
        assert_eq!(summary.this_week.total_records, 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["today"]["period"], "today");
        assert_eq!(json["this_month"]["from"], "2025-02-01");
    }
}
