// 📊 Dashboard Summary - the aggregate views behind the dashboard charts
//
// Bank totals, quarterly trend, industry ranking and age cohorts. All are pure
// functions over a filtered record slice; rendering is someone else's job.

use crate::quality::{IssueKind, QualityLog};
use crate::record::LoanRecord;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// BANK TOTALS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTotal {
    pub bank: String,
    /// Sum of working-capital borrowing (missing cells count as 0)
    pub total: f64,
    pub count: usize,
}

/// Per bank, ordered by bank name
pub fn bank_totals(records: &[LoanRecord]) -> Vec<BankTotal> {
    let mut by_bank: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for r in records {
        let entry = by_bank.entry(r.bank.as_str()).or_insert((0.0, 0));
        entry.0 += r.working_capital.unwrap_or(0.0);
        entry.1 += 1;
    }

    by_bank
        .into_iter()
        .map(|(bank, (total, count))| BankTotal {
            bank: bank.to_string(),
            total,
            count,
        })
        .collect()
}

// ============================================================================
// QUARTERLY TREND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quarter {
    pub year: i32,
    /// 1..=4
    pub quarter: u32,
}

impl Quarter {
    pub fn of(date: NaiveDate) -> Self {
        Quarter {
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
        }
    }

    pub fn next(self) -> Self {
        if self.quarter == 4 {
            Quarter {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Quarter {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }

    /// "2023Q1"
    pub fn label(&self) -> String {
        format!("{}Q{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterPoint {
    pub quarter: Quarter,
    pub label: String,
    /// Sum of loan amounts (missing cells count as 0)
    pub amount: f64,
    pub count: usize,
}

/// Every quarter from the first to the last dated record, gaps filled with zeros.
/// Undated records are left out.
pub fn quarterly_trend(records: &[LoanRecord]) -> Vec<QuarterPoint> {
    let mut buckets: BTreeMap<Quarter, (f64, usize)> = BTreeMap::new();
    for r in records {
        if let Some(date) = r.date {
            let entry = buckets.entry(Quarter::of(date)).or_insert((0.0, 0));
            entry.0 += r.amount.unwrap_or(0.0);
            entry.1 += 1;
        }
    }

    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Vec::new(),
    };

    let mut points = Vec::new();
    let mut q = first;
    while q <= last {
        let (amount, count) = buckets.get(&q).copied().unwrap_or((0.0, 0));
        points.push(QuarterPoint {
            quarter: q,
            label: q.label(),
            amount,
            count,
        });
        q = q.next();
    }
    points
}

// ============================================================================
// INDUSTRY RANKING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryTotal {
    pub industry: String,
    pub total: f64,
    pub count: usize,
}

/// Sorted by total descending, then count descending. Rows without an industry are skipped.
pub fn industry_ranking(records: &[LoanRecord]) -> Vec<IndustryTotal> {
    let mut by_industry: HashMap<&str, (f64, usize)> = HashMap::new();
    for r in records {
        if let Some(industry) = r.industry.as_deref() {
            let entry = by_industry.entry(industry).or_insert((0.0, 0));
            entry.0 += r.working_capital.unwrap_or(0.0);
            entry.1 += 1;
        }
    }

    let mut ranking: Vec<IndustryTotal> = by_industry
        .into_iter()
        .map(|(industry, (total, count))| IndustryTotal {
            industry: industry.to_string(),
            total,
            count,
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then(b.count.cmp(&a.count))
            .then_with(|| a.industry.cmp(&b.industry))
    });
    ranking
}

// ============================================================================
// AGE COHORTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    Under30,
    Thirties,
    Forties,
    Fifties,
    Sixties,
    SeventyPlus,
}

impl AgeBand {
    pub fn from_age(age: i32) -> Self {
        match age {
            a if a < 30 => AgeBand::Under30,
            a if a < 40 => AgeBand::Thirties,
            a if a < 50 => AgeBand::Forties,
            a if a < 60 => AgeBand::Fifties,
            a if a < 70 => AgeBand::Sixties,
            _ => AgeBand::SeventyPlus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::Under30 => "20대",
            AgeBand::Thirties => "30대",
            AgeBand::Forties => "40대",
            AgeBand::Fifties => "50대",
            AgeBand::Sixties => "60대",
            AgeBand::SeventyPlus => "70대 이상",
        }
    }
}

/// Birth year from the first two digits of a resident id.
///
/// yy > pivot → 19yy, otherwise 20yy. The pivot is configuration; it has not
/// been confirmed against the source data.
pub fn birth_year(resident_id: &str, century_pivot: u32) -> Option<i32> {
    let digits: String = resident_id.trim().chars().take(2).collect();
    if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let yy: u32 = digits.parse().ok()?;
    let year = if yy > century_pivot { 1900 + yy } else { 2000 + yy };
    Some(year as i32)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    /// (industry, band) → customers; industry "" when the row has none
    pub by_industry: BTreeMap<String, BTreeMap<AgeBand, usize>>,
    /// band → sum of loan amounts
    pub amount_by_band: BTreeMap<AgeBand, f64>,
    /// age → customers
    pub age_distribution: BTreeMap<i32, usize>,
    pub quality: QualityLog,
}

/// Age cohorts relative to `reference_year` (usually the current year)
pub fn age_cohorts(records: &[LoanRecord], reference_year: i32, century_pivot: u32) -> CohortSummary {
    let mut summary = CohortSummary::default();

    for r in records {
        let Some(resident_id) = r.resident_id.as_deref() else {
            continue;
        };
        let Some(year) = birth_year(resident_id, century_pivot) else {
            summary
                .quality
                .record(r.row, "resident_id", IssueKind::UnparseableResidentId, "first two characters are not digits");
            continue;
        };

        let age = reference_year - year;
        let band = AgeBand::from_age(age);

        *summary
            .by_industry
            .entry(r.industry.clone().unwrap_or_default())
            .or_default()
            .entry(band)
            .or_insert(0) += 1;
        *summary.amount_by_band.entry(band).or_insert(0.0) += r.amount.unwrap_or(0.0);
        *summary.age_distribution.entry(age).or_insert(0) += 1;
    }

    summary
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_records: usize,
    pub banks: Vec<BankTotal>,
    pub quarters: Vec<QuarterPoint>,
    pub industries: Vec<IndustryTotal>,
    pub cohorts: CohortSummary,
}

pub fn dashboard(records: &[LoanRecord], reference_year: i32, century_pivot: u32) -> Dashboard {
    Dashboard {
        total_records: records.len(),
        banks: bank_totals(records),
        quarters: quarterly_trend(records),
        industries: industry_ranking(records),
        cohorts: age_cohorts(records, reference_year, century_pivot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_store;

    #[test]
    fn test_bank_totals_use_working_capital() {
        let store = sample_store();
        let banks = bank_totals(store.records());

        assert_eq!(banks.len(), 3);
        assert_eq!(banks[0].bank, "국민은행");
        assert_eq!(banks[0].total, 1_200_000.0);
        assert_eq!(banks[0].count, 2);
        // Missing working capital counts as 0
        assert_eq!(banks[1].bank, "신한은행");
        assert_eq!(banks[1].total, 0.0);
    }

    #[test]
    fn test_quarterly_trend_fills_gaps() {
        let store = sample_store();
        let trend = quarterly_trend(store.records());

        let labels: Vec<&str> = trend.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["2023Q1", "2023Q2", "2023Q3"]);
        assert_eq!(trend[0].amount, 1_000_000.0);
        assert_eq!(trend[1].count, 1);
        // Unparseable amount counts as 0 but the row still counts
        assert_eq!(trend[2].amount, 0.0);
        assert_eq!(trend[2].count, 1);
    }

    #[test]
    fn test_quarter_rollover() {
        let q = Quarter::of(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(q, Quarter { year: 2023, quarter: 4 });
        assert_eq!(q.next(), Quarter { year: 2024, quarter: 1 });
    }

    #[test]
    fn test_empty_trend() {
        assert!(quarterly_trend(&[]).is_empty());
    }

    #[test]
    fn test_industry_ranking_order() {
        let store = sample_store();
        let ranking = industry_ranking(store.records());

        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].industry, "도소매업");
        assert_eq!(ranking[0].total, 700_000.0);
        assert_eq!(ranking[1].industry, "제조업");
        assert_eq!(ranking[1].count, 2);
    }

    #[test]
    fn test_birth_year_pivot() {
        assert_eq!(birth_year("850101-1234567", 22), Some(1985));
        assert_eq!(birth_year("220101-3", 22), Some(2022));
        assert_eq!(birth_year("230101-1", 22), Some(1923));
        assert_eq!(birth_year("010101-3", 22), Some(2001));
        assert_eq!(birth_year("x1", 22), None);
        assert_eq!(birth_year("5", 22), None);
    }

    #[test]
    fn test_age_bands() {
        assert_eq!(AgeBand::from_age(22), AgeBand::Under30);
        assert_eq!(AgeBand::from_age(30), AgeBand::Thirties);
        assert_eq!(AgeBand::from_age(69), AgeBand::Sixties);
        assert_eq!(AgeBand::from_age(70).label(), "70대 이상");
    }

    #[test]
    fn test_age_cohorts() {
        let store = sample_store();
        let cohorts = age_cohorts(store.records(), 2024, 22);

        // 1985 → 39, 1990 → 34, 2001 → 23; the fourth row has no resident id
        assert_eq!(cohorts.by_industry["제조업"][&AgeBand::Thirties], 2);
        assert_eq!(cohorts.by_industry["도소매업"][&AgeBand::Under30], 1);
        assert_eq!(cohorts.amount_by_band[&AgeBand::Thirties], 3_000_000.0);
        assert_eq!(cohorts.age_distribution[&39], 1);
        assert!(cohorts.quality.is_empty());
    }

    #[test]
    fn test_dashboard_bundles_views() {
        let store = sample_store();
        let d = dashboard(store.records(), 2024, 22);

        assert_eq!(d.total_records, 4);
        assert_eq!(d.banks.len(), 3);
        assert_eq!(d.quarters.len(), 3);
    }
}
