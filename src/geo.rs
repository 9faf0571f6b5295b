// 🌏 Geo Aggregator - loan totals per district for the map
//
// Pure function of (records, resolver, index). Rows that do not resolve to a
// district, or resolve to one the index has no coordinate for, are left out
// of the map only; they are counted so the operator can see the coverage.

use crate::address::{AddressResolver, Resolution};
use crate::boundary::{BoundaryIndex, Coordinate};
use crate::quality::{IssueKind, QualityLog};
use crate::record::LoanRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictMetric {
    pub district_name: String,
    pub coordinate: Coordinate,
    pub total_amount: f64,
    /// (total - min) / (max - min) over the current result set, in [0, 1]
    pub normalized_value: f64,
    pub record_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoAggregation {
    /// First-encounter order
    pub metrics: Vec<DistrictMetric>,
    pub unmatched: usize,
    pub missing_coordinate: usize,
    pub quality: QualityLog,
}

impl GeoAggregation {
    pub fn mapped_records(&self) -> usize {
        self.metrics.iter().map(|m| m.record_count).sum()
    }
}

pub fn aggregate(records: &[LoanRecord], resolver: &AddressResolver, index: &BoundaryIndex) -> GeoAggregation {
    let mut result = GeoAggregation::default();
    let mut position: HashMap<String, usize> = HashMap::new();

    for record in records {
        let district = match resolver.resolve_opt(record.address.as_deref()) {
            Resolution::District(name) => name,
            Resolution::Unmatched(reason) => {
                result.unmatched += 1;
                result.quality.record(
                    record.row,
                    "address",
                    IssueKind::UnmatchedAddress,
                    format!("{:?}: {}", reason, record.address.as_deref().unwrap_or("")),
                );
                continue;
            }
        };

        let coordinate = match index.lookup(&district) {
            Some(c) => c,
            None => {
                result.missing_coordinate += 1;
                result
                    .quality
                    .record(record.row, "address", IssueKind::MissingCoordinate, district);
                continue;
            }
        };

        let amount = match record.amount {
            Some(a) => a,
            None => {
                result
                    .quality
                    .record(record.row, "amount", IssueKind::MissingAmount, "counted as 0");
                0.0
            }
        };

        let slot = *position.entry(district.clone()).or_insert_with(|| {
            result.metrics.push(DistrictMetric {
                district_name: district,
                coordinate,
                total_amount: 0.0,
                normalized_value: 0.0,
                record_count: 0,
            });
            result.metrics.len() - 1
        });

        let metric = &mut result.metrics[slot];
        metric.total_amount += amount;
        metric.record_count += 1;
    }

    normalize(&mut result.metrics);

    tracing::debug!(
        districts = result.metrics.len(),
        unmatched = result.unmatched,
        missing_coordinate = result.missing_coordinate,
        "district aggregation done"
    );
    result
}

/// Min-max rescale of `total_amount` into `normalized_value`.
///
/// When every total is equal (including a single district) all values are 0.
pub fn normalize(metrics: &mut [DistrictMetric]) {
    let Some(first) = metrics.first() else {
        return;
    };

    let (min, max) = metrics
        .iter()
        .fold((first.total_amount, first.total_amount), |(lo, hi), m| {
            (lo.min(m.total_amount), hi.max(m.total_amount))
        });
    let range = max - min;

    for m in metrics.iter_mut() {
        m.normalized_value = if range > 0.0 {
            (m.total_amount - min) / range
        } else {
            0.0
        };
    }
}
