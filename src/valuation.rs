//! Per-stake and portfolio-wide figures, recomputed from scratch on every call.

use crate::prices::PriceMap;
use crate::stake::StakeRecord;
use std::collections::HashMap;

/// Figures derived for one stake, in the same order as the input records.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StakeValuation {
    pub current_price: f64,
    pub current_value: f64,
    pub estimated_annual_earnings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub count: usize,
    pub total_value: f64,
    pub total_fees: f64,
    /// May be negative when fees exceed the current value.
    pub net_value: f64,
    pub average_yield: f64,
    pub total_estimated_annual_earnings: f64,
    /// Stakes whose fee is in another currency and was left out of `total_fees`.
    pub foreign_fee_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Valuation {
    pub rows: Vec<StakeValuation>,
    pub summary: Summary,
}

/// Values every record against `prices`. A missing price counts as 0.
pub fn valuate(records: &[StakeRecord], prices: &PriceMap, fee_currency: &str) -> Valuation {
    let mut rows = Vec::with_capacity(records.len());
    let mut summary = Summary {
        count: records.len(),
        ..Summary::default()
    };
    let mut yield_sum = 0.0;

    for record in records {
        let current_price = prices.get(&record.price_key()).copied().unwrap_or(0.0);
        let current_value = record.staked_quantity * current_price;
        let estimated_annual_earnings = current_value * (record.yield_rate / 100.0);

        summary.total_value += current_value;
        summary.total_estimated_annual_earnings += estimated_annual_earnings;
        yield_sum += record.yield_rate;

        if record.fee_currency.is_empty() || record.fee_currency.eq_ignore_ascii_case(fee_currency)
        {
            summary.total_fees += record.fee_paid;
        } else {
            log::warn!(
                "Fee of {} {} on {} is not in {}; left out of total fees",
                record.fee_paid,
                record.fee_currency,
                record.platform,
                fee_currency
            );
            summary.foreign_fee_count += 1;
        }

        rows.push(StakeValuation {
            current_price,
            current_value,
            estimated_annual_earnings,
        });
    }

    summary.net_value = summary.total_value - summary.total_fees;
    summary.average_yield = if summary.count > 0 {
        yield_sum / summary.count as f64
    } else {
        0.0
    };

    Valuation { rows, summary }
}

/// Share of the total value held on each platform, in percent, largest first.
pub fn allocation(records: &[StakeRecord], valuation: &Valuation) -> Vec<(String, f64)> {
    let total_value = valuation.summary.total_value;
    if total_value <= 0.0 {
        return Vec::new();
    }

    let mut by_platform: HashMap<&str, f64> = HashMap::new();
    for (record, row) in records.iter().zip(&valuation.rows) {
        *by_platform.entry(record.platform.as_str()).or_insert(0.0) +=
            row.current_value / total_value * 100.0;
    }

    let mut allocation: Vec<(String, f64)> = by_platform
        .into_iter()
        .map(|(platform, percentage)| (platform.to_string(), percentage))
        .collect();
    allocation.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    allocation
}
