//! Summary figures derived from simulation runs.
use crate::core::price::PriceSeries;
use crate::core::simulation::{AssetLedger, ValueSeries};
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use std::collections::BTreeMap;
use tracing::debug;

/// End-of-run figures for one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySummary {
    pub label: String,
    pub final_value: f64,
    pub total_contributed: f64,
    pub uninvested_cash: f64,
    pub gain: f64,
    pub gain_pct: Option<f64>,
}

impl StrategySummary {
    /// `per_period_total` is the cash added on each row across all assets.
    pub fn new(
        label: &str,
        values: &ValueSeries,
        ledgers: &[&AssetLedger],
        initial_investment: f64,
        per_period_total: f64,
    ) -> Self {
        let final_value = values.final_value().unwrap_or(0.0);
        let total_contributed = initial_investment + per_period_total * values.len() as f64;
        let uninvested_cash = ledgers
            .iter()
            .filter_map(|l| l.last())
            .map(|s| s.leftover_cash)
            .sum();
        let gain = final_value + uninvested_cash - total_contributed;
        let gain_pct = (total_contributed > 0.0).then(|| gain * 100.0 / total_contributed);

        StrategySummary {
            label: label.to_string(),
            final_value,
            total_contributed,
            uninvested_cash,
            gain,
            gain_pct,
        }
    }
}

/// Final position in a single asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBreakdown {
    pub symbol: String,
    pub shares_held: f64,
    pub final_price: f64,
    pub holding_value: f64,
    pub leftover_cash: f64,
    pub price_cagr: Option<f64>,
}

impl AssetBreakdown {
    pub fn new(ledger: &AssetLedger, series: &PriceSeries) -> Option<Self> {
        let last = ledger.last()?;
        let price_cagr = match price_cagr(series) {
            Ok(rate) => rate,
            Err(e) => {
                debug!(symbol = %ledger.symbol, error = %e, "Skipping price CAGR");
                None
            }
        };
        Some(AssetBreakdown {
            symbol: ledger.symbol.clone(),
            shares_held: last.shares_held,
            final_price: last.price,
            holding_value: last.holding_value,
            leftover_cash: last.leftover_cash,
            price_cagr,
        })
    }
}

/// Annualised growth of the price between the first and last observation, in
/// percent. `None` when the series spans less than a day.
pub fn price_cagr(series: &PriceSeries) -> Result<Option<f64>> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Ok(None);
    };
    let days = (last.date - first.date).num_days();
    if days <= 0 {
        return Ok(None);
    }
    let duration_years = days as f64 / 365.0;

    let begin_bal =
        Decimal::from_f64(first.price).ok_or_else(|| anyhow!("Invalid starting price"))?;
    let end_bal = Decimal::from_f64(last.price).ok_or_else(|| anyhow!("Invalid final price"))?;
    let n_years = Decimal::from_f64(duration_years).ok_or_else(|| anyhow!("Invalid duration"))?;

    let rate = cagr(begin_bal, end_bal, n_years);
    let percentage = (rate * Decimal::from(100))
        .to_f64()
        .ok_or_else(|| anyhow!("CAGR percentage conversion failed"))?;
    debug!("cagr: {begin_bal}, {end_bal}, {n_years} = {rate}, {percentage}");
    Ok(Some(percentage))
}

/// A row of the value-over-time comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonRow {
    pub date: NaiveDate,
    pub portfolio: f64,
    pub index: f64,
}

/// Pairs the two series on the dates both of them have.
pub fn join_by_date(portfolio: &ValueSeries, index: &ValueSeries) -> Vec<ComparisonRow> {
    let index_by_date: BTreeMap<NaiveDate, f64> = index.iter().map(|p| (p.date, p.value)).collect();
    portfolio
        .iter()
        .filter_map(|p| {
            index_by_date.get(&p.date).map(|&i| ComparisonRow {
                date: p.date,
                portfolio: p.value,
                index: i,
            })
        })
        .collect()
}

/// Keeps at most `max_rows` evenly spaced rows, always including the last one.
pub fn sample_rows(rows: &[ComparisonRow], max_rows: usize) -> Vec<ComparisonRow> {
    if max_rows == 0 || rows.is_empty() {
        return Vec::new();
    }
    if rows.len() <= max_rows {
        return rows.to_vec();
    }
    if max_rows == 1 {
        return rows[rows.len() - 1..].to_vec();
    }

    let last = rows.len() - 1;
    (0..max_rows)
        .map(|k| rows[k * last / (max_rows - 1)])
        .collect()
}
