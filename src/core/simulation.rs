//! Whole-share accumulation of periodic contributions.
//!
//! Every asset goes through [`simulate_asset`]: the first row buys as many whole
//! shares as the initial cash allows, and each later row adds the periodic cash
//! to the leftover from the previous row and buys again. Portfolio and single
//! asset runs only differ in how they split the cash across symbols.
use super::contribution::{Frequency, normalize};
use super::error::{Result, SimulationError};
use super::price::{PriceSeries, PriceTable};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Holdings of one asset between two rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AssetState {
    pub shares_held: f64,
    pub leftover_cash: f64,
}

impl AssetState {
    /// Spends the initial lump sum at the first price.
    pub fn open(cash: f64, price: f64) -> Self {
        let (bought, leftover_cash) = buy_whole_shares(cash, price);
        AssetState {
            shares_held: bought,
            leftover_cash,
        }
    }

    /// Adds `cash_in` to the carried leftover and buys at `price`.
    /// Returns the new state and the number of shares bought.
    pub fn step(self, cash_in: f64, price: f64) -> (AssetState, f64) {
        let (bought, leftover_cash) = buy_whole_shares(cash_in + self.leftover_cash, price);
        let next = AssetState {
            shares_held: self.shares_held + bought,
            leftover_cash,
        };
        (next, bought)
    }
}

/// Splits `available` into whole shares at `price` and the cash left over,
/// with `0 <= leftover < price`.
fn buy_whole_shares(available: f64, price: f64) -> (f64, f64) {
    let leftover = available.rem_euclid(price);
    let bought = ((available - leftover) / price).round();
    (bought, leftover)
}

/// One row of an asset's simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetStep {
    pub date: NaiveDate,
    pub price: f64,
    pub bought: f64,
    pub shares_held: f64,
    pub leftover_cash: f64,
    pub holding_value: f64,
}

/// Row-by-row record of one asset, the initial purchase included.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetLedger {
    pub symbol: String,
    pub steps: Vec<AssetStep>,
}

impl AssetLedger {
    pub fn last(&self) -> Option<&AssetStep> {
        self.steps.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Total holding value per row, excluding the initial-investment row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSeries {
    pub points: Vec<ValuePoint>,
}

impl ValueSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValuePoint> {
        self.points.iter()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    fn from_ledger(ledger: &AssetLedger) -> Self {
        ValueSeries {
            points: ledger
                .steps
                .iter()
                .skip(1)
                .map(|s| ValuePoint {
                    date: s.date,
                    value: s.holding_value,
                })
                .collect(),
        }
    }
}

/// Runs one asset with `per_period` cash added on every row after the first.
pub fn simulate_asset(series: &PriceSeries, per_period: f64, initial: f64) -> Result<AssetLedger> {
    let points = series.points();
    let first = points.first().ok_or_else(|| SimulationError::DataUnavailable {
        symbol: series.symbol().to_string(),
    })?;
    if points.len() < 2 {
        return Err(SimulationError::TooFewPeriods {
            symbol: series.symbol().to_string(),
            len: points.len(),
        });
    }

    let mut state = AssetState::open(initial, first.price);
    let mut steps = Vec::with_capacity(points.len());
    steps.push(AssetStep {
        date: first.date,
        price: first.price,
        bought: state.shares_held,
        shares_held: state.shares_held,
        leftover_cash: state.leftover_cash,
        holding_value: state.shares_held * first.price,
    });

    for point in &points[1..] {
        let (next, bought) = state.step(per_period, point.price);
        state = next;
        steps.push(AssetStep {
            date: point.date,
            price: point.price,
            bought,
            shares_held: state.shares_held,
            leftover_cash: state.leftover_cash,
            holding_value: state.shares_held * point.price,
        });
    }

    Ok(AssetLedger {
        symbol: series.symbol().to_string(),
        steps,
    })
}

/// Output of a portfolio run, with the per-symbol ledgers kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRun {
    pub values: ValueSeries,
    pub per_period: f64,
    pub ledgers: BTreeMap<String, AssetLedger>,
}

/// Output of a single-asset run.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleAssetRun {
    pub values: ValueSeries,
    pub per_period: f64,
    pub ledger: AssetLedger,
}

/// Equal-weight portfolio: contribution and initial investment are split evenly
/// across every symbol in `table`.
pub fn run_portfolio(
    table: &PriceTable,
    total_contribution: f64,
    frequency: Frequency,
    initial_investment: f64,
) -> Result<PortfolioRun> {
    let num_symbols = table.num_symbols();
    if num_symbols == 0 {
        return Err(SimulationError::EmptyTable);
    }

    let per_period = normalize(total_contribution, frequency) / num_symbols as f64;
    let per_symbol_initial = initial_investment / num_symbols as f64;
    debug!(
        symbols = num_symbols,
        periods = table.len(),
        per_period,
        per_symbol_initial,
        %frequency,
        "Simulating portfolio"
    );

    let mut ledgers = BTreeMap::new();
    for series in table.series() {
        let ledger = simulate_asset(series, per_period, per_symbol_initial)?;
        ledgers.insert(series.symbol().to_string(), ledger);
    }

    let mut ledgers_iter = ledgers.values();
    let mut values = ledgers_iter
        .next()
        .map(ValueSeries::from_ledger)
        .unwrap_or_default();
    for ledger in ledgers_iter {
        for (point, step) in values.points.iter_mut().zip(ledger.steps.iter().skip(1)) {
            point.value += step.holding_value;
        }
    }

    Ok(PortfolioRun {
        values,
        per_period,
        ledgers,
    })
}

pub fn simulate_portfolio(
    table: &PriceTable,
    total_contribution: f64,
    frequency: Frequency,
    initial_investment: f64,
) -> Result<ValueSeries> {
    run_portfolio(table, total_contribution, frequency, initial_investment).map(|run| run.values)
}

/// A single asset receiving the whole contribution and initial investment.
pub fn run_single_asset(
    series: &PriceSeries,
    total_contribution: f64,
    frequency: Frequency,
    initial_investment: f64,
) -> Result<SingleAssetRun> {
    let per_period = normalize(total_contribution, frequency);
    debug!(
        symbol = series.symbol(),
        periods = series.len(),
        per_period,
        %frequency,
        "Simulating single asset"
    );

    let ledger = simulate_asset(series, per_period, initial_investment)?;
    Ok(SingleAssetRun {
        values: ValueSeries::from_ledger(&ledger),
        per_period,
        ledger,
    })
}

pub fn simulate_single_asset(
    series: &PriceSeries,
    total_contribution: f64,
    frequency: Frequency,
    initial_investment: f64,
) -> Result<ValueSeries> {
    run_single_asset(series, total_contribution, frequency, initial_investment)
        .map(|run| run.values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::PricePoint;

    fn monthly_series(symbol: &str, prices: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: start
                    .checked_add_months(chrono::Months::new(i as u32))
                    .unwrap(),
                price,
            })
            .collect();
        PriceSeries::new(symbol, points).unwrap()
    }

    // Deterministic, bumpy prices between roughly 5 and 400.
    fn wobbly_prices(len: usize, seed: u64) -> Vec<f64> {
        let mut x = seed;
        let mut price = 50.0;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let r = (x >> 33) as f64 / (1u64 << 31) as f64;
                price = (price * (0.85 + 0.3 * r)).clamp(5.0, 400.0);
                (price * 100.0).round() / 100.0
            })
            .collect()
    }

    #[test]
    fn worked_example_single_asset() {
        let series = monthly_series("A", &[10.0, 20.0, 15.0]);
        let run = run_single_asset(&series, 50.0, Frequency::Monthly, 100.0).unwrap();

        let steps = &run.ledger.steps;
        assert_eq!(steps[0].shares_held, 10.0);
        assert_eq!(steps[0].leftover_cash, 0.0);
        assert_eq!(steps[1].bought, 2.0);
        assert_eq!(steps[1].leftover_cash, 10.0);
        assert_eq!(steps[1].shares_held, 12.0);
        assert_eq!(steps[2].bought, 4.0);
        assert_eq!(steps[2].leftover_cash, 0.0);
        assert_eq!(steps[2].shares_held, 16.0);

        let values: Vec<(NaiveDate, f64)> = run.values.iter().map(|p| (p.date, p.value)).collect();
        assert_eq!(
            values,
            vec![(steps[1].date, 240.0), (steps[2].date, 240.0)]
        );
        assert_eq!(run.values.final_value(), Some(240.0));
    }

    #[test]
    fn step_carries_leftover_cash() {
        let state = AssetState::open(25.0, 10.0);
        assert_eq!(
            state,
            AssetState {
                shares_held: 2.0,
                leftover_cash: 5.0
            }
        );

        let (next, bought) = state.step(7.0, 4.0);
        assert_eq!(bought, 3.0);
        assert_eq!(next.shares_held, 5.0);
        assert_eq!(next.leftover_cash, 0.0);
    }

    #[test]
    fn cash_below_price_buys_nothing() {
        let (next, bought) = AssetState::default().step(9.99, 10.0);
        assert_eq!(bought, 0.0);
        assert_eq!(next.shares_held, 0.0);
        assert!((next.leftover_cash - 9.99).abs() < 1e-12);
    }

    #[test]
    fn shares_monotonic_and_cash_conserved() {
        let series = monthly_series("W", &wobbly_prices(240, 7));
        let per_period = 123.45;
        let ledger = simulate_asset(&series, per_period, 1000.0).unwrap();

        for pair in ledger.steps.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            assert!(cur.shares_held >= prev.shares_held);
            assert_eq!(cur.shares_held, cur.shares_held.trunc());
            assert!(cur.leftover_cash >= 0.0);
            assert!(cur.leftover_cash < cur.price);

            let available = per_period + prev.leftover_cash;
            let accounted = cur.bought * cur.price + cur.leftover_cash;
            assert!(
                (available - accounted).abs() < 1e-6,
                "cash leaked on {}: {available} vs {accounted}",
                cur.date
            );
        }
    }

    #[test]
    fn portfolio_with_one_symbol_matches_single_asset() {
        let series = monthly_series("SPY", &wobbly_prices(60, 42));
        let table = PriceTable::new(vec![series.clone()]).unwrap();

        for frequency in Frequency::ALL {
            let portfolio = simulate_portfolio(&table, 800.0, frequency, 1000.0).unwrap();
            let single = simulate_single_asset(&series, 800.0, frequency, 1000.0).unwrap();
            assert_eq!(portfolio, single);
        }
    }

    #[test]
    fn portfolio_splits_cash_evenly_and_sums_holdings() {
        let a = monthly_series("A", &[10.0, 10.0, 20.0]);
        let b = monthly_series("B", &[5.0, 25.0, 50.0]);
        let table = PriceTable::new(vec![a, b]).unwrap();

        let run = run_portfolio(&table, 100.0, Frequency::Monthly, 60.0).unwrap();
        assert_eq!(run.per_period, 50.0);

        // A: 30/10 -> 3; 50/10 -> 5 more; 50/20 -> 2 more, 10 left over
        let a = &run.ledgers["A"].steps;
        assert_eq!(
            a.iter().map(|s| s.shares_held).collect::<Vec<_>>(),
            vec![3.0, 8.0, 10.0]
        );
        // B: 30/5 -> 6; 50/25 -> 2 more; 50/50 -> 1 more
        let b = &run.ledgers["B"].steps;
        assert_eq!(
            b.iter().map(|s| s.shares_held).collect::<Vec<_>>(),
            vec![6.0, 8.0, 9.0]
        );

        let values: Vec<f64> = run.values.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![8.0 * 10.0 + 8.0 * 25.0, 10.0 * 20.0 + 9.0 * 50.0]);
    }

    #[test]
    fn output_excludes_initial_row() {
        let series = monthly_series("A", &wobbly_prices(12, 3));
        let values = simulate_single_asset(&series, 100.0, Frequency::Weekly, 0.0).unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(values.points[0].date, series.points()[1].date);
    }

    #[test]
    fn rejects_empty_and_single_row_series() {
        let empty = PriceSeries::new("A", vec![]).unwrap();
        assert_eq!(
            simulate_single_asset(&empty, 100.0, Frequency::Monthly, 100.0),
            Err(SimulationError::DataUnavailable {
                symbol: "A".to_string()
            })
        );

        let one = monthly_series("A", &[10.0]);
        assert_eq!(
            simulate_single_asset(&one, 100.0, Frequency::Monthly, 100.0),
            Err(SimulationError::TooFewPeriods {
                symbol: "A".to_string(),
                len: 1
            })
        );

        let table = PriceTable::new(vec![one]).unwrap();
        assert!(matches!(
            simulate_portfolio(&table, 100.0, Frequency::Monthly, 100.0),
            Err(SimulationError::TooFewPeriods { .. })
        ));
    }

    #[test]
    fn zero_cash_holds_nothing() {
        let series = monthly_series("A", &[10.0, 11.0, 12.0]);
        let values = simulate_single_asset(&series, 0.0, Frequency::Daily, 0.0).unwrap();
        assert!(values.iter().all(|p| p.value == 0.0));
    }
}
