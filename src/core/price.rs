//! Price history abstractions and core types

use super::error::{Result as SimResult, SimulationError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

/// Sampling interval of a price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[serde(alias = "1d")]
    Daily,
    #[serde(alias = "1wk")]
    Weekly,
    #[default]
    #[serde(alias = "1mo")]
    Monthly,
}

impl Interval {
    /// Interval code understood by the Yahoo chart API.
    pub fn as_yahoo_code(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Interval::Daily => "daily",
                Interval::Weekly => "weekly",
                Interval::Monthly => "monthly",
            }
        )
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" | "daily" => Ok(Interval::Daily),
            "1wk" | "weekly" => Ok(Interval::Weekly),
            "1mo" | "monthly" => Ok(Interval::Monthly),
            _ => Err(anyhow::anyhow!("Invalid interval: {}", s)),
        }
    }
}

/// A closing price observed on a date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Closing prices of one symbol, strictly increasing in date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> SimResult<Self> {
        let symbol = symbol.into();
        for (i, point) in points.iter().enumerate() {
            if !point.price.is_finite() || point.price <= 0.0 {
                return Err(SimulationError::InvalidPrice {
                    symbol,
                    date: point.date,
                    price: point.price,
                });
            }
            if i > 0 && points[i - 1].date >= point.date {
                return Err(SimulationError::UnorderedDates {
                    symbol,
                    date: point.date,
                });
            }
        }
        Ok(Self { symbol, points })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    fn retain_dates(mut self, dates: &BTreeSet<NaiveDate>) -> Self {
        self.points.retain(|p| dates.contains(&p.date));
        self
    }
}

/// Price series for several symbols sharing one date index.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    series: BTreeMap<String, PriceSeries>,
}

impl PriceTable {
    /// Builds a table, rejecting any series whose dates differ from the others.
    pub fn new(series: Vec<PriceSeries>) -> SimResult<Self> {
        let mut table = BTreeMap::new();
        for s in series {
            if s.is_empty() {
                return Err(SimulationError::DataUnavailable {
                    symbol: s.symbol.clone(),
                });
            }
            if table.contains_key(&s.symbol) {
                return Err(SimulationError::DuplicateSymbol { symbol: s.symbol });
            }
            table.insert(s.symbol.clone(), s);
        }

        let mut iter = table.values();
        let reference = iter.next().ok_or(SimulationError::EmptyTable)?;
        for other in iter {
            check_alignment(reference, other)?;
        }

        Ok(Self { series: table })
    }

    /// Builds a table from the dates every series has in common.
    pub fn intersecting(series: Vec<PriceSeries>) -> SimResult<Self> {
        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for s in &series {
            let dates: BTreeSet<NaiveDate> = s.dates().collect();
            common = Some(match common {
                Some(acc) => acc.intersection(&dates).copied().collect(),
                None => dates,
            });
        }
        let common = common.ok_or(SimulationError::EmptyTable)?;

        let trimmed = series
            .into_iter()
            .map(|s| {
                let before = s.len();
                let s = s.retain_dates(&common);
                if s.len() != before {
                    warn!(
                        symbol = %s.symbol,
                        dropped = before - s.len(),
                        "Dropped dates not shared by all symbols"
                    );
                }
                s
            })
            .collect();
        Self::new(trimmed)
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceSeries> {
        self.series.get(symbol)
    }

    pub fn series(&self) -> impl Iterator<Item = &PriceSeries> {
        self.series.values()
    }

    pub fn num_symbols(&self) -> usize {
        self.series.len()
    }

    /// Number of rows in the shared date index.
    pub fn len(&self) -> usize {
        self.series.values().next().map_or(0, PriceSeries::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_alignment(reference: &PriceSeries, other: &PriceSeries) -> SimResult<()> {
    let misaligned = |reason: String| SimulationError::MisalignedSeries {
        symbol: other.symbol.clone(),
        reference: reference.symbol.clone(),
        reason,
    };

    if reference.len() != other.len() {
        return Err(misaligned(format!(
            "{} rows vs {} rows",
            other.len(),
            reference.len()
        )));
    }
    if let Some((a, b)) = reference
        .dates()
        .zip(other.dates())
        .find(|(a, b)| a != b)
    {
        return Err(misaligned(format!("{b} where {a} was expected")));
    }
    Ok(())
}

/// Date range and sampling interval for a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch_history(&self, symbol: &str, request: &HistoryRequest) -> Result<PriceSeries>;
}
