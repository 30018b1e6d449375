//! Errors raised by the simulation core

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("No price series supplied")]
    EmptyTable,

    #[error("No price data available for symbol: {symbol}")]
    DataUnavailable { symbol: String },

    #[error("Symbol {symbol} has {len} price point(s), at least 2 are required")]
    TooFewPeriods { symbol: String, len: usize },

    #[error("Price series for {symbol} is not aligned with {reference}: {reason}")]
    MisalignedSeries {
        symbol: String,
        reference: String,
        reason: String,
    },

    #[error("Duplicate price series for symbol: {symbol}")]
    DuplicateSymbol { symbol: String },

    #[error("Invalid price {price} for {symbol} on {date}")]
    InvalidPrice {
        symbol: String,
        date: NaiveDate,
        price: f64,
    },

    #[error("Dates for {symbol} are not strictly increasing at {date}")]
    UnorderedDates { symbol: String, date: NaiveDate },
}

pub type Result<T> = std::result::Result<T, SimulationError>;
