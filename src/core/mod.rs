//! Core simulation logic and abstractions

pub mod analytics;
pub mod cache;
pub mod config;
pub mod contribution;
pub mod error;
pub mod export;
pub mod log;
pub mod price;
pub mod simulation;

// Re-export main types for cleaner imports
pub use contribution::{Frequency, normalize};
pub use error::SimulationError;
pub use price::{HistoryProvider, HistoryRequest, Interval, PricePoint, PriceSeries, PriceTable};
pub use simulation::{ValueSeries, simulate_portfolio, simulate_single_asset};
