use crate::core::contribution::Frequency;
use crate::core::price::{HistoryRequest, Interval};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub tickers: Vec<String>,
    pub index_ticker: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub initial_investment: f64,
    pub contribution: f64,
    pub frequency: Frequency,
    pub interval: Interval,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tickers: ["AAPL", "MSFT", "GOOGL", "AMZN"]
                .into_iter()
                .map(String::from)
                .collect(),
            index_ticker: "SPY".to_string(),
            start_date: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            initial_investment: 1000.0,
            contribution: 800.0,
            frequency: Frequency::Monthly,
            interval: Interval::Monthly,
        }
    }
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct SimulationOverrides {
    pub tickers: Option<Vec<String>>,
    pub index_ticker: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_investment: Option<f64>,
    pub contribution: Option<f64>,
    pub frequency: Option<Frequency>,
    pub interval: Option<Interval>,
}

impl SimulationConfig {
    pub fn apply(&mut self, overrides: SimulationOverrides) {
        if let Some(tickers) = overrides.tickers {
            self.tickers = tickers;
        }
        if let Some(index_ticker) = overrides.index_ticker {
            self.index_ticker = index_ticker;
        }
        if let Some(start) = overrides.start_date {
            self.start_date = start;
        }
        if overrides.end_date.is_some() {
            self.end_date = overrides.end_date;
        }
        if let Some(initial) = overrides.initial_investment {
            self.initial_investment = initial;
        }
        if let Some(contribution) = overrides.contribution {
            self.contribution = contribution;
        }
        if let Some(frequency) = overrides.frequency {
            self.frequency = frequency;
        }
        if let Some(interval) = overrides.interval {
            self.interval = interval;
        }
    }

    /// Trims, upper-cases and de-duplicates the ticker symbols.
    pub fn normalize_symbols(&mut self) {
        let mut seen = Vec::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            let ticker = ticker.trim().to_uppercase();
            if !ticker.is_empty() && !seen.contains(&ticker) {
                seen.push(ticker);
            }
        }
        self.tickers = seen;
        self.index_ticker = self.index_ticker.trim().to_uppercase();
    }

    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.tickers.is_empty() {
            bail!("At least one ticker symbol is required");
        }
        if self.index_ticker.is_empty() {
            bail!("An index ticker symbol is required");
        }
        if !self.initial_investment.is_finite() || self.initial_investment < 0.0 {
            bail!(
                "Initial investment must be zero or positive, got {}",
                self.initial_investment
            );
        }
        if !self.contribution.is_finite() || self.contribution < 0.0 {
            bail!(
                "Contribution must be zero or positive, got {}",
                self.contribution
            );
        }
        let end = self.end_date(today);
        if self.start_date >= end {
            bail!(
                "Start date {} must be before end date {}",
                self.start_date,
                end
            );
        }
        Ok(())
    }

    /// Configured end date, or `today` when none is set.
    pub fn end_date(&self, today: NaiveDate) -> NaiveDate {
        self.end_date.unwrap_or(today)
    }

    pub fn history_request(&self, today: NaiveDate) -> HistoryRequest {
        HistoryRequest {
            start: self.start_date,
            end: self.end_date(today),
            interval: self.interval,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            simulation: SimulationConfig::default(),
            providers: ProvidersConfig::default(),
            currency: default_currency(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or the built-in defaults
    /// when no config file exists yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "dcasim", "dcasim")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url)
    }
}
