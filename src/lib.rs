pub mod cli;
pub mod core;
pub mod providers;

use crate::cli::simulate::OutputOptions;
use crate::core::PriceSeries;
use crate::core::cache::Cache;
use crate::core::config::{AppConfig, SimulationOverrides};
use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Simulate {
        overrides: SimulationOverrides,
        output: OutputOptions,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Portfolio vs index simulator starting...");

    let mut config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    match command {
        AppCommand::Simulate { overrides, output } => {
            let today = Local::now().date_naive();
            config.simulation.apply(overrides);
            config.simulation.normalize_symbols();
            config.simulation.validate(today)?;
            debug!("Effective config: {config:#?}");

            let history_cache = Arc::new(Cache::<String, PriceSeries>::new());
            let provider = providers::YahooHistoryProvider::new(
                config.yahoo_base_url(),
                Arc::clone(&history_cache),
            );

            cli::simulate::run(
                &config.simulation,
                &config.currency,
                &provider,
                today,
                &output,
            )
            .await
        }
    }
}
