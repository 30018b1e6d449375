use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use dcasim::cli::simulate::OutputOptions;
use dcasim::core::config::SimulationOverrides;
use dcasim::core::log::init_logging;
use dcasim::core::{Frequency, Interval};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log more detail; repeat for trace output (-vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Compare a stock portfolio against an index fund
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// Ticker symbols of the portfolio, separated by commas
    #[arg(short, long, value_delimiter = ',')]
    tickers: Option<Vec<String>>,

    /// Index fund ticker to compare against (e.g. SPY, QQQ)
    #[arg(short, long)]
    index: Option<String>,

    /// First date of the price history (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last date of the price history (YYYY-MM-DD), defaults to today
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Initial lump sum
    #[arg(long)]
    initial: Option<f64>,

    /// Recurring contribution amount
    #[arg(long)]
    contribution: Option<f64>,

    /// Contribution frequency: Daily, Weekly, Monthly or Annually
    #[arg(short, long)]
    frequency: Option<Frequency>,

    /// Price data interval: 1d, 1wk or 1mo
    #[arg(long)]
    interval: Option<Interval>,

    /// Maximum rows in the value over time table
    #[arg(long, default_value_t = 12)]
    rows: usize,

    /// Export the portfolio value series to a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Include the index value series in the CSV export
    #[arg(long, requires = "csv")]
    with_index: bool,
}

impl From<SimulateArgs> for dcasim::AppCommand {
    fn from(args: SimulateArgs) -> dcasim::AppCommand {
        dcasim::AppCommand::Simulate {
            overrides: SimulationOverrides {
                tickers: args.tickers,
                index_ticker: args.index,
                start_date: args.start,
                end_date: args.end,
                initial_investment: args.initial,
                contribution: args.contribution,
                frequency: args.frequency,
                interval: args.interval,
            },
            output: OutputOptions {
                max_rows: args.rows,
                csv_path: args.csv,
                csv_with_index: args.with_index,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => dcasim::cli::setup::setup(),
        Some(Commands::Simulate(args)) => {
            dcasim::run_command(args.into(), cli.config_path.as_deref()).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
