use super::ui;
use crate::core::analytics::{self, AssetBreakdown, ComparisonRow, StrategySummary};
use crate::core::config::SimulationConfig;
use crate::core::export;
use crate::core::simulation::{self, PortfolioRun, SingleAssetRun};
use crate::core::{HistoryProvider, PriceSeries, PriceTable};
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, CellAlignment};
use futures::future::join_all;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How results are presented once both simulations have run.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Rows of the value-over-time table; 0 hides it.
    pub max_rows: usize,
    pub csv_path: Option<PathBuf>,
    /// Export both strategies instead of the portfolio alone.
    pub csv_with_index: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            max_rows: 12,
            csv_path: None,
            csv_with_index: false,
        }
    }
}

/// Everything produced by one portfolio-vs-index comparison.
pub struct Comparison {
    pub index_ticker: String,
    pub table: PriceTable,
    pub index_series: PriceSeries,
    pub portfolio: PortfolioRun,
    pub index: SingleAssetRun,
    pub summaries: [StrategySummary; 2],
    pub holdings: Vec<AssetBreakdown>,
    pub index_holding: Option<AssetBreakdown>,
    pub rows: Vec<ComparisonRow>,
    /// Symbols that lost rows when the histories were aligned.
    pub trimmed: Vec<TrimmedRows>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedRows {
    pub symbol: String,
    pub dropped: usize,
}

pub async fn run(
    config: &SimulationConfig,
    currency: &str,
    provider: &(dyn HistoryProvider + Send + Sync),
    today: NaiveDate,
    output: &OutputOptions,
) -> Result<()> {
    let comparison = compare(config, provider, today).await?;
    display(&comparison, currency, output.max_rows);

    if let Some(path) = &output.csv_path {
        export_csv(&comparison, path, output.csv_with_index)?;
        println!(
            "\n{} {}",
            ui::style_text("Saved portfolio data to", ui::StyleType::Subtle),
            path.display()
        );
    }
    Ok(())
}

/// Fetches prices for every symbol and runs both strategies over them.
pub async fn compare(
    config: &SimulationConfig,
    provider: &(dyn HistoryProvider + Send + Sync),
    today: NaiveDate,
) -> Result<Comparison> {
    let request = config.history_request(today);
    info!(
        tickers = ?config.tickers,
        index = %config.index_ticker,
        start = %request.start,
        end = %request.end,
        interval = %request.interval,
        "Fetching price history"
    );

    let mut symbols: Vec<&str> = config.tickers.iter().map(String::as_str).collect();
    if !symbols.contains(&config.index_ticker.as_str()) {
        symbols.push(config.index_ticker.as_str());
    }

    let pb = ui::new_progress_bar(symbols.len() as u64);
    pb.set_message("Fetching prices");
    let futures = symbols.iter().map(|&symbol| {
        let pb_clone = pb.clone();
        async move {
            let result = provider.fetch_history(symbol, &request).await;
            pb_clone.inc(1);
            (symbol.to_string(), result)
        }
    });
    let fetched: HashMap<String, Result<PriceSeries>> =
        join_all(futures).await.into_iter().collect();
    pb.finish_and_clear();

    let mut failed: Vec<String> = fetched
        .iter()
        .filter_map(|(symbol, result)| {
            result.as_ref().err().map(|e| {
                warn!(symbol = %symbol, error = %e, "Price history unavailable");
                symbol.clone()
            })
        })
        .collect();
    if !failed.is_empty() {
        failed.sort();
        bail!(
            "Error fetching data for {}. Please check your input tickers and try again.",
            failed.join(", ")
        );
    }

    let all_series = fetched
        .into_values()
        .collect::<Result<Vec<PriceSeries>>>()?;
    let fetched_rows: Vec<(String, usize)> = symbols
        .iter()
        .filter_map(|&symbol| {
            all_series
                .iter()
                .find(|s| s.symbol() == symbol)
                .map(|s| (symbol.to_string(), s.len()))
        })
        .collect();

    // Portfolio and index share one date index
    let aligned =
        PriceTable::intersecting(all_series).context("Failed to align price histories")?;
    let trimmed: Vec<TrimmedRows> = fetched_rows
        .into_iter()
        .filter(|(_, rows)| *rows > aligned.len())
        .map(|(symbol, rows)| TrimmedRows {
            symbol,
            dropped: rows - aligned.len(),
        })
        .collect();

    let take = |symbol: &str| -> Result<PriceSeries> {
        aligned
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("No price data found for symbol: {}", symbol))
    };
    let index_series = take(config.index_ticker.as_str())?;
    let stock_series = config
        .tickers
        .iter()
        .map(|t| take(t.as_str()))
        .collect::<Result<Vec<_>>>()?;
    let table = PriceTable::new(stock_series).context("Failed to build portfolio price table")?;
    debug!(rows = table.len(), symbols = table.num_symbols(), "Aligned price table");

    let portfolio = simulation::run_portfolio(
        &table,
        config.contribution,
        config.frequency,
        config.initial_investment,
    )
    .context("Portfolio simulation failed")?;
    let index = simulation::run_single_asset(
        &index_series,
        config.contribution,
        config.frequency,
        config.initial_investment,
    )
    .context("Index simulation failed")?;

    let portfolio_ledgers: Vec<_> = portfolio.ledgers.values().collect();
    let summaries = [
        StrategySummary::new(
            "Portfolio (Selected Stocks)",
            &portfolio.values,
            &portfolio_ledgers,
            config.initial_investment,
            portfolio.per_period * table.num_symbols() as f64,
        ),
        StrategySummary::new(
            &format!("{} Index Fund", config.index_ticker),
            &index.values,
            &[&index.ledger],
            config.initial_investment,
            index.per_period,
        ),
    ];

    let holdings: Vec<AssetBreakdown> = portfolio
        .ledgers
        .values()
        .filter_map(|ledger| {
            table
                .get(&ledger.symbol)
                .and_then(|series| AssetBreakdown::new(ledger, series))
        })
        .collect();
    let index_holding = AssetBreakdown::new(&index.ledger, &index_series);

    let rows = analytics::join_by_date(&portfolio.values, &index.values);
    info!(
        portfolio = ?summaries[0].final_value,
        index = ?summaries[1].final_value,
        "Simulation complete"
    );

    Ok(Comparison {
        index_ticker: config.index_ticker.clone(),
        table,
        index_series,
        portfolio,
        index,
        summaries,
        holdings,
        index_holding,
        rows,
        trimmed,
    })
}

/// Tells the user when the simulated window is shorter than what was fetched.
fn alignment_note(comparison: &Comparison) -> Option<String> {
    if comparison.trimmed.is_empty() {
        return None;
    }
    let start = comparison.index_series.first()?.date;
    let dropped: Vec<String> = comparison
        .trimmed
        .iter()
        .map(|t| format!("{} ({})", t.symbol, t.dropped))
        .collect();
    Some(format!(
        "Simulating from {start}, the first date shared by every symbol. Rows dropped: {}",
        dropped.join(", ")
    ))
}

fn display(comparison: &Comparison, currency: &str, max_rows: usize) {
    let title = format!(
        "Performance of Portfolio vs {} Index Fund",
        comparison.index_ticker
    );
    println!("\n{}", ui::style_text(&title, ui::StyleType::Title));

    if let (Some(first), Some(last)) = (
        comparison.index_series.first(),
        comparison.index_series.last(),
    ) {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "{} to {}, {} periods",
                    first.date,
                    last.date,
                    comparison.table.len()
                ),
                ui::StyleType::Subtle
            )
        );
    }
    if let Some(note) = alignment_note(comparison) {
        println!("{}", ui::style_text(&note, ui::StyleType::Error));
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Strategy"),
        ui::header_cell(&format!("Final Value ({currency})")),
        ui::header_cell("Contributed"),
        ui::header_cell("Uninvested Cash"),
        ui::header_cell("Gain"),
        ui::header_cell("Return (%)"),
    ]);
    for summary in &comparison.summaries {
        table.add_row(vec![
            Cell::new(&summary.label),
            ui::money_cell(summary.final_value, currency),
            ui::money_cell(summary.total_contributed, currency),
            ui::money_cell(summary.uninvested_cash, currency),
            ui::money_cell(summary.gain, currency),
            match summary.gain_pct {
                Some(pct) => ui::change_cell(pct),
                None => ui::na_cell(),
            },
        ]);
    }
    println!("{table}");

    println!(
        "\n{}",
        ui::style_text("Final Portfolio Values", ui::StyleType::TotalLabel)
    );
    for summary in &comparison.summaries {
        println!(
            "Final Value of {}: {}",
            summary.label,
            ui::style_text(
                &ui::format_currency(summary.final_value, currency),
                ui::StyleType::TotalValue
            )
        );
    }
    let [portfolio, index] = &comparison.summaries;
    let difference = portfolio.final_value - index.final_value;
    let verdict = if difference >= 0.0 {
        format!(
            "Portfolio ahead by {}",
            ui::format_currency(difference, currency)
        )
    } else {
        format!(
            "{} ahead by {}",
            comparison.index_ticker,
            ui::format_currency(-difference, currency)
        )
    };
    println!("{}", ui::style_text(&verdict, ui::StyleType::TotalLabel));

    ui::print_separator();
    println!("{}", ui::style_text("Holdings", ui::StyleType::Title));
    let mut holdings = ui::new_styled_table();
    holdings.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Shares"),
        ui::header_cell("Last Price"),
        ui::header_cell("Holding Value"),
        ui::header_cell("Leftover Cash"),
        ui::header_cell("Price CAGR"),
    ]);
    let index_row = comparison.index_holding.iter().map(|h| (h, true));
    for (holding, is_index) in comparison.holdings.iter().map(|h| (h, false)).chain(index_row) {
        let name = if is_index {
            Cell::new(format!("{} (index)", holding.symbol)).add_attribute(Attribute::Italic)
        } else {
            Cell::new(&holding.symbol)
        };
        holdings.add_row(vec![
            name,
            Cell::new(format!("{:.0}", holding.shares_held)).set_alignment(CellAlignment::Right),
            ui::money_cell(holding.final_price, currency),
            ui::money_cell(holding.holding_value, currency),
            ui::money_cell(holding.leftover_cash, currency),
            ui::format_optional_cell(holding.price_cagr, |c| format!("{c:.2}%")),
        ]);
    }
    println!("{holdings}");

    let sampled = analytics::sample_rows(&comparison.rows, max_rows);
    if sampled.is_empty() {
        return;
    }
    ui::print_separator();
    println!("{}", ui::style_text("Value Over Time", ui::StyleType::Title));
    let mut over_time = ui::new_styled_table();
    over_time.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Portfolio"),
        ui::header_cell(&comparison.index_ticker),
    ]);
    for row in sampled {
        over_time.add_row(vec![
            Cell::new(row.date),
            ui::money_cell(row.portfolio, currency),
            ui::money_cell(row.index, currency),
        ]);
    }
    println!("{over_time}");
}

fn export_csv(comparison: &Comparison, path: &Path, with_index: bool) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    let writer = BufWriter::new(file);
    if with_index {
        export::write_comparison(writer, &comparison.rows, &comparison.index_ticker)
    } else {
        export::write_value_series(writer, &comparison.portfolio.values, "Portfolio Value")
    }
    .with_context(|| format!("Failed to export CSV to {}", path.display()))
}
