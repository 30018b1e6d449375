//! CSV export of simulated value series
use crate::core::analytics::ComparisonRow;
use crate::core::simulation::ValueSeries;
use anyhow::{Context, Result};
use std::io::Write;

/// Writes `series` as a two column `Date,<value_header>` table.
pub fn write_value_series<W: Write>(writer: W, series: &ValueSeries, value_header: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Date", value_header])
        .context("Failed to write CSV header")?;
    for point in series.iter() {
        wtr.write_record([point.date.to_string(), format!("{:.2}", point.value)])
            .with_context(|| format!("Failed to write CSV row for {}", point.date))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Writes the portfolio and index values side by side.
pub fn write_comparison<W: Write>(
    writer: W,
    rows: &[ComparisonRow],
    index_label: &str,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let index_header = format!("{index_label} Value");
    wtr.write_record(["Date", "Portfolio Value", index_header.as_str()])
        .context("Failed to write CSV header")?;
    for row in rows {
        wtr.write_record([
            row.date.to_string(),
            format!("{:.2}", row.portfolio),
            format!("{:.2}", row.index),
        ])
        .with_context(|| format!("Failed to write CSV row for {}", row.date))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}
