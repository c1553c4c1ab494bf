//! Dataset summary command

use anyhow::{Context, Result};
use estimator_lib::training::{self, DatasetSummary};
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_stat, print_heading, print_json, print_table, print_warning, OutputFormat};

/// Row for the column statistics table
#[derive(Tabled)]
struct ColumnRow {
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Present")]
    present: usize,
    #[tabled(rename = "Missing")]
    missing: usize,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
}

/// Review an offers table before training
pub fn show_summary(data: &Path, format: OutputFormat) -> Result<()> {
    let parsed = training::load_offers(data)
        .with_context(|| format!("loading offers from {}", data.display()))?;
    let summary = DatasetSummary::from_parsed(&parsed);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading("Offers Table");
            println!("File:        {}", data.display());
            println!("Offers:      {}", summary.offers);
            println!("Duplicates:  {}", summary.duplicates);
            match (summary.first_listed, summary.last_listed) {
                (Some(first), Some(last)) => println!("Listed:      {} to {}", first, last),
                _ => println!("Listed:      unknown"),
            }
            println!();

            let rows: Vec<ColumnRow> = summary
                .columns
                .iter()
                .map(|c| ColumnRow {
                    column: c.column.clone(),
                    present: c.present,
                    missing: c.missing,
                    mean: format_stat(c.mean),
                    min: format_stat(c.min),
                    max: format_stat(c.max),
                })
                .collect();
            print_table(rows);

            if summary.dropped_malformed > 0 {
                print_warning(&format!(
                    "{} malformed row(s) skipped",
                    summary.dropped_malformed
                ));
            }
        }
    }
    Ok(())
}
