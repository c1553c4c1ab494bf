//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an optional statistic with fixed precision
pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

/// Color a coefficient by sign
pub fn color_coefficient(value: f64) -> String {
    let formatted = format!("{:+.2}", value);
    if value > 0.0 {
        formatted.green().to_string()
    } else if value < 0.0 {
        formatted.red().to_string()
    } else {
        formatted.dimmed().to_string()
    }
}

/// Color goodness of fit
pub fn color_r_squared(r_squared: Option<f64>) -> String {
    match r_squared {
        None => "n/a".dimmed().to_string(),
        Some(r2) => {
            let formatted = format!("{:.3}", r2);
            if r2 >= 0.7 {
                formatted.green().to_string()
            } else if r2 >= 0.4 {
                formatted.yellow().to_string()
            } else {
                formatted.red().to_string()
            }
        }
    }
}

/// Color a feedback outcome label
pub fn color_outcome(outcome: &str) -> String {
    match outcome {
        "appended" | "confirmed" => outcome.green().to_string(),
        "staged" => outcome.yellow().to_string(),
        "discarded" => outcome.red().to_string(),
        _ => outcome.to_string(),
    }
}

/// Yes/no for boolean feature columns
pub fn format_flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(Some(84.456)), "84.46");
        assert_eq!(format_stat(None), "-");
    }

    #[test]
    fn test_coefficient_sign_is_shown() {
        colored::control::set_override(false);
        assert_eq!(color_coefficient(1000.0), "+1000.00");
        assert_eq!(color_coefficient(-1000.0), "-1000.00");
        assert_eq!(color_r_squared(None), "n/a");
    }

    #[test]
    fn test_format_flag() {
        assert_eq!(format_flag(true), "yes");
        assert_eq!(format_flag(false), "no");
    }
}
