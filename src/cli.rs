use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::data::parse_month;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Aggregate and filter vehicle registration time series",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a filtered query and print every dashboard series
    Query(QueryArgs),
    /// List manufacturers valid under a filter and reconcile a maker selection
    Makers(MakersArgs),
    /// Normalize raw tables into canonical CSV and report data-quality issues
    Normalize(NormalizeArgs),
    /// Category and manufacturer market share for one year
    Share(ShareArgs),
}

/// Where the dataset comes from: a manifest, explicit files, or both.
#[derive(Debug, Args, Default)]
pub struct DataArgs {
    /// YAML dataset manifest listing the input tables
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Monthly category table(s); replaces the manifest entry when given
    #[arg(long = "category-monthly", action = clap::ArgAction::Append)]
    pub category_monthly: Vec<PathBuf>,
    /// Yearly category table(s); replaces the manifest entry when given
    #[arg(long = "category-yearly", action = clap::ArgAction::Append)]
    pub category_yearly: Vec<PathBuf>,
    /// Manufacturer table(s), one per segment export; concatenated on load
    #[arg(long = "manufacturer", action = clap::ArgAction::Append)]
    pub manufacturers: Vec<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args, Default)]
pub struct FilterArgs {
    /// First month of the range, e.g. 2021-01 or Jan-2021 (defaults to earliest month)
    #[arg(long = "from", value_parser = parse_month_arg)]
    pub from: Option<NaiveDate>,
    /// Last month of the range, inclusive (defaults to latest month)
    #[arg(long = "to", value_parser = parse_month_arg)]
    pub to: Option<NaiveDate>,
    /// Category label or code to include; repeat for several
    #[arg(long = "category", action = clap::ArgAction::Append)]
    pub categories: Vec<String>,
    /// Restrict manufacturer series to one maker
    #[arg(long)]
    pub maker: Option<String>,
    /// Number of manufacturers to rank (overrides the manifest)
    #[arg(long)]
    pub top: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct MakersArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum TableKind {
    CategoryMonthly,
    CategoryYearly,
    Manufacturer,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Which table shape the inputs hold
    #[arg(long, value_enum)]
    pub kind: TableKind,
    /// One or more raw tables to normalize ('-' reads stdin)
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Destination CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to comma)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ShareArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Year to report (defaults to the latest year in the data)
    #[arg(long)]
    pub year: Option<i32>,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

fn parse_month_arg(value: &str) -> Result<NaiveDate, String> {
    parse_month(value).ok_or_else(|| format!("'{value}' is not a recognisable month"))
}
