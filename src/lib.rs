pub mod aggregate;
pub mod change;
pub mod cli;
pub mod codes;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod io_utils;
pub mod query;
pub mod render;
pub mod schema;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde_json::json;

use crate::{
    cli::{Cli, Commands, DataArgs, FilterArgs, OutputFormat, TableKind},
    config::DatasetConfig,
    query::{Dataset, LoadReport, Selection},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("registration_trends", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Query(args) => handle_query(&args),
        Commands::Makers(args) => handle_makers(&args),
        Commands::Normalize(args) => handle_normalize(&args),
        Commands::Share(args) => handle_share(&args),
    }
}

/// Merges the manifest (if any) with explicit command-line inputs.
pub fn dataset_config(args: &DataArgs) -> Result<DatasetConfig> {
    let mut config = match &args.config {
        Some(path) => DatasetConfig::load(path)
            .with_context(|| format!("Loading dataset manifest {path:?}"))?,
        None => DatasetConfig::default(),
    };
    if !args.category_monthly.is_empty() {
        config.category_monthly = args.category_monthly.clone();
    }
    if !args.category_yearly.is_empty() {
        config.category_yearly = args.category_yearly.clone();
    }
    if !args.manufacturers.is_empty() {
        config.manufacturers = args.manufacturers.clone();
    }
    if let Some(delimiter) = args.delimiter {
        config.delimiter = Some(char::from(delimiter).to_string());
    }
    if let Some(encoding) = &args.input_encoding {
        config.encoding = Some(encoding.clone());
    }
    debug!("Dataset configuration: {config:?}");
    Ok(config)
}

fn selection(filter: &FilterArgs, config: &DatasetConfig) -> Selection {
    Selection {
        date_start: filter.from,
        date_end: filter.to,
        categories: filter
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        maker: filter.maker.clone(),
        top_n: filter.top.unwrap_or(config.top_n),
    }
}

fn load(args: &DataArgs) -> Result<(Dataset, DatasetConfig, LoadReport)> {
    let config = dataset_config(args)?;
    let (dataset, report) = config.load_dataset().context("Loading dataset")?;
    Ok((dataset, config, report))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Serializing output")?
    );
    Ok(())
}

fn handle_query(args: &cli::QueryArgs) -> Result<()> {
    let (dataset, config, report) = load(&args.data)?;
    let selection = selection(&args.filter, &config);
    info!(
        "Querying {} categor(ies), maker {:?}",
        selection.categories.len(),
        selection.maker
    );
    let response = dataset
        .query(&selection)
        .with_context(|| format!("Running query {selection:?}"))?;
    match args.format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            render::print_load_report(&report);
            render::print_query_response(&response);
        }
    }
    Ok(())
}

fn handle_makers(args: &cli::MakersArgs) -> Result<()> {
    let (dataset, config, _) = load(&args.data)?;
    let selection = selection(&args.filter, &config);
    let options = dataset
        .maker_options(&selection)
        .context("Resolving manufacturer options")?;
    info!(
        "{} manufacturer(s) valid under the current filter",
        options.options.len()
    );
    match args.format {
        OutputFormat::Json => print_json(&options)?,
        OutputFormat::Table => render::print_maker_options(&options),
    }
    Ok(())
}

fn handle_normalize(args: &cli::NormalizeArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let tables = args
        .inputs
        .iter()
        .map(|path| {
            io_utils::read_raw_table(path, args.delimiter, encoding)
                .with_context(|| format!("Reading {path:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let output = args.output.as_deref();
    let delimiter = args
        .output_delimiter
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);

    let (kind, written, report) = match args.kind {
        TableKind::CategoryMonthly => {
            let normalized = schema::normalize_category_monthly(&tables)?;
            let written = io_utils::write_records(&normalized.records, output, delimiter)?;
            ("category monthly", written, normalized.report)
        }
        TableKind::CategoryYearly => {
            let normalized = schema::normalize_category_yearly(&tables)?;
            let written = io_utils::write_records(&normalized.records, output, delimiter)?;
            ("category yearly", written, normalized.report)
        }
        TableKind::Manufacturer => {
            let normalized = schema::normalize_manufacturers(&tables)?;
            let written = io_utils::write_records(&normalized.records, output, delimiter)?;
            ("manufacturer", written, normalized.report)
        }
    };
    render::print_normalize_report(kind, &report);
    info!(
        "Wrote {written} {kind} record(s) to {}",
        output.map_or_else(|| "stdout".to_string(), |p| p.display().to_string())
    );
    Ok(())
}

fn handle_share(args: &cli::ShareArgs) -> Result<()> {
    let (dataset, config, _) = load(&args.data)?;
    let selection = selection(&args.filter, &config);
    let year = match args.year {
        Some(year) => year,
        None => dataset
            .latest_year()
            .ok_or_else(|| anyhow!("No yearly data available; pass --year"))?,
    };
    let share = dataset
        .market_share(&selection, year)
        .with_context(|| format!("Computing market share for {year}"))?;
    let growth = dataset
        .category_yearly_yoy(&selection)
        .context("Computing category growth")?;
    match args.format {
        OutputFormat::Json => print_json(&json!({
            "share": share,
            "category_growth": growth,
        }))?,
        OutputFormat::Table => render::print_market_share(&share, &growth),
    }
    Ok(())
}
