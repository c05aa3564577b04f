//! Schema normalization for registration tables.
//!
//! Upstream tables arrive with drifting column names (`Maker`, `Maker Name`,
//! `Manufacturer`), different date encodings (an explicit date, a raw month
//! label such as `Jan-2021`, or a year and month pair) and messy numeric
//! cells. This module resolves each [`RawTable`] to a column layout, types
//! every row and returns canonical records sorted for deterministic grouping.
//!
//! ## Recovery policy
//!
//! - Registrations that fail to parse become `0` and are counted.
//! - Rows with an unparseable date, year or empty label are dropped and counted.
//! - A table with no date-like or no label-like column is a configuration
//!   error; nothing downstream is meaningful without them.
//!
//! Every recovery is tallied in a [`NormalizeReport`] and logged at `warn`.

use std::collections::{BTreeMap, HashSet, btree_map::Entry};

use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    codes,
    data::{canonical_header, parse_count, parse_month, parse_month_number, parse_year},
    error::{EngineError, EngineResult},
};

const CATEGORY_ALIASES: &[&str] = &[
    "category",
    "vehicle_category",
    "vehicle_class",
    "category_name",
    "segment",
];
const MAKER_ALIASES: &[&str] = &[
    "maker",
    "maker_name",
    "manufacturer",
    "manufacturer_name",
    "make",
];
const DATE_ALIASES: &[&str] = &["date", "month_start", "period_start"];
const MONTH_LABEL_ALIASES: &[&str] = &["month_raw", "month_label", "period"];
const YEAR_ALIASES: &[&str] = &["year", "calendar_year"];
const MONTH_ALIASES: &[&str] = &["month", "month_number"];
const REGISTRATION_ALIASES: &[&str] = &[
    "registrations",
    "registration",
    "total_registrations",
    "count",
    "value",
];
/// Header fragments that mark a segment column in manufacturer exports.
const SEGMENT_TOKENS: &[&str] = &["2w", "3w", "4w", "category", "segment"];

/// An untyped input table: headers plus string cells, as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(source: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source: source.into(),
            headers,
            rows,
        }
    }

    pub fn from_str_rows(source: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            source,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    pub fn find_column(&self, aliases: &[&str]) -> Option<usize> {
        let canonical = self
            .headers
            .iter()
            .map(|h| canonical_header(h))
            .collect::<Vec<_>>();
        aliases
            .iter()
            .find_map(|alias| canonical.iter().position(|h| h == alias))
    }

    /// First column outside `taken` holding at least one non-numeric value.
    fn first_text_column(&self, taken: &[usize]) -> Option<usize> {
        (0..self.headers.len())
            .filter(|idx| !taken.contains(idx))
            .find(|idx| {
                self.rows.iter().any(|row| {
                    let value = cell(row, *idx).trim();
                    !value.is_empty() && value.parse::<f64>().is_err()
                })
            })
    }

    fn segment_column(&self, taken: &[usize]) -> Option<usize> {
        self.find_column(&["category"])
            .filter(|idx| !taken.contains(idx))
            .or_else(|| {
                self.headers.iter().enumerate().find_map(|(idx, header)| {
                    let lowered = header.to_ascii_lowercase();
                    (!taken.contains(&idx) && SEGMENT_TOKENS.iter().any(|t| lowered.contains(t)))
                        .then_some(idx)
                })
            })
    }

    fn registrations_column(&self) -> EngineResult<usize> {
        self.find_column(REGISTRATION_ALIASES).ok_or_else(|| {
            EngineError::configuration(format!(
                "no registrations column in {} (headers: {:?})",
                self.source, self.headers
            ))
        })
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.as_str()).unwrap_or("")
}

/// Where a row's month comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Date(usize),
    MonthLabel(usize),
    YearMonth { year: usize, month: usize },
}

impl DateSource {
    pub fn detect(table: &RawTable) -> Option<Self> {
        if let Some(idx) = table.find_column(DATE_ALIASES) {
            return Some(DateSource::Date(idx));
        }
        if let Some(idx) = table.find_column(MONTH_LABEL_ALIASES) {
            return Some(DateSource::MonthLabel(idx));
        }
        match (
            table.find_column(YEAR_ALIASES),
            table.find_column(MONTH_ALIASES),
        ) {
            (Some(year), Some(month)) => Some(DateSource::YearMonth { year, month }),
            _ => None,
        }
    }

    fn columns(&self) -> Vec<usize> {
        match self {
            DateSource::Date(idx) | DateSource::MonthLabel(idx) => vec![*idx],
            DateSource::YearMonth { year, month } => vec![*year, *month],
        }
    }

    fn resolve(&self, row: &[String]) -> Option<NaiveDate> {
        match self {
            DateSource::Date(idx) | DateSource::MonthLabel(idx) => parse_month(cell(row, *idx)),
            DateSource::YearMonth { year, month } => NaiveDate::from_ymd_opt(
                parse_year(cell(row, *year))?,
                parse_month_number(cell(row, *month))?,
                1,
            ),
        }
    }
}

/// Where a row's year comes from in yearly tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YearSource {
    Year(usize),
    Month(DateSource),
}

impl YearSource {
    fn detect(table: &RawTable) -> Option<Self> {
        table
            .find_column(YEAR_ALIASES)
            .map(YearSource::Year)
            .or_else(|| DateSource::detect(table).map(YearSource::Month))
    }

    fn columns(&self) -> Vec<usize> {
        match self {
            YearSource::Year(idx) => vec![*idx],
            YearSource::Month(source) => source.columns(),
        }
    }

    fn resolve(&self, row: &[String]) -> Option<i32> {
        match self {
            YearSource::Year(idx) => parse_year(cell(row, *idx)),
            YearSource::Month(source) => source.resolve(row).map(|d| d.year()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub date: NaiveDate,
    pub category: String,
    pub registrations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlyCategoryRecord {
    pub category: String,
    pub year: i32,
    pub registrations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerRecord {
    pub maker: String,
    pub category_code: String,
    pub year: i32,
    pub registrations: u64,
}

/// Canonical CSV shape of a normalized record.
pub trait CanonicalRecord {
    fn csv_headers() -> &'static [&'static str];
    fn csv_row(&self) -> Vec<String>;
}

impl CanonicalRecord for CategoryRecord {
    fn csv_headers() -> &'static [&'static str] {
        &["Date", "Category", "Registrations"]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.date.format("%Y-%m-%d").to_string(),
            self.category.clone(),
            self.registrations.to_string(),
        ]
    }
}

impl CanonicalRecord for YearlyCategoryRecord {
    fn csv_headers() -> &'static [&'static str] {
        &["Category", "Year", "Registrations"]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.category.clone(),
            self.year.to_string(),
            self.registrations.to_string(),
        ]
    }
}

impl CanonicalRecord for ManufacturerRecord {
    fn csv_headers() -> &'static [&'static str] {
        &["Maker", "Category", "Year", "Registrations"]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.maker.clone(),
            self.category_code.clone(),
            self.year.to_string(),
            self.registrations.to_string(),
        ]
    }
}

/// Tally of data-quality recoveries made while normalizing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    issues: BTreeMap<String, usize>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn record(&mut self, issue: &str) {
        *self.issues.entry(issue.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, issue: &str) -> usize {
        self.issues.get(issue).copied().unwrap_or(0)
    }

    pub fn total_issues(&self) -> usize {
        self.issues.values().sum()
    }

    pub fn entries(&self) -> Vec<(String, usize)> {
        self.issues
            .iter()
            .map(|(issue, count)| (issue.clone(), *count))
            .collect()
    }

    fn log(&self, kind: &str) {
        for (issue, count) in &self.issues {
            warn!("{kind}: {count} row(s) with {issue}");
        }
        info!(
            "Normalized {kind}: kept {} of {} row(s)",
            self.rows_kept, self.rows_read
        );
    }
}

pub const ISSUE_UNPARSEABLE_DATE: &str = "unparseable date";
pub const ISSUE_UNPARSEABLE_YEAR: &str = "unparseable year";
pub const ISSUE_EMPTY_LABEL: &str = "empty label";
pub const ISSUE_DUPLICATE_MERGED: &str = "duplicate key merged";
pub const ISSUE_UNKNOWN_CODE: &str = "unrecognised category code";
pub const ISSUE_TOTAL_OVERFLOW: &str = "registrations total overflowed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub report: NormalizeReport,
}

fn require_tables(tables: &[RawTable], kind: &str) -> EngineResult<()> {
    if tables.is_empty() {
        return Err(EngineError::configuration(format!(
            "no {kind} table supplied"
        )));
    }
    Ok(())
}

fn no_column(kind: &str, table: &RawTable) -> EngineError {
    EngineError::configuration(format!(
        "no {kind} column in {} (headers: {:?})",
        table.source, table.headers
    ))
}

fn registrations(raw: &str, report: &mut NormalizeReport) -> u64 {
    match parse_count(raw) {
        Ok(value) => value,
        Err(issue) => {
            report.record(issue.describe());
            0
        }
    }
}

/// Sums `value` into `key`, counting a merge when the key already exists.
/// A total that would overflow is held at `u64::MAX` and counted.
fn accumulate<K: Ord>(
    totals: &mut BTreeMap<K, u64>,
    key: K,
    value: u64,
    report: &mut NormalizeReport,
) {
    match totals.entry(key) {
        Entry::Occupied(mut existing) => {
            report.record(ISSUE_DUPLICATE_MERGED);
            let total = existing.get_mut();
            *total = total.checked_add(value).unwrap_or_else(|| {
                report.record(ISSUE_TOTAL_OVERFLOW);
                u64::MAX
            });
        }
        Entry::Vacant(empty) => {
            empty.insert(value);
        }
    }
}

/// Normalizes monthly category tables into one record per (category, month),
/// sorted by category then date.
pub fn normalize_category_monthly(tables: &[RawTable]) -> EngineResult<Normalized<CategoryRecord>> {
    require_tables(tables, "category monthly")?;
    let mut report = NormalizeReport::default();
    let mut totals: BTreeMap<(String, NaiveDate), u64> = BTreeMap::new();

    for table in tables {
        let dates = DateSource::detect(table).ok_or_else(|| no_column("date-like", table))?;
        let value = table.registrations_column()?;
        let mut taken = dates.columns();
        taken.push(value);
        let label = table
            .find_column(CATEGORY_ALIASES)
            .or_else(|| table.first_text_column(&taken))
            .ok_or_else(|| no_column("category label", table))?;

        for row in &table.rows {
            report.rows_read += 1;
            let Some(date) = dates.resolve(row) else {
                report.record(ISSUE_UNPARSEABLE_DATE);
                continue;
            };
            let category = cell(row, label).trim();
            if category.is_empty() {
                report.record(ISSUE_EMPTY_LABEL);
                continue;
            }
            let count = registrations(cell(row, value), &mut report);
            accumulate(&mut totals, (category.to_string(), date), count, &mut report);
        }
    }

    let records = totals
        .into_iter()
        .map(|((category, date), registrations)| CategoryRecord {
            date,
            category,
            registrations,
        })
        .collect::<Vec<_>>();
    report.rows_kept = records.len();
    report.log("category monthly");
    Ok(Normalized { records, report })
}

/// Normalizes yearly category tables, sorted by category then year.
pub fn normalize_category_yearly(
    tables: &[RawTable],
) -> EngineResult<Normalized<YearlyCategoryRecord>> {
    require_tables(tables, "category yearly")?;
    let mut report = NormalizeReport::default();
    let mut totals: BTreeMap<(String, i32), u64> = BTreeMap::new();

    for table in tables {
        let years = YearSource::detect(table).ok_or_else(|| no_column("year-like", table))?;
        let value = table.registrations_column()?;
        let mut taken = years.columns();
        taken.push(value);
        let label = table
            .find_column(CATEGORY_ALIASES)
            .or_else(|| table.first_text_column(&taken))
            .ok_or_else(|| no_column("category label", table))?;

        for row in &table.rows {
            report.rows_read += 1;
            let Some(year) = years.resolve(row) else {
                report.record(ISSUE_UNPARSEABLE_YEAR);
                continue;
            };
            let category = cell(row, label).trim();
            if category.is_empty() {
                report.record(ISSUE_EMPTY_LABEL);
                continue;
            }
            let count = registrations(cell(row, value), &mut report);
            accumulate(&mut totals, (category.to_string(), year), count, &mut report);
        }
    }

    let records = totals
        .into_iter()
        .map(|((category, year), registrations)| YearlyCategoryRecord {
            category,
            year,
            registrations,
        })
        .collect::<Vec<_>>();
    report.rows_kept = records.len();
    report.log("category yearly");
    Ok(Normalized { records, report })
}

/// Unions manufacturer segment tables and sums duplicate
/// (maker, code, year) rows. Output is sorted by maker, year, then code.
///
/// Category values are moved into code space: a canonical label is replaced
/// by its code and an unknown value is kept literally but counted.
pub fn normalize_manufacturers(
    tables: &[RawTable],
) -> EngineResult<Normalized<ManufacturerRecord>> {
    require_tables(tables, "manufacturer")?;
    let mut report = NormalizeReport::default();
    let mut totals: BTreeMap<(String, i32, String), u64> = BTreeMap::new();
    let mut unknown_codes = HashSet::new();

    for table in tables {
        let years = YearSource::detect(table).ok_or_else(|| no_column("year-like", table))?;
        let value = table.registrations_column()?;
        let mut taken = years.columns();
        taken.push(value);
        let maker = table
            .find_column(MAKER_ALIASES)
            .or_else(|| table.first_text_column(&taken))
            .ok_or_else(|| no_column("maker label", table))?;
        taken.push(maker);
        let segment = table
            .segment_column(&taken)
            .ok_or_else(|| no_column("category code", table))?;

        for row in &table.rows {
            report.rows_read += 1;
            let Some(year) = years.resolve(row) else {
                report.record(ISSUE_UNPARSEABLE_YEAR);
                continue;
            };
            let maker_name = cell(row, maker).trim();
            let raw_code = cell(row, segment).trim();
            if maker_name.is_empty() || raw_code.is_empty() {
                report.record(ISSUE_EMPTY_LABEL);
                continue;
            }
            let (code, known) = codes::canonical_code(raw_code);
            if !known {
                report.record(ISSUE_UNKNOWN_CODE);
                unknown_codes.insert(code.to_string());
            }
            let count = registrations(cell(row, value), &mut report);
            accumulate(
                &mut totals,
                (maker_name.to_string(), year, code.into_owned()),
                count,
                &mut report,
            );
        }
    }

    if !unknown_codes.is_empty() {
        let mut listed = unknown_codes.into_iter().collect::<Vec<_>>();
        listed.sort();
        warn!("Manufacturer category values outside the code map: {listed:?}");
    }

    let records = totals
        .into_iter()
        .map(|((maker, year, category_code), registrations)| ManufacturerRecord {
            maker,
            category_code,
            year,
            registrations,
        })
        .collect::<Vec<_>>();
    report.rows_kept = records.len();
    report.log("manufacturer");
    Ok(Normalized { records, report })
}
