//! The query interface a presentation layer calls on every filter change.
//!
//! A [`Dataset`] holds the normalized tables for the lifetime of the process
//! and is never mutated after loading. Each call to [`Dataset::query`]
//! rebuilds the predicate and recomputes every series from scratch; nothing
//! is cached between calls.

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;

use crate::{
    aggregate::{AggregateRow, Aggregation, Field, aggregate},
    change::{self, grouped_percent_change},
    error::{EngineError, EngineResult},
    filter::{
        AllRows, FilterPredicate, MakerOptions, RowFilter, build_predicate,
        resolve_manufacturer_options,
    },
    schema::{
        self, CategoryRecord, ManufacturerRecord, NormalizeReport, RawTable, YearlyCategoryRecord,
    },
};

pub const DEFAULT_TOP_N: usize = 10;
pub const OTHERS_LABEL: &str = "Others";

/// Caller selections for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Defaults to the first month in the monthly table.
    pub date_start: Option<NaiveDate>,
    /// Defaults to the last month in the monthly table.
    pub date_end: Option<NaiveDate>,
    /// Labels or codes; empty means every category.
    pub categories: Vec<String>,
    pub maker: Option<String>,
    pub top_n: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            date_start: None,
            date_end: None,
            categories: Vec::new(),
            maker: None,
            top_n: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub category: String,
    pub registrations: u64,
}

/// A point of a growth series; `change_pct` is `None` without enough history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthPoint {
    pub period: NaiveDate,
    pub category: String,
    pub registrations: u64,
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearPoint {
    pub year: i32,
    pub registrations: u64,
    pub yoy_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryYearPoint {
    pub category: String,
    pub year: i32,
    pub registrations: u64,
    pub yoy_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MakerTotal {
    pub maker: String,
    pub registrations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareSlice {
    pub name: String,
    pub registrations: u64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketShare {
    pub year: i32,
    pub categories: Vec<ShareSlice>,
    pub makers: Vec<ShareSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub predicate: FilterPredicate,
    pub monthly_trend: Vec<TrendPoint>,
    pub monthly_yoy: Vec<GrowthPoint>,
    pub quarterly_qoq: Vec<GrowthPoint>,
    pub maker_yearly: Vec<YearPoint>,
    pub top_makers: Vec<MakerTotal>,
    pub maker_options: MakerOptions,
}

/// Data-quality tallies from loading each table kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub category_monthly: NormalizeReport,
    pub category_yearly: NormalizeReport,
    pub manufacturers: NormalizeReport,
}

impl LoadReport {
    pub fn total_issues(&self) -> usize {
        self.category_monthly.total_issues()
            + self.category_yearly.total_issues()
            + self.manufacturers.total_issues()
    }
}

/// Immutable in-memory tables shared by every query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    category_monthly: Vec<CategoryRecord>,
    category_yearly: Vec<YearlyCategoryRecord>,
    manufacturers: Vec<ManufacturerRecord>,
}

fn text_key(row: &AggregateRow, idx: usize) -> String {
    row.key
        .get(idx)
        .and_then(|v| v.as_text())
        .unwrap_or_default()
        .to_string()
}

fn shares(slices: Vec<(String, u64)>) -> Vec<ShareSlice> {
    let total = slices.iter().fold(0u64, |acc, (_, v)| acc.saturating_add(*v));
    if total == 0 {
        return Vec::new();
    }
    slices
        .into_iter()
        .map(|(name, registrations)| ShareSlice {
            name,
            registrations,
            share_pct: registrations as f64 / total as f64 * 100.0,
        })
        .collect()
}

impl Dataset {
    pub fn new(
        mut category_monthly: Vec<CategoryRecord>,
        mut category_yearly: Vec<YearlyCategoryRecord>,
        mut manufacturers: Vec<ManufacturerRecord>,
    ) -> Self {
        category_monthly.sort_by(|a, b| a.category.cmp(&b.category).then(a.date.cmp(&b.date)));
        category_yearly.sort_by(|a, b| a.category.cmp(&b.category).then(a.year.cmp(&b.year)));
        manufacturers.sort_by(|a, b| {
            a.maker
                .cmp(&b.maker)
                .then(a.year.cmp(&b.year))
                .then(a.category_code.cmp(&b.category_code))
        });
        Self {
            category_monthly,
            category_yearly,
            manufacturers,
        }
    }

    /// Normalizes raw tables into a dataset.
    ///
    /// Monthly category and manufacturer tables are required; the yearly
    /// category table is optional.
    pub fn from_tables(
        category_monthly: &[RawTable],
        category_yearly: &[RawTable],
        manufacturers: &[RawTable],
    ) -> EngineResult<(Self, LoadReport)> {
        let monthly = schema::normalize_category_monthly(category_monthly)?;
        let yearly = if category_yearly.is_empty() {
            schema::Normalized {
                records: Vec::new(),
                report: NormalizeReport::default(),
            }
        } else {
            schema::normalize_category_yearly(category_yearly)?
        };
        let makers = schema::normalize_manufacturers(manufacturers)?;
        info!(
            "Loaded {} monthly, {} yearly and {} manufacturer record(s)",
            monthly.records.len(),
            yearly.records.len(),
            makers.records.len()
        );
        let report = LoadReport {
            category_monthly: monthly.report,
            category_yearly: yearly.report,
            manufacturers: makers.report,
        };
        Ok((
            Self::new(monthly.records, yearly.records, makers.records),
            report,
        ))
    }

    pub fn category_monthly(&self) -> &[CategoryRecord] {
        &self.category_monthly
    }

    pub fn category_yearly(&self) -> &[YearlyCategoryRecord] {
        &self.category_yearly
    }

    pub fn manufacturers(&self) -> &[ManufacturerRecord] {
        &self.manufacturers
    }

    pub fn available_categories(&self) -> Vec<String> {
        let mut categories = self
            .category_monthly
            .iter()
            .map(|r| r.category.clone())
            .collect::<Vec<_>>();
        categories.dedup();
        categories
    }

    /// First and last month present in the monthly table.
    pub fn month_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.category_monthly.iter().map(|r| r.date).min()?;
        let last = self.category_monthly.iter().map(|r| r.date).max()?;
        Some((first, last))
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.category_yearly
            .iter()
            .map(|r| r.year)
            .max()
            .or_else(|| self.manufacturers.iter().map(|r| r.year).max())
    }

    pub fn predicate(&self, selection: &Selection) -> EngineResult<FilterPredicate> {
        let bounds = self.month_bounds();
        let start = selection
            .date_start
            .or(bounds.map(|(first, _)| first))
            .ok_or_else(|| {
                EngineError::Query("no monthly data to derive a default start date".to_string())
            })?;
        let end = selection
            .date_end
            .or(bounds.map(|(_, last)| last))
            .ok_or_else(|| {
                EngineError::Query("no monthly data to derive a default end date".to_string())
            })?;
        build_predicate(start, end, &selection.categories, selection.maker.as_deref())
    }

    pub fn query(&self, selection: &Selection) -> EngineResult<QueryResponse> {
        let predicate = self.predicate(selection)?;
        debug!("Running query for {selection:?}");

        let maker_options = resolve_manufacturer_options(&self.manufacturers, &predicate)?;
        let maker_predicate = predicate.with_maker(maker_options.selection.as_deref());

        let monthly = self.filtered_monthly(&predicate);
        let monthly_yoy = self.monthly_yoy(&monthly)?;
        let quarterly_qoq = self.quarterly_qoq(&monthly)?;
        let maker_yearly = self.maker_yearly(&maker_predicate)?;
        let top_makers = self.top_makers(&maker_predicate, selection.top_n)?;
        let monthly_trend = monthly
            .into_iter()
            .map(|r| TrendPoint {
                date: r.date,
                category: r.category.clone(),
                registrations: r.registrations,
            })
            .collect();

        Ok(QueryResponse {
            predicate,
            monthly_trend,
            monthly_yoy,
            quarterly_qoq,
            maker_yearly,
            top_makers,
            maker_options,
        })
    }

    pub fn maker_options(&self, selection: &Selection) -> EngineResult<MakerOptions> {
        let predicate = self.predicate(selection)?;
        resolve_manufacturer_options(&self.manufacturers, &predicate)
    }

    fn filtered_monthly(&self, predicate: &FilterPredicate) -> Vec<&CategoryRecord> {
        self.category_monthly
            .iter()
            .filter(|r| predicate.matches(*r))
            .collect()
    }

    /// YoY over the rows inside the window; earlier history is not consulted.
    fn monthly_yoy(&self, monthly: &[&CategoryRecord]) -> EngineResult<Vec<GrowthPoint>> {
        let pct = grouped_percent_change(
            monthly,
            |r| r.category.clone(),
            |r| r.date,
            |r| r.registrations as f64,
            change::MONTHLY_YOY,
        )?;
        Ok(monthly
            .iter()
            .zip(pct)
            .map(|(r, change_pct)| GrowthPoint {
                period: r.date,
                category: r.category.clone(),
                registrations: r.registrations,
                change_pct,
            })
            .collect())
    }

    fn quarterly_qoq(&self, monthly: &[&CategoryRecord]) -> EngineResult<Vec<GrowthPoint>> {
        let quarters = aggregate(
            monthly,
            &AllRows,
            &Aggregation::by(&[Field::Category, Field::Quarter]),
        )?;
        let pct = grouped_percent_change(
            &quarters,
            |r| text_key(r, 0),
            |r| r.key.get(1).and_then(|v| v.as_date()),
            |r| r.registrations as f64,
            change::SEQUENTIAL,
        )?;
        Ok(quarters
            .iter()
            .zip(pct)
            .filter_map(|(row, change_pct)| {
                Some(GrowthPoint {
                    period: row.key.get(1)?.as_date()?,
                    category: text_key(row, 0),
                    registrations: row.registrations,
                    change_pct,
                })
            })
            .collect())
    }

    fn maker_yearly(&self, predicate: &FilterPredicate) -> EngineResult<Vec<YearPoint>> {
        let years = aggregate(&self.manufacturers, predicate, &Aggregation::by(&[Field::Year]))?;
        let values = years
            .iter()
            .map(|r| r.registrations as f64)
            .collect::<Vec<_>>();
        let pct = change::percent_change(&values, change::SEQUENTIAL)?;
        Ok(years
            .iter()
            .zip(pct)
            .filter_map(|(row, yoy_pct)| {
                Some(YearPoint {
                    year: row.key.first()?.as_year()?,
                    registrations: row.registrations,
                    yoy_pct,
                })
            })
            .collect())
    }

    fn top_makers(&self, predicate: &FilterPredicate, top_n: usize) -> EngineResult<Vec<MakerTotal>> {
        let ranked = aggregate(
            &self.manufacturers,
            predicate,
            &Aggregation::by(&[Field::Maker]).ranked().top(top_n),
        )?;
        Ok(ranked
            .iter()
            .map(|row| MakerTotal {
                maker: text_key(row, 0),
                registrations: row.registrations,
            })
            .collect())
    }

    /// Category YoY from the yearly category table within the selection.
    pub fn category_yearly_yoy(&self, selection: &Selection) -> EngineResult<Vec<CategoryYearPoint>> {
        let predicate = self.predicate(selection)?;
        let rows = self
            .category_yearly
            .iter()
            .filter(|r| predicate.matches(*r))
            .collect::<Vec<_>>();
        let pct = grouped_percent_change(
            &rows,
            |r| r.category.clone(),
            |r| r.year,
            |r| r.registrations as f64,
            change::SEQUENTIAL,
        )?;
        Ok(rows
            .iter()
            .zip(pct)
            .map(|(r, yoy_pct)| CategoryYearPoint {
                category: r.category.clone(),
                year: r.year,
                registrations: r.registrations,
                yoy_pct,
            })
            .collect())
    }

    /// Category and maker shares of total registrations in `year`.
    ///
    /// Makers beyond `selection.top_n` are folded into an `Others` slice.
    pub fn market_share(&self, selection: &Selection, year: i32) -> EngineResult<MarketShare> {
        let out_of_range = || EngineError::Query(format!("year {year} is out of range"));
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(out_of_range)?;
        let end = NaiveDate::from_ymd_opt(year, 12, 1).ok_or_else(out_of_range)?;
        let predicate = build_predicate(
            start,
            end,
            &selection.categories,
            selection.maker.as_deref(),
        )?;

        let category_rows = aggregate(
            &self.category_yearly,
            &predicate,
            &Aggregation::by(&[Field::Category]).ranked(),
        )?;
        let category_slices = category_rows
            .iter()
            .map(|row| (text_key(row, 0), row.registrations))
            .collect();

        let maker_rows = aggregate(
            &self.manufacturers,
            &predicate,
            &Aggregation::by(&[Field::Maker]).ranked(),
        )?;
        let mut maker_slices = maker_rows
            .iter()
            .take(selection.top_n)
            .map(|row| (text_key(row, 0), row.registrations))
            .collect::<Vec<_>>();
        let others = maker_rows
            .iter()
            .skip(selection.top_n)
            .fold(0u64, |acc, row| acc.saturating_add(row.registrations));
        if others > 0 {
            maker_slices.push((OTHERS_LABEL.to_string(), others));
        }

        Ok(MarketShare {
            year,
            categories: shares(category_slices),
            makers: shares(maker_slices),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn sample() -> Dataset {
        let mut monthly = Vec::new();
        for m in 1..=12 {
            monthly.push(CategoryRecord {
                date: ymd(2020, m),
                category: "LIGHT MOTOR VEHICLE".into(),
                registrations: 100,
            });
        }
        monthly.push(CategoryRecord {
            date: ymd(2021, 1),
            category: "LIGHT MOTOR VEHICLE".into(),
            registrations: 110,
        });
        let makers = vec![
            ManufacturerRecord {
                maker: "Acme".into(),
                category_code: "LMV".into(),
                year: 2020,
                registrations: 10,
            },
            ManufacturerRecord {
                maker: "Acme".into(),
                category_code: "LMV".into(),
                year: 2021,
                registrations: 15,
            },
        ];
        Dataset::new(monthly, Vec::new(), makers)
    }

    #[test]
    fn default_range_spans_monthly_table() {
        let dataset = sample();
        let predicate = dataset.predicate(&Selection::default()).unwrap();
        assert_eq!(predicate.date_start, ymd(2020, 1));
        assert_eq!(predicate.date_end, ymd(2021, 1));
    }

    #[test]
    fn empty_dataset_needs_explicit_range() {
        let err = Dataset::default().query(&Selection::default()).unwrap_err();
        assert!(matches!(err, EngineError::Query(_)));
    }

    #[test]
    fn query_produces_yoy_and_maker_growth() {
        let response = sample().query(&Selection::default()).unwrap();
        assert_eq!(response.monthly_trend.len(), 13);
        assert_eq!(response.monthly_yoy.last().unwrap().change_pct, Some(10.0));
        assert_eq!(response.maker_yearly.len(), 2);
        assert_eq!(response.maker_yearly[1].yoy_pct, Some(50.0));
        assert_eq!(response.top_makers[0].maker, "Acme");
    }

    #[test]
    fn shares_of_zero_total_are_empty() {
        assert!(shares(vec![("a".into(), 0)]).is_empty());
        let slices = shares(vec![("a".into(), 1), ("b".into(), 3)]);
        assert_eq!(slices[1].share_pct, 75.0);
    }
}
