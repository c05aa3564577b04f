//! Filter predicates and the cascading maker selection rule.
//!
//! A [`FilterPredicate`] is rebuilt for every query from the caller's date
//! range, category selection and maker. Category values may arrive as
//! canonical labels or as short codes; the predicate resolves both
//! vocabularies once up front so category-side rows are matched on labels and
//! manufacturer-side rows on codes.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::Serialize;

use crate::{
    aggregate::{Aggregation, Field, aggregate},
    codes::{self, Direction},
    data::first_of_month,
    error::{EngineError, EngineResult},
    schema::{CategoryRecord, ManufacturerRecord, YearlyCategoryRecord},
};

/// Row selection used by [`crate::aggregate::aggregate`].
pub trait RowFilter<T> {
    fn matches(&self, row: &T) -> bool;
}

/// Accepts every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllRows;

impl<T> RowFilter<T> for AllRows {
    fn matches(&self, _row: &T) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterPredicate {
    /// First month in range (inclusive).
    pub date_start: NaiveDate,
    /// Last month in range (inclusive).
    pub date_end: NaiveDate,
    pub maker: Option<String>,
    category_labels: Option<BTreeSet<String>>,
    category_codes: Option<BTreeSet<String>>,
}

/// Builds the predicate for one query.
///
/// Dates are reduced to month granularity. An empty category list means no
/// category filter. A blank maker means no maker filter.
pub fn build_predicate<S: AsRef<str>>(
    date_start: NaiveDate,
    date_end: NaiveDate,
    categories: &[S],
    maker: Option<&str>,
) -> EngineResult<FilterPredicate> {
    if date_start > date_end {
        return Err(EngineError::InvalidDateRange {
            start: date_start,
            end: date_end,
        });
    }
    let category_labels = codes::resolve(categories, Direction::CodeToLabel)
        .map(|labels| labels.into_iter().collect::<BTreeSet<_>>());
    let category_codes = codes::resolve(categories, Direction::LabelToCode)
        .map(|codes| codes.into_iter().collect::<BTreeSet<_>>());
    let maker = maker
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let predicate = FilterPredicate {
        date_start: first_of_month(date_start),
        date_end: first_of_month(date_end),
        maker,
        category_labels,
        category_codes,
    };
    debug!("Built predicate {predicate:?}");
    Ok(predicate)
}

impl FilterPredicate {
    pub fn contains_month(&self, date: NaiveDate) -> bool {
        let month = first_of_month(date);
        month >= self.date_start && month <= self.date_end
    }

    pub fn contains_year(&self, year: i32) -> bool {
        year >= self.date_start.year() && year <= self.date_end.year()
    }

    pub fn category_labels(&self) -> Option<&BTreeSet<String>> {
        self.category_labels.as_ref()
    }

    pub fn category_codes(&self) -> Option<&BTreeSet<String>> {
        self.category_codes.as_ref()
    }

    fn label_allowed(&self, label: &str) -> bool {
        self.category_labels
            .as_ref()
            .is_none_or(|labels| labels.contains(label))
    }

    fn code_allowed(&self, code: &str) -> bool {
        self.category_codes
            .as_ref()
            .is_none_or(|codes| codes.contains(code))
    }

    fn maker_allowed(&self, maker: &str) -> bool {
        self.maker.as_deref().is_none_or(|m| m == maker)
    }

    /// Same predicate with the maker filter replaced.
    pub fn with_maker(&self, maker: Option<&str>) -> Self {
        Self {
            maker: maker.map(str::to_string),
            ..self.clone()
        }
    }
}

impl RowFilter<CategoryRecord> for FilterPredicate {
    fn matches(&self, row: &CategoryRecord) -> bool {
        self.contains_month(row.date) && self.label_allowed(&row.category)
    }
}

impl RowFilter<YearlyCategoryRecord> for FilterPredicate {
    fn matches(&self, row: &YearlyCategoryRecord) -> bool {
        self.contains_year(row.year) && self.label_allowed(&row.category)
    }
}

impl RowFilter<ManufacturerRecord> for FilterPredicate {
    fn matches(&self, row: &ManufacturerRecord) -> bool {
        self.contains_year(row.year)
            && self.code_allowed(&row.category_code)
            && self.maker_allowed(&row.maker)
    }
}

/// Maker choices valid under a predicate, plus the reconciled selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MakerOptions {
    /// Makers with registrations under the predicate, highest total first.
    pub options: Vec<String>,
    pub selection: Option<String>,
    /// True when a previous selection was dropped because it is no longer valid.
    pub reset: bool,
}

/// Keeps `current` if it is still among `options`, otherwise clears it.
///
/// Returns the new selection and whether it changed.
pub fn reconcile_selection(current: Option<&str>, options: &[String]) -> (Option<String>, bool) {
    match current {
        None => (None, false),
        Some(maker) if options.iter().any(|o| o == maker) => (Some(maker.to_string()), false),
        Some(_) => (None, true),
    }
}

/// Recomputes the maker list under `predicate` (ignoring its maker filter) and
/// decides whether the predicate's maker survives.
pub fn resolve_manufacturer_options(
    table: &[ManufacturerRecord],
    predicate: &FilterPredicate,
) -> EngineResult<MakerOptions> {
    let unconstrained = predicate.with_maker(None);
    let ranked = aggregate(table, &unconstrained, &Aggregation::by(&[Field::Maker]).ranked())?;
    let options = ranked
        .into_iter()
        .filter(|row| row.registrations > 0)
        .filter_map(|row| row.key.into_iter().next())
        .filter_map(|value| value.as_text().map(str::to_string))
        .collect::<Vec<_>>();
    let (selection, reset) = reconcile_selection(predicate.maker.as_deref(), &options);
    if reset {
        debug!(
            "Maker '{}' has no registrations under the current filter; clearing selection",
            predicate.maker.as_deref().unwrap_or_default()
        );
    }
    Ok(MakerOptions {
        options,
        selection,
        reset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn maker_row(maker: &str, code: &str, year: i32, registrations: u64) -> ManufacturerRecord {
        ManufacturerRecord {
            maker: maker.to_string(),
            category_code: code.to_string(),
            year,
            registrations,
        }
    }

    #[test]
    fn start_after_end_is_rejected() {
        let none: [&str; 0] = [];
        let err = build_predicate(ymd(2022, 2, 1), ymd(2022, 1, 1), &none, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDateRange { .. }));
    }

    #[test]
    fn range_is_inclusive_at_month_granularity() {
        let none: [&str; 0] = [];
        let predicate = build_predicate(ymd(2021, 1, 15), ymd(2021, 3, 2), &none, None).unwrap();
        assert!(predicate.contains_month(ymd(2021, 1, 1)));
        assert!(predicate.contains_month(ymd(2021, 3, 1)));
        assert!(!predicate.contains_month(ymd(2021, 4, 1)));
        assert!(predicate.contains_year(2021));
        assert!(!predicate.contains_year(2022));
    }

    #[test]
    fn categories_resolve_into_both_vocabularies() {
        let predicate = build_predicate(
            ymd(2021, 1, 1),
            ymd(2021, 12, 1),
            &["TWO WHEELER(T)", "LMV"],
            Some("  "),
        )
        .unwrap();
        let labels = predicate.category_labels().unwrap();
        assert!(labels.contains("TWO WHEELER(T)"));
        assert!(labels.contains("LIGHT MOTOR VEHICLE"));
        let codes = predicate.category_codes().unwrap();
        assert!(codes.contains("2WT"));
        assert!(codes.contains("LMV"));
        assert_eq!(predicate.maker, None);
    }

    #[test]
    fn label_never_matches_manufacturer_rows_literally() {
        let predicate =
            build_predicate(ymd(2022, 1, 1), ymd(2022, 12, 1), &["TWO WHEELER(T)"], None)
                .unwrap();
        assert!(predicate.matches(&maker_row("Acme", "2WT", 2022, 1)));
        assert!(!predicate.matches(&maker_row("Acme", "TWO WHEELER(T)", 2022, 1)));
    }

    #[test]
    fn reconcile_selection_transitions() {
        let options = vec!["Acme".to_string(), "Bolt".to_string()];
        assert_eq!(reconcile_selection(None, &options), (None, false));
        assert_eq!(
            reconcile_selection(Some("Bolt"), &options),
            (Some("Bolt".to_string()), false)
        );
        assert_eq!(reconcile_selection(Some("Gone"), &options), (None, true));
    }

    #[test]
    fn narrowing_range_resets_stale_maker() {
        let table = vec![
            maker_row("Acme", "2WT", 2021, 40),
            maker_row("Acme", "2WT", 2022, 0),
            maker_row("Bolt", "2WT", 2022, 15),
            maker_row("Crest", "2WN", 2022, 99),
        ];
        let wide = build_predicate(ymd(2021, 1, 1), ymd(2022, 12, 1), &["TWO WHEELER(T)"], Some("Acme"))
            .unwrap();
        let options = resolve_manufacturer_options(&table, &wide).unwrap();
        assert_eq!(options.options, vec!["Acme", "Bolt"]);
        assert_eq!(options.selection.as_deref(), Some("Acme"));
        assert!(!options.reset);

        let narrow = build_predicate(ymd(2022, 1, 1), ymd(2022, 12, 1), &["TWO WHEELER(T)"], Some("Acme"))
            .unwrap();
        let options = resolve_manufacturer_options(&table, &narrow).unwrap();
        assert_eq!(options.options, vec!["Bolt"]);
        assert_eq!(options.selection, None);
        assert!(options.reset);
    }
}
