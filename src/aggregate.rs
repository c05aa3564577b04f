//! Grouped sums and rankings over registration tables.
//!
//! [`aggregate`] filters a table with a [`RowFilter`], sums registrations per
//! distinct group-by tuple and optionally ranks the groups. Groups are built
//! in key order, so an unranked result is sorted by key and a ranked result
//! breaks ties by key.

use std::{collections::BTreeMap, fmt};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::{
    data::{DimensionValue, quarter_start},
    error::{EngineError, EngineResult},
    filter::RowFilter,
    schema::{CategoryRecord, ManufacturerRecord, YearlyCategoryRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Category,
    Maker,
    Year,
    /// Quarter, labelled by its first calendar day.
    Quarter,
    /// Month, labelled by its first calendar day.
    Month,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Category => "category",
            Field::Maker => "maker",
            Field::Year => "year",
            Field::Quarter => "quarter",
            Field::Month => "month",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table row that can be grouped and summed.
pub trait Dimensioned {
    const TABLE: &'static str;

    fn fields() -> &'static [Field];

    /// Value of `field`, or `None` when the table has no such field.
    fn dimension(&self, field: Field) -> Option<DimensionValue>;

    fn registrations(&self) -> u64;
}

impl Dimensioned for CategoryRecord {
    const TABLE: &'static str = "category monthly";

    fn fields() -> &'static [Field] {
        &[Field::Category, Field::Year, Field::Quarter, Field::Month]
    }

    fn dimension(&self, field: Field) -> Option<DimensionValue> {
        match field {
            Field::Category => Some(DimensionValue::Text(self.category.clone())),
            Field::Year => Some(DimensionValue::Year(self.date.year())),
            Field::Quarter => Some(DimensionValue::Date(quarter_start(self.date))),
            Field::Month => Some(DimensionValue::Date(self.date)),
            Field::Maker => None,
        }
    }

    fn registrations(&self) -> u64 {
        self.registrations
    }
}

impl Dimensioned for YearlyCategoryRecord {
    const TABLE: &'static str = "category yearly";

    fn fields() -> &'static [Field] {
        &[Field::Category, Field::Year]
    }

    fn dimension(&self, field: Field) -> Option<DimensionValue> {
        match field {
            Field::Category => Some(DimensionValue::Text(self.category.clone())),
            Field::Year => Some(DimensionValue::Year(self.year)),
            _ => None,
        }
    }

    fn registrations(&self) -> u64 {
        self.registrations
    }
}

impl Dimensioned for ManufacturerRecord {
    const TABLE: &'static str = "manufacturer";

    fn fields() -> &'static [Field] {
        &[Field::Maker, Field::Category, Field::Year]
    }

    fn dimension(&self, field: Field) -> Option<DimensionValue> {
        match field {
            Field::Maker => Some(DimensionValue::Text(self.maker.clone())),
            Field::Category => Some(DimensionValue::Text(self.category_code.clone())),
            Field::Year => Some(DimensionValue::Year(self.year)),
            _ => None,
        }
    }

    fn registrations(&self) -> u64 {
        self.registrations
    }
}

impl<T: Dimensioned> Dimensioned for &T {
    const TABLE: &'static str = T::TABLE;

    fn fields() -> &'static [Field] {
        T::fields()
    }

    fn dimension(&self, field: Field) -> Option<DimensionValue> {
        (**self).dimension(field)
    }

    fn registrations(&self) -> u64 {
        (**self).registrations()
    }
}

/// Shape of one aggregation: grouping fields, ranking and truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub group_by: Vec<Field>,
    pub ranked: bool,
    pub top_n: Option<usize>,
}

impl Aggregation {
    pub fn by(fields: &[Field]) -> Self {
        Self {
            group_by: fields.to_vec(),
            ranked: false,
            top_n: None,
        }
    }

    /// Sort groups by registrations, highest first.
    pub fn ranked(mut self) -> Self {
        self.ranked = true;
        self
    }

    pub fn top(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    /// One value per group-by field, in group-by order.
    pub key: Vec<DimensionValue>,
    pub registrations: u64,
}

fn validate_fields<T: Dimensioned>(group_by: &[Field]) -> EngineResult<()> {
    match group_by.iter().find(|f| !T::fields().contains(f)) {
        Some(field) => Err(EngineError::UnknownField {
            field: field.to_string(),
            table: T::TABLE,
        }),
        None => Ok(()),
    }
}

/// Filters `rows`, sums registrations per group and ranks if requested.
///
/// Groups with no matching rows are absent from the output; a group whose
/// matching rows sum to zero is kept.
pub fn aggregate<T, P>(rows: &[T], predicate: &P, spec: &Aggregation) -> EngineResult<Vec<AggregateRow>>
where
    T: Dimensioned,
    P: RowFilter<T> + ?Sized,
{
    validate_fields::<T>(&spec.group_by)?;
    let mut groups: BTreeMap<Vec<DimensionValue>, u64> = BTreeMap::new();
    for row in rows.iter().filter(|row| predicate.matches(*row)) {
        let key = spec
            .group_by
            .iter()
            .map(|field| {
                row.dimension(*field).ok_or_else(|| EngineError::UnknownField {
                    field: field.to_string(),
                    table: T::TABLE,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let total = groups.entry(key).or_insert(0);
        *total = total.saturating_add(row.registrations());
    }

    let mut output = groups
        .into_iter()
        .map(|(key, registrations)| AggregateRow { key, registrations })
        .collect::<Vec<_>>();
    if spec.ranked {
        // stable: equal totals keep key order
        output.sort_by(|a, b| b.registrations.cmp(&a.registrations));
    }
    if let Some(limit) = spec.top_n {
        output.truncate(limit);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AllRows;
    use chrono::NaiveDate;

    fn month(y: i32, m: u32, registrations: u64) -> CategoryRecord {
        CategoryRecord {
            date: NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
            category: "LMV".to_string(),
            registrations,
        }
    }

    #[test]
    fn quarter_rollup_labels_by_first_day_and_keeps_zero_quarters() {
        let rows = vec![month(2021, 1, 1), month(2021, 2, 2), month(2021, 4, 0)];
        let out = aggregate(&rows, &AllRows, &Aggregation::by(&[Field::Quarter])).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].key,
            vec![DimensionValue::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())]
        );
        assert_eq!(out[0].registrations, 3);
        assert_eq!(out[1].registrations, 0);
    }

    #[test]
    fn unknown_field_for_table_is_rejected() {
        let rows = vec![month(2021, 1, 1)];
        let err = aggregate(&rows, &AllRows, &Aggregation::by(&[Field::Maker])).unwrap_err();
        assert_eq!(
            err,
            EngineError::UnknownField {
                field: "maker".to_string(),
                table: "category monthly"
            }
        );
    }

    #[test]
    fn ranking_ties_keep_key_order() {
        let rows = vec![
            ManufacturerRecord {
                maker: "Zeta".into(),
                category_code: "LMV".into(),
                year: 2022,
                registrations: 5,
            },
            ManufacturerRecord {
                maker: "Alpha".into(),
                category_code: "LMV".into(),
                year: 2022,
                registrations: 5,
            },
            ManufacturerRecord {
                maker: "Mid".into(),
                category_code: "LMV".into(),
                year: 2022,
                registrations: 9,
            },
        ];
        let spec = Aggregation::by(&[Field::Maker]).ranked().top(2);
        let out = aggregate(&rows, &AllRows, &spec).unwrap();
        let makers = out.iter().map(|r| r.key[0].to_string()).collect::<Vec<_>>();
        assert_eq!(makers, vec!["Mid", "Alpha"]);
    }
}
