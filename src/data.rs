use std::{fmt, sync::OnceLock};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use heck::ToSnakeCase;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single grouping coordinate produced by the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Text(String),
    Year(i32),
    Date(NaiveDate),
}

impl DimensionValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DimensionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_year(&self) -> Option<i32> {
        match self {
            DimensionValue::Year(y) => Some(*y),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            DimensionValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionValue::Text(s) => write!(f, "{s}"),
            DimensionValue::Year(y) => write!(f, "{y}"),
            DimensionValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Why a registrations cell could not be taken literally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountIssue {
    Empty,
    Invalid,
    Negative,
}

impl CountIssue {
    pub fn describe(&self) -> &'static str {
        match self {
            CountIssue::Empty => "empty registrations cell",
            CountIssue::Invalid => "unparseable registrations cell",
            CountIssue::Negative => "negative registrations cell",
        }
    }
}

/// Header key used for alias matching: trimmed and snake_cased, so
/// `Maker Name`, `MakerName` and `maker_name` compare equal.
pub fn canonical_header(name: &str) -> String {
    name.trim().to_snake_case()
}

pub fn parse_count(raw: &str) -> Result<u64, CountIssue> {
    let cleaned = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .collect::<String>();
    if cleaned.is_empty() {
        return Err(CountIssue::Empty);
    }
    if let Ok(value) = cleaned.parse::<u64>() {
        return Ok(value);
    }
    if let Ok(value) = cleaned.parse::<i64>() {
        return u64::try_from(value).map_err(|_| CountIssue::Negative);
    }
    // Spreadsheet exports often write whole numbers as `12.0`.
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => {
            if value < 0.0 {
                Err(CountIssue::Negative)
            } else if value >= u64::MAX as f64 {
                // 2^64 and above cannot be represented
                Err(CountIssue::Invalid)
            } else {
                Ok(value as u64)
            }
        }
        _ => Err(CountIssue::Invalid),
    }
}

pub fn parse_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    let year = match trimmed.parse::<i32>() {
        Ok(year) => year,
        Err(_) => {
            let value = trimmed.parse::<f64>().ok()?;
            if !value.is_finite() || value.fract() != 0.0 {
                return None;
            }
            value as i32
        }
    };
    (year > 0 && NaiveDate::from_ymd_opt(year, 1, 1).is_some()).then_some(year)
}

pub fn parse_month_number(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if let Some(year) = parse_year(trimmed) {
        return u32::try_from(year).ok().filter(|m| (1..=12).contains(m));
    }
    month_from_name(trimmed)
}

fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lowered = name.trim().to_ascii_lowercase();
    if lowered.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|full| full.starts_with(&lowered))
        .map(|idx| idx as u32 + 1)
}

fn month_year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z]{3,9})\.?[\s\-_/,']*(\d{2}|\d{4})$").expect("valid month pattern")
    })
}

fn year_month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})[\s\-_/,]*([A-Za-z]{3,9})$").expect("valid month pattern")
    })
}

/// Parses a date or a month label and returns the first day of that month.
///
/// Accepts ISO dates (with or without a time part), slash-separated dates,
/// `YYYY-MM`, and month-name labels such as `Jan-2021`, `Jan 21`,
/// `January 2021` or `2021 Jan`. Two-digit years are read as 20xx.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Some(first_of_month(parsed));
        }
    }
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(first_of_month(parsed.date()));
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
        return Some(parsed);
    }

    let (month, year) = if let Some(caps) = month_year_pattern().captures(value) {
        (month_from_name(&caps[1])?, caps[2].to_string())
    } else if let Some(caps) = year_month_pattern().captures(value) {
        (month_from_name(&caps[2])?, caps[1].to_string())
    } else {
        return None;
    };
    let year = if year.len() == 2 {
        format!("20{year}")
    } else {
        year
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, 1)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month0() / 3) + 1
}

/// First calendar day of the quarter containing `date`.
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = (quarter_of(date) - 1) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn canonical_header_folds_spacing_and_case() {
        assert_eq!(canonical_header("Maker Name"), "maker_name");
        assert_eq!(canonical_header("MakerName"), "maker_name");
        assert_eq!(canonical_header(" Maker "), "maker");
        assert_eq!(canonical_header("MonthRaw"), "month_raw");
    }

    #[test]
    fn parse_count_coerces_spreadsheet_numbers() {
        assert_eq!(parse_count("1,234"), Ok(1234));
        assert_eq!(parse_count(" 42 "), Ok(42));
        assert_eq!(parse_count("12.0"), Ok(12));
        assert_eq!(parse_count(""), Err(CountIssue::Empty));
        assert_eq!(parse_count("n/a"), Err(CountIssue::Invalid));
        assert_eq!(parse_count("12.5"), Err(CountIssue::Invalid));
        assert_eq!(parse_count("-3"), Err(CountIssue::Negative));
    }

    #[test]
    fn parse_count_rejects_values_beyond_u64() {
        assert_eq!(parse_count("18446744073709551615"), Ok(u64::MAX));
        assert_eq!(parse_count("20000000000000000000"), Err(CountIssue::Invalid));
        assert_eq!(parse_count("2.0e19"), Err(CountIssue::Invalid));
        assert_eq!(parse_count("1e300"), Err(CountIssue::Invalid));
    }

    #[test]
    fn parse_month_handles_labels_and_dates() {
        assert_eq!(parse_month("Jan-2021"), Some(ymd(2021, 1, 1)));
        assert_eq!(parse_month("Feb 2021"), Some(ymd(2021, 2, 1)));
        assert_eq!(parse_month("Mar-21"), Some(ymd(2021, 3, 1)));
        assert_eq!(parse_month("September 2022"), Some(ymd(2022, 9, 1)));
        assert_eq!(parse_month("2021 Dec"), Some(ymd(2021, 12, 1)));
        assert_eq!(parse_month("2021-04-15"), Some(ymd(2021, 4, 1)));
        assert_eq!(parse_month("2021-05"), Some(ymd(2021, 5, 1)));
        assert_eq!(parse_month("2021-06-01 00:00:00"), Some(ymd(2021, 6, 1)));
    }

    #[test]
    fn parse_month_rejects_garbage_instead_of_placeholder() {
        assert_eq!(parse_month("Total"), None);
        assert_eq!(parse_month("S.No"), None);
        assert_eq!(parse_month("Foo-2021"), None);
        assert_eq!(parse_month(""), None);
    }

    #[test]
    fn parse_year_accepts_float_exports() {
        assert_eq!(parse_year("2021"), Some(2021));
        assert_eq!(parse_year("2021.0"), Some(2021));
        assert_eq!(parse_year("20.5"), None);
        assert_eq!(parse_year("abc"), None);
        assert_eq!(parse_year("0"), None);
    }

    #[test]
    fn month_numbers_from_digits_or_names() {
        assert_eq!(parse_month_number("3"), Some(3));
        assert_eq!(parse_month_number("Sep"), Some(9));
        assert_eq!(parse_month_number("13"), None);
        assert_eq!(parse_month_number("ju"), None);
    }

    #[test]
    fn quarters_start_on_first_calendar_day() {
        assert_eq!(quarter_of(ymd(2021, 1, 1)), 1);
        assert_eq!(quarter_of(ymd(2021, 6, 1)), 2);
        assert_eq!(quarter_start(ymd(2021, 8, 1)), ymd(2021, 7, 1));
        assert_eq!(quarter_start(ymd(2021, 12, 1)), ymd(2021, 10, 1));
    }

    #[test]
    fn dimension_values_order_within_variant() {
        let mut values = vec![
            DimensionValue::Text("b".into()),
            DimensionValue::Text("a".into()),
        ];
        values.sort();
        assert_eq!(values[0].as_text(), Some("a"));
        assert_eq!(DimensionValue::Year(2021).to_string(), "2021");
    }
}
