//! Category label and code reconciliation.
//!
//! Category datasets name segments with long canonical labels such as
//! `TWO WHEELER(T)`, while manufacturer datasets use short codes such as
//! `2WT`. [`CATEGORY_CODES`] is the fixed bridge between the two. Lookups are
//! exact after trimming; a value with no counterpart is passed through
//! unchanged so drifting vocabularies never lose data.

use std::borrow::Cow;

use log::debug;

/// Canonical label to short code, grouped by wheel count.
pub const CATEGORY_CODES: [(&str, &str); 10] = [
    // four-wheelers
    ("FOUR WHEELER (INVALID CARRIAGE)", "4WIC"),
    ("HEAVY MOTOR VEHICLE", "HMV"),
    ("LIGHT MOTOR VEHICLE", "LMV"),
    ("MEDIUM MOTOR VEHICLE", "MMV"),
    // three-wheelers
    ("THREE WHEELER (INVALID CARRIAGE)", "3WIC"),
    ("THREE WHEELER(NT)", "3WN"),
    ("THREE WHEELER(T)", "3WT"),
    // two-wheelers
    ("TWO WHEELER (INVALID CARRIAGE)", "2WIC"),
    ("TWO WHEELER(NT)", "2WN"),
    ("TWO WHEELER(T)", "2WT"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LabelToCode,
    CodeToLabel,
}

pub fn code_for_label(label: &str) -> Option<&'static str> {
    let label = label.trim();
    CATEGORY_CODES
        .iter()
        .find(|(candidate, _)| *candidate == label)
        .map(|(_, code)| *code)
}

pub fn label_for_code(code: &str) -> Option<&'static str> {
    let code = code.trim();
    CATEGORY_CODES
        .iter()
        .find(|(_, candidate)| *candidate == code)
        .map(|(label, _)| *label)
}

pub fn is_known_code(value: &str) -> bool {
    label_for_code(value).is_some()
}

pub fn is_known_label(value: &str) -> bool {
    code_for_label(value).is_some()
}

/// Maps one value in `direction`, falling back to the trimmed input.
pub fn translate(value: &str, direction: Direction) -> Cow<'_, str> {
    let trimmed = value.trim();
    let mapped = match direction {
        Direction::LabelToCode => code_for_label(trimmed),
        Direction::CodeToLabel => label_for_code(trimmed),
    };
    match mapped {
        Some(found) => Cow::Borrowed(found),
        None => Cow::Borrowed(trimmed),
    }
}

/// Resolves a category selection into the vocabulary selected by `direction`.
///
/// An empty selection means "no filter" and yields `None`. Values without a
/// mapping are kept literally.
pub fn resolve<S: AsRef<str>>(values: &[S], direction: Direction) -> Option<Vec<String>> {
    let resolved = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .map(|v| {
            let already_target = match direction {
                Direction::LabelToCode => is_known_code(v),
                Direction::CodeToLabel => is_known_label(v),
            };
            let mapped = translate(v, direction);
            if mapped == v && !already_target {
                debug!("Category '{v}' has no mapping; using it literally");
            }
            mapped.into_owned()
        })
        .collect::<Vec<_>>();
    if resolved.is_empty() {
        None
    } else {
        Some(resolved)
    }
}

/// Puts a manufacturer-side category value into code space.
///
/// Returns the code and whether the value was recognised. A canonical label
/// found in manufacturer data is converted to its code.
pub fn canonical_code(value: &str) -> (Cow<'_, str>, bool) {
    let trimmed = value.trim();
    if is_known_code(trimmed) {
        return (Cow::Borrowed(trimmed), true);
    }
    if let Some(code) = code_for_label(trimmed) {
        return (Cow::Borrowed(code), true);
    }
    (Cow::Borrowed(trimmed), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn map_is_bijective() {
        for (label, code) in CATEGORY_CODES {
            assert_eq!(code_for_label(label), Some(code));
            assert_eq!(label_for_code(code), Some(label));
        }
        let mut codes = CATEGORY_CODES.iter().map(|(_, c)| *c).collect::<Vec<_>>();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), CATEGORY_CODES.len());
    }

    #[test]
    fn resolve_maps_labels_and_passes_codes_through() {
        let resolved = resolve(&["TWO WHEELER(T)", "LMV", "SOMETHING NEW"], Direction::LabelToCode)
            .expect("selection");
        assert_eq!(resolved, vec!["2WT", "LMV", "SOMETHING NEW"]);
    }

    #[test]
    fn empty_selection_is_no_filter() {
        let empty: [&str; 0] = [];
        assert_eq!(resolve(&empty, Direction::LabelToCode), None);
        assert_eq!(resolve(&["  "], Direction::CodeToLabel), None);
    }

    #[test]
    fn canonical_code_converts_labels_in_manufacturer_data() {
        assert_eq!(canonical_code(" 2WN ").0, "2WN");
        assert_eq!(canonical_code("LIGHT MOTOR VEHICLE"), (Cow::Borrowed("LMV"), true));
        assert_eq!(canonical_code("E-RICKSHAW"), (Cow::Borrowed("E-RICKSHAW"), false));
    }

    proptest! {
        #[test]
        fn label_round_trip_restores_label(idx in 0usize..CATEGORY_CODES.len()) {
            let (label, _) = CATEGORY_CODES[idx];
            let code = translate(label, Direction::LabelToCode).into_owned();
            prop_assert_eq!(translate(&code, Direction::CodeToLabel), label);
        }

        #[test]
        fn known_codes_are_fixed_points(idx in 0usize..CATEGORY_CODES.len()) {
            let (_, code) = CATEGORY_CODES[idx];
            prop_assert_eq!(translate(code, Direction::LabelToCode), code);
        }

        #[test]
        fn unknown_values_pass_through(value in "[a-z]{1,12}") {
            prop_assert_eq!(translate(&value, Direction::LabelToCode), value.as_str());
            prop_assert_eq!(translate(&value, Direction::CodeToLabel), value.as_str());
        }
    }
}
