//! Grouped period-over-period percentage change.
//!
//! Growth is computed in two passes: positions are first ordered by
//! (group, time), then each group's slice is walked on its own, comparing
//! every value with the one `period` steps earlier in the same group. The
//! result is written back in input order, so callers never depend on the
//! input already being sorted.

use itertools::Itertools;

use crate::error::{EngineError, EngineResult};

/// Year over year on monthly data.
pub const MONTHLY_YOY: usize = 12;
/// Quarter over quarter expressed on monthly data.
pub const MONTHLY_QOQ: usize = 3;
/// Year over year on yearly data, or quarter over quarter on quarterly data.
pub const SEQUENTIAL: usize = 1;

fn ensure_period(period: usize) -> EngineResult<()> {
    if period == 0 {
        return Err(EngineError::Query(
            "percent change period must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn change(current: f64, prior: f64) -> Option<f64> {
    if prior == 0.0 {
        None
    } else {
        Some((current - prior) / prior * 100.0)
    }
}

/// Percent change over one already-ordered sequence.
///
/// Positions with fewer than `period` predecessors, or whose predecessor is
/// zero, are `None`.
pub fn percent_change(values: &[f64], period: usize) -> EngineResult<Vec<Option<f64>>> {
    ensure_period(period)?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(idx, current)| {
            idx.checked_sub(period)
                .and_then(|prior| change(*current, values[prior]))
        })
        .collect())
}

/// Percent change computed independently within each group, ordered by `time`.
///
/// The returned vector is aligned index-for-index with `items`.
pub fn grouped_percent_change<T, G, K, FG, FK, FV>(
    items: &[T],
    group: FG,
    time: FK,
    value: FV,
    period: usize,
) -> EngineResult<Vec<Option<f64>>>
where
    G: Ord,
    K: Ord,
    FG: Fn(&T) -> G,
    FK: Fn(&T) -> K,
    FV: Fn(&T) -> f64,
{
    ensure_period(period)?;
    let mut order = (0..items.len()).collect::<Vec<_>>();
    order.sort_by(|a, b| {
        group(&items[*a])
            .cmp(&group(&items[*b]))
            .then_with(|| time(&items[*a]).cmp(&time(&items[*b])))
    });

    let mut output = vec![None; items.len()];
    for (_, members) in &order.into_iter().chunk_by(|idx| group(&items[*idx])) {
        let members = members.collect::<Vec<_>>();
        let values = members
            .iter()
            .map(|idx| value(&items[*idx]))
            .collect::<Vec<_>>();
        for (idx, pct) in members.into_iter().zip(percent_change(&values, period)?) {
            output[idx] = pct;
        }
    }
    Ok(output)
}
