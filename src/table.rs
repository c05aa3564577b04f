//! Plain-text tables for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Placeholder for a growth value with no defined baseline.
pub const UNDEFINED: &str = "n/a";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders rows under headers. Columns whose cells are all numeric are
/// right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    let mut aligns = vec![Align::Right; column_count];

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
            if !is_numeric_cell(cell) {
                aligns[idx] = Align::Left;
            }
        }
    }
    if rows.is_empty() {
        aligns.fill(Align::Left);
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &aligns));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, &aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Prints a titled table, or a note when there is nothing to show.
pub fn print_section(title: &str, headers: &[&str], rows: &[Vec<String>]) {
    println!("{title}");
    if rows.is_empty() {
        println!("(no rows)");
    } else {
        let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        print_table(&headers, rows);
    }
    println!();
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(pct) if pct.is_finite() => format!("{pct:.2}"),
        _ => UNDEFINED.to_string(),
    }
}

fn is_numeric_cell(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed == UNDEFINED || (!trimmed.is_empty() && trimmed.parse::<f64>().is_ok())
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate().take(widths.len()) {
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(widths[idx].saturating_sub(display_width(&sanitized)));
        let cell = match aligns.get(idx) {
            Some(Align::Right) => format!("{padding}{sanitized}"),
            _ => format!("{sanitized}{padding}"),
        };
        cells.push(cell);
    }
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
