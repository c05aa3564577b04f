//! Terminal rendering of query results.

use crate::{
    filter::MakerOptions,
    query::{
        CategoryYearPoint, GrowthPoint, LoadReport, MakerTotal, MarketShare, QueryResponse,
        ShareSlice, YearPoint,
    },
    schema::NormalizeReport,
    table::{format_percent, print_section},
};

fn growth_rows(points: &[GrowthPoint]) -> Vec<Vec<String>> {
    points
        .iter()
        .map(|p| {
            vec![
                p.period.format("%Y-%m").to_string(),
                p.category.clone(),
                p.registrations.to_string(),
                format_percent(p.change_pct),
            ]
        })
        .collect()
}

fn year_rows(points: &[YearPoint]) -> Vec<Vec<String>> {
    points
        .iter()
        .map(|p| {
            vec![
                p.year.to_string(),
                p.registrations.to_string(),
                format_percent(p.yoy_pct),
            ]
        })
        .collect()
}

fn maker_rows(makers: &[MakerTotal]) -> Vec<Vec<String>> {
    makers
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            vec![
                (idx + 1).to_string(),
                m.maker.clone(),
                m.registrations.to_string(),
            ]
        })
        .collect()
}

fn share_rows(slices: &[ShareSlice]) -> Vec<Vec<String>> {
    slices
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.registrations.to_string(),
                format_percent(Some(s.share_pct)),
            ]
        })
        .collect()
}

pub fn print_query_response(response: &QueryResponse) {
    let predicate = &response.predicate;
    println!(
        "Range {} to {}",
        predicate.date_start.format("%Y-%m"),
        predicate.date_end.format("%Y-%m")
    );
    if response.maker_options.reset {
        println!("Maker selection cleared: no registrations under the current filter");
    }
    println!();

    let trend = response
        .monthly_trend
        .iter()
        .map(|p| {
            vec![
                p.date.format("%Y-%m").to_string(),
                p.category.clone(),
                p.registrations.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    print_section(
        "Monthly registrations",
        &["month", "category", "registrations"],
        &trend,
    );
    print_section(
        "Year-over-year growth (%)",
        &["month", "category", "registrations", "yoy_pct"],
        &growth_rows(&response.monthly_yoy),
    );
    print_section(
        "Quarter-over-quarter growth (%)",
        &["quarter", "category", "registrations", "qoq_pct"],
        &growth_rows(&response.quarterly_qoq),
    );
    let title = match response.maker_options.selection.as_deref() {
        Some(maker) => format!("Yearly registrations for {maker}"),
        None => "Yearly registrations, all makers".to_string(),
    };
    print_section(
        &title,
        &["year", "registrations", "yoy_pct"],
        &year_rows(&response.maker_yearly),
    );
    print_section(
        "Top manufacturers",
        &["rank", "maker", "registrations"],
        &maker_rows(&response.top_makers),
    );
}

pub fn print_maker_options(options: &MakerOptions) {
    let rows = options
        .options
        .iter()
        .map(|maker| {
            let marker = if options.selection.as_deref() == Some(maker.as_str()) {
                "*"
            } else {
                ""
            };
            vec![marker.to_string(), maker.clone()]
        })
        .collect::<Vec<_>>();
    print_section("Manufacturers", &["", "maker"], &rows);
    if options.reset {
        println!("Maker selection cleared: no registrations under the current filter");
    }
}

pub fn print_market_share(share: &MarketShare, growth: &[CategoryYearPoint]) {
    print_section(
        &format!("Category share {}", share.year),
        &["category", "registrations", "share_pct"],
        &share_rows(&share.categories),
    );
    print_section(
        &format!("Manufacturer share {}", share.year),
        &["maker", "registrations", "share_pct"],
        &share_rows(&share.makers),
    );
    let rows = growth
        .iter()
        .map(|p| {
            vec![
                p.category.clone(),
                p.year.to_string(),
                p.registrations.to_string(),
                format_percent(p.yoy_pct),
            ]
        })
        .collect::<Vec<_>>();
    print_section(
        "Category year-over-year growth (%)",
        &["category", "year", "registrations", "yoy_pct"],
        &rows,
    );
}

/// Data-quality summary written to stderr so stdout stays machine readable.
pub fn print_normalize_report(kind: &str, report: &NormalizeReport) {
    if report.is_clean() {
        eprintln!(
            "{kind}: {} row(s) kept of {} read, no issues",
            report.rows_kept, report.rows_read
        );
        return;
    }
    eprintln!(
        "{kind}: {} row(s) kept of {} read, {} issue(s)",
        report.rows_kept,
        report.rows_read,
        report.total_issues()
    );
    for (issue, count) in report.entries() {
        eprintln!("  {issue}: {count}");
    }
}

pub fn print_load_report(report: &LoadReport) {
    if report.total_issues() == 0 {
        return;
    }
    print_normalize_report("category monthly", &report.category_monthly);
    if report.category_yearly.rows_read > 0 {
        print_normalize_report("category yearly", &report.category_yearly);
    }
    print_normalize_report("manufacturer", &report.manufacturers);
}
