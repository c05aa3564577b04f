use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use registration_trends::{
    aggregate::{Aggregation, Field, aggregate},
    filter::build_predicate,
    query::{Dataset, Selection},
    schema::{CategoryRecord, ManufacturerRecord},
};

const CATEGORIES: [&str; 4] = [
    "LIGHT MOTOR VEHICLE",
    "HEAVY MOTOR VEHICLE",
    "TWO WHEELER(T)",
    "THREE WHEELER(T)",
];
const CODES: [&str; 4] = ["LMV", "HMV", "2WT", "3WT"];

fn synthetic_dataset(makers: usize) -> Dataset {
    let mut monthly = Vec::new();
    for year in 2015..=2024 {
        for month in 1..=12 {
            let date = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
            for (idx, category) in CATEGORIES.iter().enumerate() {
                monthly.push(CategoryRecord {
                    date,
                    category: category.to_string(),
                    registrations: (year as u64 * 31 + month as u64 * 7 + idx as u64) % 5_000,
                });
            }
        }
    }
    let mut manufacturers = Vec::new();
    for maker in 0..makers {
        for year in 2015..=2024 {
            manufacturers.push(ManufacturerRecord {
                maker: format!("Maker {maker:04}"),
                category_code: CODES[maker % CODES.len()].to_string(),
                year,
                registrations: ((maker * 131 + year as usize * 17) % 10_000) as u64,
            });
        }
    }
    Dataset::new(monthly, Vec::new(), manufacturers)
}

fn bench_aggregate_rank(c: &mut Criterion) {
    let dataset = synthetic_dataset(2_000);
    let start = NaiveDate::from_ymd_opt(2018, 1, 1).expect("start");
    let end = NaiveDate::from_ymd_opt(2024, 12, 1).expect("end");
    let predicate = build_predicate(start, end, &["2WT", "LMV"], None).expect("predicate");
    let ranking = Aggregation::by(&[Field::Maker]).ranked().top(10);

    let mut group = c.benchmark_group("aggregate_rank");
    group.bench_function("top_makers", |b| {
        b.iter(|| aggregate(dataset.manufacturers(), &predicate, &ranking).expect("rank"));
    });
    group.bench_function("full_query", |b| {
        let selection = Selection {
            categories: vec!["TWO WHEELER(T)".to_string()],
            ..Selection::default()
        };
        b.iter(|| dataset.query(&selection).expect("query"));
    });
    group.finish();
}

criterion_group!(benches, bench_aggregate_rank);
criterion_main!(benches);
