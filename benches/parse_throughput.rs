use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use vintage_parse::{
    Catalog, ContractRegistry, LayoutRegistry, ParseMetadata, Parser, ParserConfig, Router,
    SchemaContract,
};

const ROUTES: &str = r#"
routes:
  - pattern: '^pprrvu\d{2}_[a-z]{3}\.txt$'
    dataset_id: pprrvu
    schema_id: pprrvu_v1
    format: fixed_width
  - pattern: '^gpci\d{4}\.csv$'
    dataset_id: gpci
    schema_id: gpci_v1
    format: csv
"#;

const PPRRVU: &str = r#"
dataset_id: pprrvu
version: 1.0.0
natural_keys: [hcpcs, modifier]
columns:
  - {name: hcpcs, type: string, nullable: false}
  - {name: modifier, type: string}
  - {name: status_code, type: category, domain: [A, I, R, T]}
  - {name: work_rvu, type: decimal, precision: 2, min: 0}
  - {name: effective_date, type: date, format: "%Y%m%d"}
"#;

const GPCI: &str = r#"
dataset_id: gpci
version: 1.0.0
natural_keys: [locality_id]
columns:
  - {name: mac, type: string, nullable: false}
  - {name: locality_id, type: string, nullable: false}
  - {name: work_gpci, type: decimal, precision: 3, nullable: false}
  - {name: pe_gpci, type: decimal, precision: 3}
"#;

const LAYOUTS: &str = r#"
layouts:
  - dataset: pprrvu
    year: 2025
    quarter: Q1
    version: 1.0.0
    min_line_length: 20
    columns:
      - {name: hcpcs, start: 0, end: 5, nullable: false}
      - {name: modifier, start: 5, end: 7}
      - {name: status_code, start: 7, end: 8, type: category}
      - {name: work_rvu, start: 8, end: 15, type: decimal}
      - {name: effective_date, start: 15, end: 23, type: date}
"#;

const ROWS: usize = 20_000;

fn catalog(chunk_rows: Option<usize>) -> Catalog {
    let contracts = [PPRRVU, GPCI]
        .iter()
        .map(|raw| SchemaContract::from_yaml_str(raw).expect("contract"))
        .collect();
    Catalog::new(
        Router::from_yaml_str(ROUTES).expect("routes"),
        ContractRegistry::new(contracts).expect("contracts"),
        LayoutRegistry::from_yaml_str(LAYOUTS).expect("layouts"),
        ParserConfig {
            chunk_rows,
            ..ParserConfig::default()
        },
    )
    .expect("catalog")
}

fn fixed_width_source(rows: usize) -> String {
    let statuses = ["A", "I", "R", "T"];
    let mut text = String::from("HCPCS MOD STATUS WORK_RVU EFFECTIVE_DATE\n");
    for idx in 0..rows {
        let rvu = format!("{}.{:02}", idx % 9, idx % 100);
        text.push_str(&format!(
            "{:05}{:<2}{}{:>7}20250101\n",
            idx,
            if idx % 2 == 0 { "26" } else { "" },
            statuses[idx % 4],
            rvu
        ));
    }
    text
}

fn csv_source(rows: usize) -> String {
    let mut text = String::from("MAC,Locality ID,Work GPCI,PE GPCI\n");
    for idx in 0..rows {
        text.push_str(&format!(
            "{:05},{idx:06},1.{:03},0.{:03}\n",
            10000 + idx % 50,
            idx % 1000,
            (idx * 7) % 1000
        ));
    }
    text
}

fn bench_parse(c: &mut Criterion) {
    let metadata = ParseMetadata::new("2025-Q1", 2025, Some("Q1"));
    let fixed = fixed_width_source(ROWS);
    let csv = csv_source(ROWS);
    let whole = catalog(None);
    let chunked = catalog(Some(2_048));

    let mut group = c.benchmark_group("parse");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));

    group.bench_function("fixed_width", |b| {
        let parser = Parser::new(&whole);
        b.iter(|| {
            parser
                .parse(fixed.as_bytes(), "PPRRVU25_JAN.txt", &metadata)
                .expect("parse fixed width")
        })
    });
    group.bench_function("fixed_width_chunked", |b| {
        let parser = Parser::new(&chunked);
        b.iter(|| {
            parser
                .parse(fixed.as_bytes(), "PPRRVU25_JAN.txt", &metadata)
                .expect("parse fixed width")
        })
    });
    group.bench_function("csv", |b| {
        let parser = Parser::new(&whole);
        b.iter(|| {
            parser
                .parse(csv.as_bytes(), "GPCI2025.csv", &metadata)
                .expect("parse csv")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
