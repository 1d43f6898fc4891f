use std::sync::Arc;

use sheet_drain::ingestion::{PipelineEvent, PipelineObserver};
use sheet_drain::output::ArtifactWriter;
use sheet_drain::types::{Sheet, Value, Workbook};

struct Silent;

impl PipelineObserver for Silent {
    fn on_event(&self, _event: &PipelineEvent) {}
}

fn quarterly_workbook() -> Workbook {
    Workbook::new(
        "input/Q1.xlsx",
        vec![
            Sheet::new(
                "Summary",
                vec![
                    vec![Value::Utf8("region".into()), Value::Utf8("total".into())],
                    vec![Value::Utf8("north".into()), Value::Float64(1500.0)],
                    vec![Value::Utf8("south".into()), Value::Float64(812.25)],
                ],
            ),
            Sheet::new(
                "Detail/2024",
                vec![
                    vec![Value::Utf8("month".into()), Value::Utf8("note".into()), Value::Utf8("flag".into())],
                    vec![Value::Utf8("jan".into()), Value::Utf8("said \"hi\"\tthen left".into()), Value::Bool(true)],
                    vec![Value::Utf8("feb".into()), Value::Null, Value::Bool(false)],
                ],
            ),
        ],
    )
}

fn read_back(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn each_sheet_gets_a_sanitized_artifact_that_reads_back_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path(), "csv", b'\t', Arc::new(Silent));
    let workbook = quarterly_workbook();

    let paths = writer.write_workbook("Q1", &workbook).unwrap();

    assert_eq!(
        paths,
        vec![
            dir.path().join("Q1-Summary.csv"),
            dir.path().join("Q1-Detail_2024.csv"),
        ]
    );
    for (path, sheet) in paths.iter().zip(&workbook.sheets) {
        let expected: Vec<Vec<String>> = sheet
            .rows
            .iter()
            .map(|row| row.iter().map(Value::render).collect())
            .collect();
        assert_eq!(read_back(path), expected, "sheet {}", sheet.name);
    }
}

#[test]
fn configured_extension_and_delimiter_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path(), "tsv", b';', Arc::new(Silent));
    let sheet = Sheet::new(
        "a:b",
        vec![vec![Value::Int64(1), Value::Int64(2)]],
    );

    let path = writer.write("report", &sheet).unwrap();

    assert_eq!(path, dir.path().join("report-a_b.tsv"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1;2\n");
}
