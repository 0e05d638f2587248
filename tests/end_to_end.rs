mod common;

use common::{age_driven_records, write_csv};
use medcharge::config::PipelineConfig;
use medcharge::cv::Folds;
use medcharge::data::{Dataset, load_dataset};
use medcharge::encode::{EncoderConfig, EncodingSchema};
use medcharge::evaluate::evaluate;
use medcharge::model::ModelFamily;
use medcharge::penalized::{LambdaGrid, PathConfig, cross_validate, fit_penalized};
use medcharge::pipeline::run_pipeline;
use medcharge::report::{FamilyDetails, FamilyOutcome, INTERCEPT_TERM, Report};
use medcharge::split::split_dataset;
use tempfile::tempdir;

#[test]
fn ridge_lambda_min_beats_heavier_penalty_on_test_rows() {
    let dataset = Dataset::new(age_driven_records(100, 7));
    let split = split_dataset(&dataset, 0.7, 311).unwrap();
    assert_eq!(split.train_idx.len(), 70);

    let train_records = dataset.select(&split.train_idx);
    let schema = EncodingSchema::fit(&train_records, &EncoderConfig::default()).unwrap();
    let train = schema.encode(&train_records).unwrap();
    let test = schema.encode(&dataset.select(&split.test_idx)).unwrap();

    let config = PathConfig {
        grid: LambdaGrid::Explicit {
            values: vec![10.0, 1.0, 0.1, 0.01],
        },
        ..PathConfig::default()
    };
    let folds = Folds::new(train.n_rows(), 10, 311).unwrap();
    let path = cross_validate(&train, 0.0, &config, &folds).unwrap();
    assert_eq!(path.curve.lambdas, vec![10.0, 1.0, 0.1, 0.01]);
    assert!(path.curve.lambdas.contains(&path.curve.lambda_min));

    let heavy = fit_penalized(&train, 100.0 * path.curve.lambda_min, 0.0, &config).unwrap();
    let selected_rmse = evaluate(&path.fit_min.model, &test).unwrap().rmse_charges;
    let heavy_rmse = evaluate(&heavy.model, &test).unwrap().rmse_charges;
    assert!(
        selected_rmse < heavy_rmse,
        "lambda_min test RMSE {selected_rmse} should beat {heavy_rmse}"
    );
}

#[test]
fn report_from_csv_survives_save_and_load() {
    let dir = tempdir().unwrap();
    let csv_path = write_csv(dir.path(), "charges.csv", &age_driven_records(150, 19));
    let dataset = load_dataset(csv_path.to_str().unwrap()).unwrap();
    assert_eq!(dataset.len(), 150);

    let report = run_pipeline(&dataset, &PipelineConfig::default()).unwrap();
    assert_eq!(report.split.n_train, 105);
    assert_eq!(report.split.n_test, 45);

    match &report.families[ModelFamily::BestSubset.name()] {
        FamilyOutcome::Fitted(fitted) => match &fitted.details {
            FamilyDetails::Subset { candidates, .. } => {
                assert_eq!(candidates[0].predictors, vec!["age".to_string()]);
            }
            other => panic!("unexpected subset details: {other:?}"),
        },
        other => panic!("best subset failed: {other:?}"),
    }

    let report_path = dir.path().join("report.toml");
    report.save(report_path.to_str().unwrap()).unwrap();
    let loaded = Report::load(report_path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.config, report.config);
    assert_eq!(loaded.schema, report.schema);
    assert_eq!(loaded.split, report.split);
    for family in ModelFamily::ALL {
        assert!(report.fit(family).is_some(), "{} did not fit", family.name());
        assert_eq!(loaded.fit(family), report.fit(family));
    }

    let tsv_path = dir.path().join("coefficients.tsv");
    report
        .write_coefficients_tsv(tsv_path.to_str().unwrap())
        .unwrap();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(&tsv_path)
        .unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, vec!["model", "term", "estimate"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 4 * (report.schema.n_columns() + 1));
    let intercepts = rows.iter().filter(|r| &r[1] == INTERCEPT_TERM).count();
    assert_eq!(intercepts, 4);
    assert!(rows.iter().all(|r| r[2].parse::<f64>().is_ok()));
}
