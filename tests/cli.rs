mod common;

use std::fs;
use std::process::Command;

use common::{age_driven_records, write_csv};
use medcharge::config::PipelineConfig;
use medcharge::model::ModelFamily;
use medcharge::report::Report;
use tempfile::tempdir;

#[test]
fn config_command_prints_loadable_defaults() {
    let output = Command::new(env!("CARGO_BIN_EXE_medcharge"))
        .arg("config")
        .output()
        .expect("run medcharge cli");
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).expect("utf8 stdout");
    let parsed: PipelineConfig = toml::from_str(&text).expect("valid toml");
    assert_eq!(parsed, PipelineConfig::default());
}

#[test]
fn report_command_writes_report_and_coefficients() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = write_csv(tmp.path(), "charges.csv", &age_driven_records(120, 3));
    let config_path = tmp.path().join("quick.toml");
    fs::write(
        &config_path,
        "elastic_net_alphas = [0.0, 1.0]\n\n[subset]\nrepeats = 1\n\n[penalized.grid]\nkind = \"auto\"\ncount = 20\nmin_ratio = 0.001\n",
    )
    .expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_medcharge"))
        .current_dir(tmp.path())
        .args([
            "report",
            data_path.to_str().expect("path str"),
            "--config",
            config_path.to_str().expect("path str"),
            "--coefficients",
            "coefficients.tsv",
            "--seed",
            "5",
        ])
        .status()
        .expect("run medcharge cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let report_path = tmp.path().join("report.toml");
    let report = Report::load(report_path.to_str().expect("path str")).expect("load report");
    assert_eq!(report.config.seed, 5);
    assert_eq!(report.config.subset.repeats, 1);
    assert_eq!(report.split.n_total, 120);
    for family in ModelFamily::ALL {
        assert!(report.fit(family).is_some(), "{} missing", family.name());
    }

    let coefficients =
        fs::read_to_string(tmp.path().join("coefficients.tsv")).expect("coefficient table");
    assert!(coefficients.starts_with("model\tterm\testimate"));
}

#[test]
fn split_command_writes_partition() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = write_csv(tmp.path(), "charges.csv", &age_driven_records(40, 1));

    let status = Command::new(env!("CARGO_BIN_EXE_medcharge"))
        .current_dir(tmp.path())
        .args([
            "split",
            data_path.to_str().expect("path str"),
            "--fraction",
            "0.75",
            "--out",
            "partition.tsv",
        ])
        .status()
        .expect("run medcharge cli");
    assert!(status.success());

    let partition = fs::read_to_string(tmp.path().join("partition.tsv")).expect("partition");
    let lines: Vec<&str> = partition.lines().collect();
    assert_eq!(lines[0], "row\tpartition");
    assert_eq!(lines.len(), 41);
    assert_eq!(lines.iter().filter(|l| l.ends_with("\ttrain")).count(), 30);
}

#[test]
fn missing_file_exits_with_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_medcharge"))
        .args(["report", "does-not-exist.csv"])
        .output()
        .expect("run medcharge cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}
