#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::process;

use medcharge::config::PipelineConfig;
use medcharge::data::load_dataset;
use medcharge::model::ModelFamily;
use medcharge::pipeline::run_pipeline;
use medcharge::report::FamilyOutcome;
use medcharge::split::split_dataset;

#[derive(Parser)]
#[command(
    name = "medcharge",
    version,
    about = "Best-subset, ridge, lasso and elastic-net regression of medical charges"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit every model family and write the comparison report
    Report(ReportArgs),
    /// Show the stratified train/test partition without fitting anything
    Split(SplitArgs),
    /// Print the default configuration as TOML
    Config,
}

#[derive(Args)]
struct ReportArgs {
    /// Path to the charges table (CSV, or TSV for a .tsv extension)
    data: String,

    /// TOML configuration file; unset values keep their defaults
    #[arg(long)]
    config: Option<String>,

    /// Where to write the TOML report
    #[arg(long, default_value = "report.toml")]
    out: String,

    /// Also write a tab-separated coefficient table to this path
    #[arg(long)]
    coefficients: Option<String>,

    /// Overrides the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides the configured training fraction
    #[arg(long)]
    fraction: Option<f64>,
}

#[derive(Args)]
struct SplitArgs {
    /// Path to the charges table (CSV, or TSV for a .tsv extension)
    data: String,

    #[arg(long, default_value = "0.7")]
    fraction: f64,

    #[arg(long, default_value = "311")]
    seed: u64,

    /// Write one `row<TAB>partition` line per record to this path
    #[arg(long)]
    out: Option<String>,
}

fn report(args: ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading configuration from: {path}");
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(fraction) = args.fraction {
        config.split_fraction = fraction;
    }

    println!("Loading data from: {}", args.data);
    let dataset = load_dataset(&args.data)?;
    println!("Loaded {} records", dataset.len());

    let report = run_pipeline(&dataset, &config)?;
    println!(
        "Split: {} training / {} test rows",
        report.split.n_train, report.split.n_test
    );

    println!();
    println!(
        "{:<12} {:<12} {:>14} {:>12} {:>12}",
        "model", "choice", "test RMSE", "test R2 log", "predictors"
    );
    for family in ModelFamily::ALL {
        match &report.families[family.name()] {
            FamilyOutcome::Fitted(fitted) => {
                let fit = &fitted.primary;
                println!(
                    "{:<12} {:<12} {:>14.2} {:>12.4} {:>12}",
                    family.name(),
                    fit.label,
                    fit.test_metrics.rmse_charges,
                    fit.test_metrics.r_squared_log,
                    fit.test_metrics.p
                );
            }
            FamilyOutcome::Failed { reason } => {
                println!("{:<12} failed: {reason}", family.name());
            }
        }
    }
    println!();

    report.save(&args.out)?;
    println!("Report saved to: {}", args.out);
    if let Some(path) = &args.coefficients {
        report.write_coefficients_tsv(path)?;
        println!("Coefficients saved to: {path}");
    }
    Ok(())
}

fn split(args: SplitArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading data from: {}", args.data);
    let dataset = load_dataset(&args.data)?;
    let split = split_dataset(&dataset, args.fraction, args.seed)?;
    println!(
        "{} records: {} training ({:.3}), {} test",
        split.len(),
        split.train_idx.len(),
        split.train_idx.len() as f64 / split.len() as f64,
        split.test_idx.len()
    );

    if let Some(path) = &args.out {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        writer.write_record(["row", "partition"])?;
        let mut rows: Vec<(usize, &str)> = split
            .train_idx
            .iter()
            .map(|&i| (i, "train"))
            .chain(split.test_idx.iter().map(|&i| (i, "test")))
            .collect();
        rows.sort_unstable();
        for (row, partition) in rows {
            writer.write_record([row.to_string().as_str(), partition])?;
        }
        writer.flush()?;
        println!("Partition saved to: {path}");
    }
    Ok(())
}

fn print_default_config() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", PipelineConfig::default().to_toml()?);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Report(args)) => report(args),
        Some(Commands::Split(args)) => split(args),
        Some(Commands::Config) => print_default_config(),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
