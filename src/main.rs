//! flex-dispatch entry point: CLI wiring and config-driven engine construction.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flex_dispatch::config::ScenarioConfig;
use flex_dispatch::equipment::Equipment;
use flex_dispatch::io::export::{export_records, export_series};
use flex_dispatch::io::import::import_demand_csv;
use flex_dispatch::series::DemandSeries;
use flex_dispatch::sim::kpi::KpiReport;

#[derive(Parser)]
#[command(name = "flex-dispatch")]
#[command(version, about = "Storage dispatch simulator for metered demand")]
#[command(
    long_about = "Replays a demand series step by step and dispatches a battery or \
    thermal store against periodically recomputed setpoints.\n\
    \nIf no --scenario or --preset is given, the baseline preset is used. \
    Without --demand-csv a synthetic demand profile is generated from the scenario.\n\
    \nExamples:\n  \
    flex-dispatch --preset tou_shift --days 3\n  \
    flex-dispatch --scenario site.toml --demand-csv meter.csv --flexed-out flexed.csv"
)]
struct Cli {
    /// Load scenario from a TOML config file
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, tou_shift, conservative)
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Read metered demand from CSV instead of generating it
    #[arg(long, value_name = "PATH")]
    demand_csv: Option<PathBuf>,

    /// Override the number of simulated days
    #[arg(long)]
    days: Option<usize>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Export per-step dispatch records to CSV
    #[arg(long, value_name = "PATH")]
    record_out: Option<PathBuf>,

    /// Export the flexed demand series to CSV
    #[arg(long, value_name = "PATH")]
    flexed_out: Option<PathBuf>,

    /// Print only the KPI report
    #[arg(long)]
    summary_only: bool,
}

fn load_scenario(cli: &Cli) -> ScenarioConfig {
    // --scenario takes priority, then --preset, then baseline default
    let loaded = if let Some(path) = &cli.scenario {
        ScenarioConfig::from_toml_file(path)
    } else if let Some(name) = &cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(days) = cli.days {
        scenario.simulation.days = days;
    }
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    scenario
}

fn load_series(cli: &Cli, scenario: &ScenarioConfig) -> DemandSeries {
    let series = match &cli.demand_csv {
        Some(path) => import_demand_csv(path).map_err(|e| e.to_string()),
        None => scenario.demand_series().map_err(|e| e.to_string()),
    };
    series.unwrap_or_else(|e| {
        eprintln!("error: failed to load demand: {e}");
        process::exit(1);
    })
}

fn write_or_exit(result: std::io::Result<()>, what: &str, path: &Path) {
    if let Err(e) = result {
        eprintln!("error: failed to write {what} CSV: {e}");
        process::exit(1);
    }
    info!(path = %path.display(), "{what} written");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scenario = load_scenario(&cli);

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let series = load_series(&cli, &scenario);
    let mut engine = scenario.build_engine(&series).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    let report = engine.run().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });

    if !cli.summary_only {
        for r in &report.records {
            println!("{r}");
        }
        println!();
    }

    let kpi = KpiReport::from_report(
        &series,
        &report,
        engine.dispatch_on(),
        engine.equipment().storage_capacity(),
    );
    println!("{kpi}");

    if let Some(path) = &cli.record_out {
        write_or_exit(export_records(&report.records, path), "dispatch record", path);
    }
    if let Some(path) = &cli.flexed_out {
        write_or_exit(export_series(&report.flexed, path), "flexed series", path);
    }
}
