/// Land-cover change analysis from the command line.
///
/// `run` executes a full two-period analysis described by a scenario JSON
/// against the in-memory provider; `import` checks a sample text file;
/// `utm` reports the UTM zone used for parcel areas.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geo::Geometry;
use serde::Deserialize;

use canopy_core::area::{export, Parcel};
use canopy_core::change::ChangeClass;
use canopy_core::classify::Accuracy;
use canopy_core::geometry::{polygon_from_rings, UtmZone};
use canopy_core::pipeline::{AnalysisWarning, PeriodResult};
use canopy_core::provider::{Catalog, LocalProvider};
use canopy_core::samples::{import_samples, ImportIssue, ImportSummary, Period, SampleCollection};
use canopy_core::{run_analysis, AnalysisConfig, AnalysisSession};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "canopy", about = "Detect land-cover change and deforestation between two dates")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full analysis from a scenario file
    Run {
        /// Scenario JSON (config, catalog path, region, parcels, samples)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Write the per-parcel CSV here
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write the analysis region as a GeoJSON geometry
        #[arg(long)]
        region_out: Option<PathBuf>,
    },
    /// Parse a sample text file and report what would be imported
    Import {
        /// Sample text: class-name lines followed by coordinate lines
        #[arg(short, long)]
        samples: PathBuf,

        /// anterior | posterior
        #[arg(short, long, default_value = "anterior")]
        period: Period,
    },
    /// Print the UTM zone and EPSG code for a coordinate
    Utm {
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
    },
}

// ── Scenario schema ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Scenario {
    #[serde(default)]
    config: AnalysisConfig,
    /// Catalog JSON, relative to the scenario file.
    catalog: PathBuf,
    /// Region rings (exterior first). Omit to derive it from the parcels.
    #[serde(default)]
    region: Option<Vec<Vec<[f64; 2]>>>,
    #[serde(default)]
    parcels: Vec<ParcelDef>,
    #[serde(default)]
    samples: SampleTexts,
}

#[derive(Deserialize)]
struct ParcelDef {
    rings: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct SampleTexts {
    #[serde(default)]
    anterior: String,
    #[serde(default)]
    posterior: String,
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Run { scenario, out, region_out } => run(&scenario, out.as_deref(), region_out.as_deref()),
        Command::Import { samples, period } => import(&samples, period),
        Command::Utm { lon, lat } => {
            let zone = UtmZone::for_lon_lat(lon, lat);
            println!(
                "zone {}{}  EPSG:{}  central meridian {}°",
                zone.zone,
                if zone.south { "S" } else { "N" },
                zone.epsg(),
                zone.central_meridian()
            );
            Ok(())
        }
    }
}

fn run(scenario_path: &Path, out: Option<&Path>, region_out: Option<&Path>) -> Result<()> {
    let text = fs::read_to_string(scenario_path)
        .with_context(|| format!("reading scenario {}", scenario_path.display()))?;
    let scenario: Scenario = serde_json::from_str(&text)
        .with_context(|| format!("parsing scenario {}", scenario_path.display()))?;
    scenario.config.validate().context("invalid analysis config")?;

    let catalog_path = scenario_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&scenario.catalog);
    let catalog: Catalog = serde_json::from_str(
        &fs::read_to_string(&catalog_path)
            .with_context(|| format!("reading catalog {}", catalog_path.display()))?,
    )
    .with_context(|| format!("parsing catalog {}", catalog_path.display()))?;
    let provider = LocalProvider::with_config(catalog, &scenario.config.provider).context("loading catalog")?;
    tracing::info!(catalog = %catalog_path.display(), "catalog loaded");

    let mut session = AnalysisSession::new();
    if let Some(rings) = &scenario.region {
        let polygon = polygon_from_rings(rings).context("region rings")?;
        session.set_region(&Geometry::Polygon(polygon)).context("region")?;
    }
    let mut parcels = Vec::with_capacity(scenario.parcels.len());
    for (i, def) in scenario.parcels.iter().enumerate() {
        let polygon = polygon_from_rings(&def.rings).with_context(|| format!("parcel {i}"))?;
        parcels.push(Parcel {
            geometry: Geometry::Polygon(polygon),
            attributes: def.attributes.clone(),
        });
    }
    session.set_parcels(parcels);

    if let Some(path) = region_out {
        let region = session.region().context("region")?;
        fs::write(path, serde_json::to_string_pretty(&region.to_geojson())?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("wrote region to {}", path.display());
    }

    for (period, text) in [
        (Period::Anterior, &scenario.samples.anterior),
        (Period::Posterior, &scenario.samples.posterior),
    ] {
        let summary = session.import_samples(period, text, &scenario.config.import_bounds);
        print_import(period, &summary);
    }

    let outcome = run_analysis(&provider, &session, &scenario.config)?;

    for period in Period::BOTH {
        match outcome.period(period) {
            Ok(result) => print_period(result),
            Err(err) => println!("[{period}] failed: {err}"),
        }
    }

    match &outcome.change {
        Some(Ok(change)) => {
            println!("change ({} days between target dates):", change.interval_days);
            for class in ChangeClass::ALL {
                let ha = change.areas_ha.get(&class).copied().unwrap_or(0.0);
                println!("  {:<3} {:<18} {:>12.2} ha", class.abbreviation(), class.name(), ha);
            }
            if let Some(rate) = change.annual_deforestation_ha {
                println!("  annual deforestation rate: {rate:.2} ha/yr");
            }
            println!("  map: {}", change.thumbnail_url);
        }
        Some(Err(err)) => println!("change: failed: {err}"),
        None => println!("change: skipped, both periods must succeed"),
    }

    for warning in &outcome.warnings {
        match warning {
            AnalysisWarning::SparseClass { period, label, count } => {
                println!("warning: [{period}] {label} has only {count} samples")
            }
            AnalysisWarning::ShortInterval { days } => {
                println!("warning: scenes are only {days} days apart")
            }
        }
    }

    match (&outcome.parcels, out) {
        (Some(Ok(report)), Some(path)) => {
            let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
            export::write_csv(file, report, &scenario.config.export.class_column_tag)?;
            println!(
                "wrote {} parcels to {} (UTM EPSG:{}, {} skipped)",
                report.rows.len(),
                path.display(),
                report.utm_epsg,
                report.skipped.len()
            );
        }
        (Some(Ok(report)), None) => {
            println!("{}", export::to_csv_string(report, &scenario.config.export.class_column_tag)?);
        }
        (Some(Err(err)), _) => println!("parcels: failed: {err}"),
        (None, Some(_)) => bail!("no parcel report was produced, nothing to write"),
        (None, None) => {}
    }
    Ok(())
}

fn import(path: &Path, period: Period) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut collection = SampleCollection::new();
    let summary = import_samples(&mut collection, &text, &AnalysisConfig::default().import_bounds);
    print_import(period, &summary);
    Ok(())
}

fn print_import(period: Period, summary: &ImportSummary) {
    if summary.total() == 0 && summary.issues.is_empty() {
        return;
    }
    println!("[{period}] imported {} points", summary.total());
    for (label, n) in &summary.imported {
        if *n > 0 {
            println!("  {label:<16} {n}");
        }
    }
    for issue in &summary.issues {
        match issue {
            ImportIssue::NotACoordinate { line, text } => println!("  line {line}: not a coordinate: {text}"),
            ImportIssue::OutOfBounds { line, lon, lat } => {
                println!("  line {line}: ({lon}, {lat}) outside the accepted area")
            }
        }
    }
}

fn print_period(r: &PeriodResult) {
    println!(
        "[{}] {} ({}, {}, {:.1}% cloud{})",
        r.period,
        r.scene.id,
        r.scene.acquired,
        r.scene.sensor,
        r.scene.cloud_cover,
        if r.scene.is_mosaic() { ", mosaic" } else { "" }
    );
    println!(
        "  samples: {} training, {} validation ({:?})",
        r.training_points, r.validation_points, r.policy
    );
    match &r.accuracy {
        Accuracy::Measured(a) => println!(
            "  accuracy: overall {:.1}%, kappa {:.3} ({})",
            a.overall_accuracy * 100.0,
            a.kappa,
            a.quality
        ),
        Accuracy::Unavailable(reason) => println!("  accuracy: unavailable ({reason:?})"),
    }
    for (label, ha) in &r.class_areas_ha {
        println!("  {label:<16} {ha:>12.2} ha");
    }
}
