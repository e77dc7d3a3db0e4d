//! Overpass CLI - ground tracks, territory overflight, POI closest approach

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::ProgressBar;

use overpass::datasets::{PoiDataset, TerritoryDataset};
use overpass::ephemeris::{generate_track, BufferHandle, EphemBuffer};
use overpass::export::{
    default_export_name, ensure_extension, write_poi_export, write_territory_export,
    write_track_export, ExportFormat, ExportMeta,
};
use overpass::poi::{default_thread_count, select_pois};
use overpass::propagation::{ObserverSite, SgpPropagator};
use overpass::stream::{drain_into, run_to_completion, RunManager, RunOutcome, VecSink};
use overpass::territory::{insert_gap_markers, label_track, CountrySelector};

#[derive(Parser, Debug)]
#[command(name = "overpass")]
#[command(about = "Operations planning for Earth-observation satellites", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the raw sub-satellite ground track
    Ephemeris(EphemerisArgs),
    /// Filter the ground track by country of overflight
    Territory(TerritoryArgs),
    /// Pick the closest-approach sample per point of interest
    Poi(PoiArgs),
    /// Append a point of interest to the dataset CSV
    AddPoi(AddPoiArgs),
}

#[derive(Args, Debug, Clone)]
struct TrackArgs {
    /// TLE file (optional name line followed by the two element lines)
    #[arg(long)]
    tle: PathBuf,
    /// Horizon in hours
    #[arg(long, default_value_t = 24.0)]
    hours: f64,
    /// Sample step in seconds
    #[arg(long = "step-seconds", default_value_t = 1)]
    step_seconds: u64,
    /// Observer site latitude in degrees
    #[arg(long = "site-lat", default_value_t = 0.0)]
    site_lat: f64,
    /// Observer site longitude in degrees
    #[arg(long = "site-lon", default_value_t = 0.0)]
    site_lon: f64,
    /// Observer site altitude in meters
    #[arg(long = "site-alt", default_value_t = 0.0)]
    site_alt: f64,
}

#[derive(Args, Debug)]
struct EphemerisArgs {
    #[command(flatten)]
    track: TrackArgs,
    /// Write the track to this CSV instead of printing it
    #[arg(long)]
    output: Option<PathBuf>,
    /// Emit `#` metadata lines before the header
    #[arg(long)]
    metadata: bool,
}

#[derive(Args, Debug)]
struct TerritoryArgs {
    #[command(flatten)]
    track: TrackArgs,
    /// Country tile dataset CSV
    #[arg(long)]
    countries: PathBuf,
    /// Country to keep, or `*` for any land
    #[arg(long, default_value = "*")]
    country: String,
    /// Write the table to this CSV instead of printing it
    #[arg(long)]
    output: Option<PathBuf>,
    /// Emit `#` metadata lines before the header
    #[arg(long)]
    metadata: bool,
}

#[derive(Args, Debug)]
struct PoiArgs {
    #[command(flatten)]
    track: TrackArgs,
    /// POI tile dataset CSV
    #[arg(long = "poi-file")]
    poi_file: PathBuf,
    /// Restrict the run to one POI by exact name
    #[arg(long)]
    poi: Option<String>,
    /// Worker count; defaults to one per core, clamped to [2, 8]. Use 1 for
    /// fully deterministic output order.
    #[arg(long)]
    threads: Option<usize>,
    /// Output path; defaults to poi_YYYYMMDD_HHMMSS.<ext>
    #[arg(long)]
    output: Option<PathBuf>,
    /// Export flavor
    #[arg(long, value_enum, default_value = "csv")]
    format: FormatArg,
    /// Emit `#` metadata lines before the header
    #[arg(long)]
    metadata: bool,
}

#[derive(Args, Debug)]
struct AddPoiArgs {
    /// POI tile dataset CSV to append to (created if missing)
    #[arg(long = "poi-file")]
    poi_file: PathBuf,
    /// POI name (required, non-empty)
    #[arg(long)]
    name: String,
    /// POI type label
    #[arg(long = "type", default_value = "")]
    poi_type: String,
    /// Square tile side in km
    #[arg(long = "tile-km", default_value_t = 10.0)]
    tile_km: f64,
    /// Tile center latitude in degrees
    #[arg(long)]
    lat: f64,
    /// Tile center longitude in degrees
    #[arg(long)]
    lon: f64,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Csv,
    Txt,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Txt => ExportFormat::Txt,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // single-flight owner for this process; Ctrl-C cancels the active run
    // and the command exits silently once the producer notices
    let manager = Arc::new(RunManager::new());
    {
        let manager = manager.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("interrupt received, cancelling run");
            manager.interrupt();
        }) {
            log::warn!("could not install Ctrl-C handler: {}", e);
        }
    }

    let cli = Cli::parse();
    match cli.command {
        Command::Ephemeris(args) => run_ephemeris(&manager, args),
        Command::Territory(args) => run_territory(&manager, args),
        Command::Poi(args) => run_poi(&manager, args),
        Command::AddPoi(args) => run_add_poi(args),
    }
}

fn validate(track: &TrackArgs) -> Result<(u64, u64)> {
    if track.hours <= 0.0 {
        return Err(anyhow!("--hours must be > 0"));
    }
    if track.step_seconds == 0 {
        return Err(anyhow!("--step-seconds must be > 0"));
    }
    Ok(((track.hours * 3600.0).round() as u64, track.step_seconds))
}

fn load_propagator(track: &TrackArgs) -> Result<SgpPropagator> {
    Ok(SgpPropagator::from_tle_file(&track.tle)?.with_site(ObserverSite {
        lat_deg: track.site_lat,
        lon_deg: track.site_lon,
        alt_m: track.site_alt,
    }))
}

fn status_spinner(label: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(label.to_string());
    spinner
}

/// Run the ephemeris engine for the given track parameters, swap the result
/// into the run-scoped handle, and hand back a read-only borrow.
fn build_track(
    manager: &RunManager,
    handle: &BufferHandle,
    propagator: &SgpPropagator,
    duration_s: u64,
    step_s: u64,
) -> Result<Option<Arc<EphemBuffer>>> {
    let spinner = status_spinner("propagating ground track");
    let worker = propagator.clone();
    let start_jd = propagator.epoch_jd();
    let outcome = run_to_completion(
        manager,
        move |token| generate_track(worker, start_jd, duration_s, step_s, token),
        |secs| {
            spinner.set_message(format!("propagating ground track ({}s)", secs));
            spinner.tick();
        },
    );
    spinner.finish_and_clear();

    match outcome {
        RunOutcome::Complete(buffer) => Ok(Some(handle.swap(buffer))),
        RunOutcome::Cancelled => {
            log::info!("run cancelled");
            Ok(None)
        }
        RunOutcome::Failed(e) => Err(anyhow::Error::new(e).context("ground-track run failed")),
    }
}

fn meta_for(
    enabled: bool,
    propagator: &SgpPropagator,
    track: &TrackArgs,
) -> Option<ExportMeta> {
    enabled.then(|| ExportMeta {
        tle_id: propagator.sat_name().to_string(),
        step_s: track.step_seconds,
        horizon_h: track.hours.round() as u64,
    })
}

fn run_ephemeris(manager: &RunManager, args: EphemerisArgs) -> Result<()> {
    let (duration_s, step_s) = validate(&args.track)?;
    let propagator = load_propagator(&args.track)?;

    let handle = BufferHandle::new();
    let Some(buffer) = build_track(manager, &handle, &propagator, duration_s, step_s)? else {
        return Ok(());
    };

    let mut sink = VecSink::new();
    drain_into(&mut sink, buffer.samples());

    match &args.output {
        Some(path) => {
            let path = ensure_extension(path, ExportFormat::Csv);
            let meta = meta_for(args.metadata, &propagator, &args.track);
            write_track_export(&path, sink.rows(), meta.as_ref())?;
            println!("wrote {} samples to {}", sink.rows().len(), path.display());
        }
        None => {
            for s in sink.rows() {
                println!("{}  {:>9.5}  {:>10.5}", s.time_str, s.lat, s.lon);
            }
        }
    }
    Ok(())
}

fn run_territory(manager: &RunManager, args: TerritoryArgs) -> Result<()> {
    let (duration_s, step_s) = validate(&args.track)?;
    let propagator = load_propagator(&args.track)?;
    let dataset = Arc::new(
        TerritoryDataset::load(&args.countries)
            .with_context(|| format!("loading country tiles from {:?}", args.countries))?,
    );
    let selector = CountrySelector::parse(&args.country);

    let handle = BufferHandle::new();
    let Some(buffer) = build_track(manager, &handle, &propagator, duration_s, step_s)? else {
        return Ok(());
    };

    let spinner = status_spinner("labeling territory overflight");
    let worker_buffer = buffer.clone();
    let worker_dataset = dataset.clone();
    let worker_selector = selector.clone();
    let outcome = run_to_completion(
        manager,
        move |token| label_track(&worker_buffer, &worker_dataset, &worker_selector, token),
        |secs| {
            spinner.set_message(format!("labeling territory overflight ({}s)", secs));
            spinner.tick();
        },
    );
    spinner.finish_and_clear();

    let rows = match outcome {
        RunOutcome::Complete(rows) => rows,
        RunOutcome::Cancelled => {
            log::info!("run cancelled");
            return Ok(());
        }
        RunOutcome::Failed(e) => {
            return Err(anyhow::Error::new(e).context("territory labeling failed"))
        }
    };

    let mut sink = VecSink::new();
    drain_into(&mut sink, &rows);

    match &args.output {
        Some(path) => {
            let path = ensure_extension(path, ExportFormat::Csv);
            let meta = meta_for(args.metadata, &propagator, &args.track);
            write_territory_export(&path, sink.rows(), meta.as_ref())?;
            println!("wrote {} rows to {}", sink.rows().len(), path.display());
        }
        None => {
            for r in insert_gap_markers(sink.rows().to_vec()) {
                if r.is_gap_marker() {
                    println!();
                } else {
                    println!(
                        "{}  {:>9.5}  {:>10.5}  {}",
                        r.time_str, r.lat, r.lon, r.country
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_poi(manager: &RunManager, args: PoiArgs) -> Result<()> {
    let (duration_s, step_s) = validate(&args.track)?;
    let propagator = load_propagator(&args.track)?;
    let dataset = Arc::new(
        PoiDataset::load(&args.poi_file)
            .with_context(|| format!("loading POI tiles from {:?}", args.poi_file))?,
    );
    if let Some(name) = &args.poi {
        if dataset.find(name).is_none() {
            log::warn!("POI '{}' is not in the dataset; the result will be empty", name);
        }
    }
    let threads = args.threads.unwrap_or_else(default_thread_count);

    let handle = BufferHandle::new();
    let Some(buffer) = build_track(manager, &handle, &propagator, duration_s, step_s)? else {
        return Ok(());
    };

    let spinner = status_spinner("selecting POI passes");
    let worker_buffer = buffer.clone();
    let worker_dataset = dataset.clone();
    let filter = args.poi.clone();
    let outcome = run_to_completion(
        manager,
        move |token| {
            select_pois(
                &worker_buffer,
                &worker_dataset,
                filter.as_deref(),
                threads,
                token,
            )
        },
        |secs| {
            spinner.set_message(format!("selecting POI passes ({}s)", secs));
            spinner.tick();
        },
    );
    spinner.finish_and_clear();

    let picks = match outcome {
        RunOutcome::Complete(picks) => picks,
        RunOutcome::Cancelled => {
            log::info!("run cancelled");
            return Ok(());
        }
        RunOutcome::Failed(e) => return Err(anyhow::Error::new(e).context("POI selection failed")),
    };

    let mut sink = VecSink::new();
    drain_into(&mut sink, &picks);

    let format: ExportFormat = args.format.into();
    let path = match &args.output {
        Some(p) => ensure_extension(p, format),
        None => PathBuf::from(default_export_name(format)),
    };
    let meta = meta_for(args.metadata, &propagator, &args.track);
    write_poi_export(&path, sink.rows(), format, meta.as_ref())?;
    println!("wrote {} POI picks to {}", sink.rows().len(), path.display());
    Ok(())
}

fn run_add_poi(args: AddPoiArgs) -> Result<()> {
    // a missing file is fine here: the append bootstraps it with a header
    let mut dataset = match PoiDataset::load(&args.poi_file) {
        Ok(ds) => ds,
        Err(e) => {
            log::debug!("starting a new POI dataset: {}", e);
            PoiDataset::empty()
        }
    };

    let tile = dataset
        .append(
            &args.poi_file,
            &args.name,
            &args.poi_type,
            args.tile_km,
            args.lat,
            args.lon,
        )
        .with_context(|| format!("appending POI to {:?}", args.poi_file))?;

    println!(
        "added '{}' ({}) tile {:.3} km at ({:.5}, {:.5}): lat [{:.5}, {:.5}] lon [{:.5}, {:.5}]",
        tile.name,
        if tile.poi_type.is_empty() {
            "untyped"
        } else {
            &tile.poi_type
        },
        args.tile_km,
        args.lat,
        args.lon,
        tile.rect.lat_min,
        tile.rect.lat_max,
        tile.rect.lon_min,
        tile.rect.lon_max
    );
    Ok(())
}
