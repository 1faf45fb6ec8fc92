use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use log::warn;
use transporter::{
    AppConfig, FileSessionCounter, FileSessionStore, PositionSource, RecorderStatus,
    RecordingController, SessionRef, SessionStore, TransporterError, TyreType,
    session::SessionSummary,
    telemetry::{ReplayPositionSource, SimulatedPositionSource, accumulator::kmh_to_mps},
};

const POLL_INTERVAL_MS: u64 = 200;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Directory holding saved sessions
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a session until Ctrl-C, the duration elapses or the replay ends
    Record {
        /// JSON lines file with one fix (or null) per tick
        #[arg(short, long)]
        replay: Option<PathBuf>,

        /// Speed of the simulated drive when no replay is given
        #[arg(long, default_value_t = 50.)]
        speed_kmh: f64,

        #[arg(long, default_value_t = 0.)]
        heading_deg: f64,

        #[arg(long, default_value_t = 45.4642, allow_hyphen_values = true)]
        start_lat: f64,

        #[arg(long, default_value_t = 9.19, allow_hyphen_values = true)]
        start_lon: f64,

        #[arg(short, long)]
        duration_s: Option<u64>,

        #[arg(long)]
        tick_ms: Option<u64>,
    },
    /// List saved sessions
    List,
    /// Print a summary of a saved session
    Show { name: String },
    /// Delete a saved session
    Delete { name: String },
    /// Copy saved sessions to a directory
    Export {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(long)]
        to: PathBuf,
    },
    /// Show or change the preferences stored with new sessions
    Settings {
        #[arg(long, value_enum)]
        tyre: Option<TyreType>,

        #[arg(long)]
        driver: Option<String>,
    },
}

struct RecordOptions {
    duration: Option<Duration>,
    tick_period: Duration,
}

fn record<S: PositionSource>(
    source: S,
    store: FileSessionStore,
    app_config: AppConfig,
    options: RecordOptions,
) -> Result<(), TransporterError> {
    let stop_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = stop_requested.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Stopping...");
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let counter = FileSessionCounter::new_default()?;
    let mut controller = RecordingController::new(source, store, counter, app_config)
        .with_tick_period(Some(options.tick_period));
    let live_rx = controller.live_feed();
    let status_rx = controller.status_feed();

    let session_id = controller.start()?;
    println!("Recording session {} (Ctrl-C to stop)", session_id);

    let started = Instant::now();
    while !stop_requested.load(Ordering::Relaxed) {
        controller.wait_for_tick(Duration::from_millis(POLL_INTERVAL_MS));

        if let Some(live) = live_rx.try_iter().last() {
            println!(
                "Speed: {:.1} km/h  Distance: {:.1} m  Avg: {:.1} km/h",
                live.current_speed_kmh, live.total_distance_m, live.average_speed_kmh
            );
        }
        for status in status_rx.try_iter() {
            print_status(&status);
        }

        if options.duration.is_some_and(|d| started.elapsed() >= d)
            || controller.source().is_exhausted()
        {
            break;
        }
    }

    let result = controller.stop();
    for status in status_rx.try_iter() {
        print_status(&status);
    }
    result.map(|_| ())
}

fn print_status(status: &RecorderStatus) {
    match status {
        RecorderStatus::PermissionDenied => {
            println!("Location access is denied. Please enable it in Settings.")
        }
        RecorderStatus::PermissionRestricted => println!("Location access is restricted."),
        RecorderStatus::SessionSaved { session_id, path } => {
            println!("Session {} saved to {}", session_id, path.display())
        }
        RecorderStatus::PersistenceFailed { session_id, reason } => {
            println!("Error saving session {}: {}", session_id, reason)
        }
    }
}

fn settings(
    app_config: &mut AppConfig,
    tyre: Option<TyreType>,
    driver: Option<String>,
) -> Result<(), TransporterError> {
    let changed = tyre.is_some() || driver.is_some();
    if let Some(tyre) = tyre {
        app_config.tyre_type = Some(tyre);
    }
    if let Some(driver) = driver {
        app_config.driver_name = driver;
    }
    if changed {
        app_config.save()?;
    }
    println!("Tyre type: {:?}", app_config.tyre_type);
    println!("Driver name: {}", app_config.driver_name);
    Ok(())
}

fn show(store: &FileSessionStore, name: &str) -> Result<(), TransporterError> {
    let session = store.load(&SessionRef::from(name))?;
    let summary = SessionSummary::from_session(&session);
    println!("Session {}", summary.session_id);
    println!("  samples:      {}", summary.samples);
    println!("  duration:     {:.0} s", summary.duration_s);
    println!("  distance:     {:.1} m", summary.distance_m);
    println!("  max speed:    {:.1} km/h", summary.max_speed_kmh);
    println!("  avg speed:    {:.1} km/h", summary.avg_speed_kmh);
    println!("  longest gap:  {:.0} s", summary.longest_gap_s);
    if let Some(tyre) = session.tyre_type {
        println!("  tyres:        {:?}", tyre);
    }
    if let Some(driver) = session.driver_name {
        println!("  driver:       {}", driver);
    }
    Ok(())
}

fn sessions_dir(cli_dir: Option<&Path>, app_config: &AppConfig) -> Result<PathBuf, TransporterError> {
    match cli_dir.or(app_config.sessions_dir.as_deref()) {
        Some(dir) => Ok(dir.to_path_buf()),
        None => FileSessionStore::default_storage_path(),
    }
}

fn run(cli: Args) -> Result<(), TransporterError> {
    let mut app_config = AppConfig::from_local_file()
        .unwrap_or_else(|e| {
            warn!("Ignoring unreadable config file: {}", e);
            None
        })
        .unwrap_or_default();
    let mut store = FileSessionStore::new(sessions_dir(cli.sessions_dir.as_deref(), &app_config)?)?;

    match cli.command {
        Commands::Record {
            replay,
            speed_kmh,
            heading_deg,
            start_lat,
            start_lon,
            duration_s,
            tick_ms,
        } => {
            let tick_period =
                Duration::from_millis(tick_ms.unwrap_or(app_config.tick_period_ms).max(1));
            let options = RecordOptions {
                duration: duration_s.map(Duration::from_secs),
                tick_period,
            };
            match replay {
                Some(replay) => record(
                    ReplayPositionSource::from_file(&replay)?,
                    store,
                    app_config,
                    options,
                ),
                None => record(
                    SimulatedPositionSource::new(
                        start_lat,
                        start_lon,
                        kmh_to_mps(speed_kmh),
                        heading_deg,
                        tick_period.as_secs_f64(),
                    ),
                    store,
                    app_config,
                    options,
                ),
            }
        }
        Commands::List => {
            for session in store.list_sessions()? {
                println!("{}", session);
            }
            Ok(())
        }
        Commands::Show { name } => show(&store, &name),
        Commands::Delete { name } => {
            store.delete(&SessionRef::from(name.as_str()))?;
            println!("Deleted {}", name);
            Ok(())
        }
        Commands::Export { names, to } => {
            let sessions: Vec<SessionRef> = names.iter().map(|n| SessionRef::from(n.as_str())).collect();
            for path in store.export_to(&sessions, &to)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Settings { tyre, driver } => settings(&mut app_config, tyre, driver),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
