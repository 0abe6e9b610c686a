use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use xposed_installer::config::{active_framework_version, AppConfig};
use xposed_installer::constants::prefs;
use xposed_installer::platform::{FirstLoad, HostPlatform, LoadStatus, Screen};
use xposed_installer::{App, LifecycleEvent, UiLoop};

#[derive(Parser, Debug)]
#[command(name = "xposed-installer", version, about = "Xposed installer application shell")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the private data directory
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Override the framework property file
    #[arg(long)]
    prop_file: Option<PathBuf>,

    /// trace, debug, info, warn or error (defaults to $LOG_LEVEL, then info)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the startup sequence and report what it did
    Start,
    /// Print the framework properties
    Props {
        /// Emit a JSON object instead of key=value lines
        #[arg(long)]
        json: bool,
    },
    /// Show framework and installer status
    Status,
    /// Drive one screen through create/resume/pause on the UI loop
    Simulate {
        /// How long the simulated repository load stays busy, in milliseconds
        #[arg(long, default_value_t = 200)]
        load_ms: u64,
    },
}

fn parse_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

/// Repository loader stand-in that is busy for a while after the first load
struct SimulatedLoader {
    loading: Arc<AtomicBool>,
    load_time: Duration,
}

impl LoadStatus for SimulatedLoader {
    fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}

impl FirstLoad for SimulatedLoader {
    fn trigger_first_load_if_necessary(&self) {
        if self.loading.swap(true, Ordering::SeqCst) {
            return;
        }
        let loading = Arc::clone(&self.loading);
        let load_time = self.load_time;
        thread::spawn(move || {
            thread::sleep(load_time);
            loading.store(false, Ordering::SeqCst);
            info!("Simulated repository load finished");
        });
    }
}

struct IdleLoader;

impl LoadStatus for IdleLoader {
    fn is_loading(&self) -> bool {
        false
    }
}

struct LoggingScreen;

impl Screen for LoggingScreen {
    fn name(&self) -> &str {
        "main"
    }

    fn set_progress_visible(&self, visible: bool) {
        info!(screen = self.name(), visible, "Progress indicator");
    }
}

fn simulate(app: &App, ui_loop: &UiLoop, load_time: Duration) {
    let screen: Arc<dyn Screen> = Arc::new(LoggingScreen);
    let tracker = app.tracker();

    tracker.handle(LifecycleEvent::Created, &screen);
    tracker.handle(LifecycleEvent::Started, &screen);
    tracker.handle(LifecycleEvent::Resumed, &screen);

    // A loader reports completion from its own thread
    let background = Arc::clone(tracker);
    thread::spawn(move || {
        thread::sleep(load_time + Duration::from_millis(50));
        background.refresh_progress_indicator();
    });
    ui_loop.run_for(load_time + Duration::from_millis(250));

    tracker.handle(LifecycleEvent::Paused, &screen);
    tracker.handle(LifecycleEvent::Stopped, &screen);
    tracker.handle(LifecycleEvent::Destroyed, &screen);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }
    if let Some(prop_file) = cli.prop_file {
        config.prop_file = prop_file;
    }

    let load_time = match cli.command {
        Command::Simulate { load_ms } => Duration::from_millis(load_ms),
        _ => Duration::ZERO,
    };
    let platform = Arc::new(HostPlatform::new(&config.base_dir));
    let repo_loader = Arc::new(SimulatedLoader {
        loading: Arc::new(AtomicBool::new(false)),
        load_time,
    });
    let (app, ui_loop) = App::start(config, platform, repo_loader, Arc::new(IdleLoader));

    match cli.command {
        Command::Start => {
            let report = app.startup_report();
            println!("properties:        {}", report.property_count);
            println!("directories ready: {}", report.directories_ready);
            println!("sdcard cleanup:    {}", report.cleanups.sdcard);
            println!("debug log cleanup: {}", report.cleanups.debug_log);
            println!("static busybox:    {}", report.static_busybox);
        }
        Command::Props { json } => {
            let props = app.properties();
            if json {
                println!("{}", serde_json::to_string_pretty(&*props)?);
            } else {
                for (key, value) in props.iter() {
                    println!("{key}={value}");
                }
            }
        }
        Command::Status => {
            let props = app.properties();
            let prefs_store = app.preferences();
            println!("active framework:  {}", active_framework_version());
            println!("installed version: {}", props.version().unwrap_or("none"));
            println!("architecture:      {}", props.arch().unwrap_or("unknown"));
            println!("downloads enabled: {}", app.downloads_enabled());
            println!(
                "cleaned up sdcard: {}",
                prefs_store.get_bool(prefs::CLEANED_UP_SDCARD, false)
            );
            println!(
                "cleaned up log:    {}",
                prefs_store.get_bool(prefs::CLEANED_UP_DEBUG_LOG, false)
            );
        }
        Command::Simulate { .. } => simulate(&app, &ui_loop, load_time),
    }

    ui_loop.run_pending();
    app.shutdown()
}
