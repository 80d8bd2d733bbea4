use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info, warn};
use racewalk::{
    AppConfig, Fix, RaceDescription, RaceSession, RacewalkError,
    telemetry::{
        BatterySource, EventFactory, EventQueue, FixedBattery, HttpTransport, SequenceCounter,
        SysfsBattery, UploadOutcome, UploadWorker, Uploader,
    },
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the one in the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk a race using recorded location fixes
    Replay {
        /// Race description (JSON)
        #[arg(short, long)]
        race: PathBuf,

        /// Location fixes, one JSON object per line
        #[arg(short, long)]
        fixes: PathBuf,

        #[arg(short, long)]
        server: Option<String>,

        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        spool: Option<PathBuf>,

        /// Pause between fixes
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Upload events left in the spool by a previous run
    Flush {
        #[arg(short, long)]
        server: Option<String>,

        #[arg(long)]
        spool: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        save: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, RacewalkError> {
    let loaded = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_local_file().unwrap_or_else(|e| {
            warn!("Could not load config file, using defaults: {}", e);
            None
        }),
    };
    Ok(loaded.unwrap_or_default())
}

fn battery_source(config: &AppConfig) -> Box<dyn BatterySource> {
    match &config.battery_device {
        Some(device) => Box::new(SysfsBattery::new(device.clone())),
        None => Box::new(FixedBattery::unavailable()),
    }
}

/// Restore the spool if configured and make sure new ids do not collide with it
fn open_queue(
    spool: Option<&Path>,
    counter: &SequenceCounter,
) -> Result<EventQueue, RacewalkError> {
    let Some(spool) = spool else {
        return Ok(EventQueue::new());
    };
    let queue = EventQueue::restore(spool)?;
    if let Some(max_id) = queue.max_sequence_id() {
        counter.advance_past(max_id);
        info!(
            "Restored {} pending events from {:?}",
            queue.size(),
            spool
        );
    }
    Ok(queue)
}

#[allow(clippy::too_many_arguments)]
fn replay(
    mut config: AppConfig,
    race: &Path,
    fixes: &Path,
    server: Option<String>,
    user: Option<String>,
    spool: Option<PathBuf>,
    delay_ms: u64,
    stop: Arc<AtomicBool>,
) -> Result<(), RacewalkError> {
    config.server_url = server.unwrap_or(config.server_url);
    config.user = user.or(config.user);
    config.spool_path = spool.or(config.spool_path);

    let race = RaceDescription::from_file(race)?;
    info!(
        "Loaded race {} ({}) with {} checkpoints over {}m",
        race.race_id,
        race.name.as_deref().unwrap_or("unnamed"),
        race.table.len(),
        race.table.total_meters()
    );

    let counter = SequenceCounter::new();
    let queue = Arc::new(open_queue(config.spool_path.as_deref(), &counter)?);
    let factory = EventFactory::new(counter, battery_source(&config));
    let transport = HttpTransport::new(config.server_url.clone(), config.upload_timeout());
    let uploader = Arc::new(Uploader::new(Arc::clone(&queue), transport));
    let worker = UploadWorker::spawn(Arc::clone(&uploader));

    let mut session = RaceSession::new(race, factory, Arc::clone(&queue), worker)
        .with_max_accuracy(config.max_fix_accuracy_m);
    if let Some(user) = &config.user {
        session.login(user);
    }
    session.start();

    let fix_error = |e| RacewalkError::FixInput {
        path: fixes.display().to_string(),
        source: e,
    };
    for fix in serde_jsonlines::json_lines::<Fix, _>(fixes).map_err(fix_error)? {
        if stop.load(Ordering::SeqCst) {
            warn!("Interrupted, stopping replay");
            break;
        }
        let fix = match fix {
            Ok(fix) => fix,
            Err(e) => {
                warn!("Skipping unreadable fix: {}", e);
                continue;
            }
        };

        let state = session.handle_fix(&fix);
        info!(
            "{}m, {:.2}km/h, {} events pending",
            state.distance_m,
            state.average_speed_kmh,
            session.pending_events()
        );
        if delay_ms > 0 {
            thread::sleep(Duration::from_millis(delay_ms));
        }
    }

    session.stop();
    let (distance_m, speed_kmh) = (session.distance_m(), session.average_speed_kmh());
    session.into_scheduler().shutdown();

    println!(
        "Distance {}m, average speed {:.2}km/h, {} events pending",
        distance_m,
        speed_kmh,
        queue.size()
    );

    if let Some(spool) = &config.spool_path {
        queue.persist(spool)?;
    } else if !queue.is_empty() {
        warn!(
            "{} events were not delivered and will be lost, configure a spool to keep them",
            queue.size()
        );
    }
    Ok(())
}

fn flush(
    mut config: AppConfig,
    server: Option<String>,
    spool: Option<PathBuf>,
) -> Result<(), RacewalkError> {
    config.server_url = server.unwrap_or(config.server_url);
    let Some(spool) = spool.or(config.spool_path.clone()) else {
        warn!("No spool configured, nothing to flush");
        return Ok(());
    };

    let queue = Arc::new(EventQueue::restore(&spool)?);
    let transport = HttpTransport::new(config.server_url.clone(), config.upload_timeout());
    let uploader = Uploader::new(Arc::clone(&queue), transport);

    let result = uploader.upload();
    queue.persist(&spool)?;
    match result? {
        UploadOutcome::Idle => println!("Spool is empty"),
        outcome => println!("{:?}, {} events pending", outcome, queue.size()),
    }
    Ok(())
}

fn show_config(config: AppConfig, path: Option<&Path>, save: bool) -> Result<(), RacewalkError> {
    let text = serde_json::to_string_pretty(&config)
        .map_err(|e| RacewalkError::ConfigSerializeError { source: e })?;
    println!("{}", text);
    if save {
        match path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Args::parse();

    let mut logger = colog::default_builder();
    if cli.verbose || cfg!(debug_assertions) {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        handler_stop.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Replay {
            race,
            fixes,
            server,
            user,
            spool,
            delay_ms,
        } => replay(config, &race, &fixes, server, user, spool, delay_ms, stop),
        Commands::Flush { server, spool } => flush(config, server, spool),
        Commands::Config { save } => show_config(config, cli.config.as_deref(), save),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
