//! prayer-times: mosque prayer-times lookup.
//!
//! Single-binary Tokio application that:
//! 1. Loads configuration and seeds the local mosque directory
//! 2. Fronts the mawaqit fetcher with an in-process TTL cache
//! 3. Answers one-shot queries as JSON, or
//! 4. Keeps today's times warm for every configured mosque (watch mode)

mod config;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Utc};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::config::AppConfig;
use common::Error;
use directory::InMemoryDirectory;
use mawaqit_client::MawaqitClient;
use prayer_cache::{PrayerTimesService, TtlCache};

/// Mosque prayer times
#[derive(Parser)]
#[command(name = "prayer-times", about = "Mosque prayer times from mawaqit")]
struct Cli {
    /// Masjid id (defaults to the stored or configured default).
    #[arg(long)]
    masjid: Option<String>,

    /// Day of month (defaults to today).
    #[arg(long)]
    day: Option<u32>,

    /// Month 1-12 (defaults to the current month; requires --day).
    #[arg(long, requires = "day")]
    month: Option<u32>,

    /// Check that the masjid exists upstream and exit.
    #[arg(long)]
    validate: bool,

    /// Print mosque info and exit.
    #[arg(long)]
    info: bool,

    /// Print midnight and last third of the night.
    #[arg(long)]
    night: bool,

    /// Print the next upcoming prayer.
    #[arg(long)]
    next: bool,

    /// Print cache statistics after the query.
    #[arg(long)]
    stats: bool,

    /// Keep running, refreshing today's times for every configured mosque.
    #[arg(long)]
    watch: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "prayer_times=info,mawaqit_client=info,prayer_cache=info,directory=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Upstream: {}", cfg.upstream.base_url);
    info!(
        "Cache: ttl={}s, cleanup={}s, single_flight={}",
        cfg.cache.ttl_secs, cfg.cache.cleanup_interval_secs, cfg.cache.single_flight
    );

    let client = match MawaqitClient::new(&cfg.upstream) {
        Ok(c) => c,
        Err(e) => {
            error!("Client initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    // ── Shared state ─────────────────────────────────────────────────
    let cache = Arc::new(TtlCache::new(cfg.cache.cleanup_interval()));
    cache.start_reaper();
    let dir = Arc::new(InMemoryDirectory::seeded(&cfg.mosques));
    let service = Arc::new(PrayerTimesService::new(
        cache.clone(),
        Arc::new(client),
        dir.clone(),
        dir,
        &cfg,
    ));

    let outcome = if cli.watch {
        run_watch(&cfg, &service).await
    } else {
        run_once(&cli, &service).await
    };

    // ── Shutdown ─────────────────────────────────────────────────────
    cache.shutdown().await;
    info!("Cache reaper stopped.");

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run_once(cli: &Cli, service: &PrayerTimesService) -> Result<(), Error> {
    let masjid = match &cli.masjid {
        Some(id) => id.clone(),
        None => service.default_masjid().await?,
    };

    if cli.validate {
        let result = service.validate(&masjid).await;
        print_json(&result)?;
        if !result.valid {
            return Err(Error::NotFound(masjid));
        }
        return Ok(());
    }

    if cli.info {
        return print_json(&service.mosque_info(&masjid).await?);
    }

    let today = Local::now().date_naive();

    if cli.night {
        let month = cli.month.unwrap_or(today.month());
        let day = cli.day.unwrap_or(today.day());
        print_json(&service.night_times(&masjid, month, day).await?)?;
    } else if cli.next {
        let (prayer, at) = service.next_prayer(&masjid, Utc::now()).await?;
        print_json(&json!({ "prayer": prayer, "at": at }))?;
    } else {
        let times = match (cli.day, cli.month) {
            (Some(day), Some(month)) => service.by_day_month(&masjid, day, month).await?,
            (Some(day), None) => service.by_day(&masjid, day).await?,
            _ => service.today(&masjid).await?,
        };
        print_json(&times)?;
    }

    if cli.stats {
        print_json(&service.cache_stats().await)?;
    }
    Ok(())
}

async fn run_watch(cfg: &AppConfig, service: &Arc<PrayerTimesService>) -> Result<(), Error> {
    let mut ids: Vec<String> = cfg.mosques.iter().map(|m| m.id.clone()).collect();
    if ids.is_empty() {
        ids.push(service.default_masjid().await?);
    }
    info!("Watching {} mosque(s): {:?}", ids.len(), ids);

    // Task 1: keep today's times warm.
    let refresh_service = service.clone();
    let refresh_every = Duration::from_secs(cfg.watch.refresh_interval_secs);
    let refresh_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            for id in &ids {
                match refresh_service.today(id).await {
                    Ok(times) => info!(
                        "{}: fajr={} dhuhr={} maghreb={} isha={}",
                        id,
                        times.fajr.with_timezone(&Local).format("%H:%M"),
                        times.dhuhr.with_timezone(&Local).format("%H:%M"),
                        times.maghreb.with_timezone(&Local).format("%H:%M"),
                        times.isha.with_timezone(&Local).format("%H:%M"),
                    ),
                    Err(e) => warn!("Refresh failed for {}: {}", id, e),
                }
            }
        }
    });

    // Task 2: heartbeat
    let hb_service = service.clone();
    let hb_every = Duration::from_secs(cfg.watch.heartbeat_interval_secs);
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(hb_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let stats = hb_service.cache_stats().await;
            info!(
                "HEARTBEAT: cache_size={} last_cleanup={} reaper={}",
                stats.cache_size,
                stats.last_cleanup.format("%H:%M:%S"),
                hb_service.cache().is_reaper_running(),
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("prayer-times is running. Press Ctrl+C to stop.");

    let shutdown_reason = supervise(
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        },
        refresh_handle,
        heartbeat_handle,
    )
    .await;

    info!("Watch stopped ({}).", shutdown_reason);
    Ok(())
}

/// Wait for `shutdown` or either task to exit, then abort both tasks so
/// nothing touches the service after the cache is shut down.
async fn supervise(
    shutdown: impl Future<Output = ()>,
    refresh_handle: JoinHandle<()>,
    heartbeat_handle: JoinHandle<()>,
) -> &'static str {
    let refresh_abort = refresh_handle.abort_handle();
    let heartbeat_abort = heartbeat_handle.abort_handle();

    let reason = tokio::select! {
        _ = shutdown => {
            info!("Shutdown signal received");
            "ctrl_c"
        }
        r = refresh_handle => {
            error!("Refresh task exited: {:?}", r);
            "refresh_task_exit"
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
            "heartbeat_task_exit"
        }
    };

    refresh_abort.abort();
    heartbeat_abort.abort();
    reason
}
