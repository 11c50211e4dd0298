use log::{error, info, warn};
use mmscore::leaderboard::LeaderboardAggregator;
use mmscore::metrics::Metrics;
use mmscore::state::app_settings::AppSettings;
use mmscore::state::cache::ResultCache;
use mmscore::state::refresher::Poller;
use mmscore::state::synchronizer::MasterBracketSynchronizer;
use mmscore::store::MemoryStore;
use ncaa_api::client::NcaaApi;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if handle_cli_args() {
        return Ok(());
    }

    better_panic::install();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = AppSettings::load()?;
    info!("starting mmscore {} with {settings:?}", env!("CARGO_PKG_VERSION"));

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(NcaaApi::new(
        settings.source_url.clone(),
        settings.api_key.clone(),
        settings.fetch_timeout,
    ));
    let sync = Arc::new(MasterBracketSynchronizer::new(
        source,
        store.clone(),
        Arc::new(ResultCache::new()),
        Arc::new(settings.rate_limiter()),
        metrics.clone(),
        settings.sync_config(),
    ));
    let leaderboard = LeaderboardAggregator::new(store, sync.clone(), metrics.clone());

    // Warm the cache. A failure here is not fatal; the poller will retry.
    match sync.get_master_bracket().await {
        Ok(bracket) => info!(
            "master bracket {} loaded with {} games",
            bracket.year,
            bracket.games.len()
        ),
        Err(e) => warn!("initial master bracket load failed: {e}"),
    }

    let poller = Poller::new(sync, settings.poll_schedule());
    poller.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("unable to listen for shutdown signal: {e}");
    }
    info!("shutting down");
    poller.stop().await;

    match leaderboard.get_leaderboard(None).await {
        Ok(board) => info!("leaderboard holds {} ranked entries", board.len()),
        Err(e) => warn!("leaderboard unavailable: {e}"),
    }

    info!("final metrics:\n{}", metrics.render());
    Ok(())
}

fn handle_cli_args() -> bool {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        return false;
    };

    match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            true
        }
        "-V" | "--version" => {
            println!("mmscore {}", env!("CARGO_PKG_VERSION"));
            true
        }
        _ => {
            eprintln!("Unknown argument: {arg}\n\n{}", usage_text());
            std::process::exit(2);
        }
    }
}

fn usage_text() -> &'static str {
    "mmscore - NCAA March Madness master bracket sync and scoring daemon

Usage:
  mmscore
  mmscore --help
  mmscore --version

Environment:
  MMSCORE_API_KEY                   Bearer credential for the results feed (required)
  MMSCORE_SOURCE_URL                Results feed base URL
  MMSCORE_POLL_INTERVAL_MS          Peak-hours poll interval (default 60000)
  MMSCORE_PEAK_HOURS                Local peak hours, START-END (default 12-23)
  MMSCORE_OFF_PEAK_MULTIPLIER       Off-peak interval multiple (default 6)
  MMSCORE_MAX_ATTEMPTS              Fetch attempts per poll (default 3)
  MMSCORE_RETRY_BASE_MS             First retry delay, doubled each retry (default 1000)
  MMSCORE_RATE_LIMIT                Fetches allowed per interval (default 30)
  MMSCORE_RATE_LIMIT_INTERVAL_SECS  Rate-limit interval (default 60)
  MMSCORE_CACHE_TTL_SECS            Master bracket cache lifetime (default 300)
  MMSCORE_FETCH_TIMEOUT_MS          Per-attempt fetch timeout (default 10000)
  MMSCORE_TOURNAMENT_YEAR           Tournament year (default: current season)
  RUST_LOG                          Log filter (default info)"
}
