use tracing::info;

use courtbook::auth::{TokenKind, TokenService};
use courtbook::config::Config;
use courtbook::engine::Engine;
use courtbook::observability;

const SELFCHECK_SUBJECT: &str = "courtbook-selfcheck";

/// Open the data directory, replay the log, report what it holds, check the
/// token configuration and compact the log once it has grown past the threshold.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing();

    let config = Config::from_env()?;
    observability::init_metrics(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let engine = Engine::new(wal_path.clone())?;
    info!(
        path = %wal_path.display(),
        replayed = engine.replayed_events(),
        "booking store opened"
    );

    let stats = engine.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let tokens = TokenService::from_config(&config.auth);
    let token = tokens.issue(SELFCHECK_SUBJECT, TokenKind::Access)?;
    if !tokens.verify(&token, SELFCHECK_SUBJECT, Some(TokenKind::Access)) {
        return Err("token self-check failed".into());
    }
    info!(
        access_ttl_secs = config.auth.access_ttl.as_secs(),
        refresh_ttl_secs = config.auth.refresh_ttl.as_secs(),
        "token configuration ok"
    );

    if !engine.compact_if_needed(config.compact_threshold).await? {
        info!(
            records = engine.wal_records(),
            threshold = config.compact_threshold,
            "compaction not needed"
        );
    }

    info!("courtbook maintenance finished");
    Ok(())
}
