use dotenvy::dotenv;
use sales_board::{
    config::{database, roster, settings::AppSettings},
    core::{
        reset::{Clock, CycleResetEngine, CycleResetService, SystemClock},
        settings::ensure_currency,
        store::{CycleStore, SeaOrmStore},
    },
    errors::Result,
    realtime::Broadcaster,
    server::{self, AppState},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Settings
    let settings = AppSettings::from_env()
        .inspect_err(|e| error!("Invalid configuration: {}", e))?;
    info!("Loaded settings: {:?}", settings);

    // 4. Database and tables
    let db = database::create_connection(&settings.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    ensure_currency(&db, &settings.default_currency).await?;

    // 5. Roster seeding
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let roster = roster::load_roster(&settings.roster_path)?;
    roster::seed_roster(&db, &roster, clock.now())
        .await
        .inspect_err(|e| error!("Failed to seed roster: {}", e))?;

    // 6. Reset engine and its timer; the first pass runs at startup
    let broadcaster = Arc::new(Broadcaster::new());
    let store = SeaOrmStore::new(Arc::new(db));
    let engine = Arc::new(CycleResetEngine::new(
        Arc::new(store.clone()) as Arc<dyn CycleStore>,
        Arc::clone(&broadcaster),
    ));
    let service = Arc::new(CycleResetService::new(
        Arc::clone(&engine),
        Arc::clone(&clock),
        settings.reset_interval,
    ));
    let service_handle = Arc::clone(&service).start();

    // 7. HTTP server until Ctrl-C
    let state = Arc::new(AppState {
        store,
        broadcaster,
        engine,
        clock,
        admin_token: settings.admin_token.clone(),
    });
    let result = match tokio::net::TcpListener::bind(settings.bind_addr).await {
        Ok(listener) => {
            let stopping = Arc::clone(&service);
            server::serve(listener, state, async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received shutdown signal, stopping...");
                // The reset service stops first, then the server drains
                stopping.shutdown();
            })
            .await
        }
        Err(e) => {
            error!("Failed to bind {}: {}", settings.bind_addr, e);
            Err(e.into())
        }
    };

    // Covers a server that exited without a signal
    service.shutdown();
    if tokio::time::timeout(Duration::from_secs(5), service_handle).await.is_err() {
        warn!("Cycle reset service did not stop within 5s");
    } else {
        info!("Cycle reset service stopped");
    }

    result
}
