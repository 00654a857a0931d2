use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use taskdesk_server::{
    auth::ensure_default_admin, blob::DiskStore, build_router, persist::SaveFile, AppState,
    Settings, SharedState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    // ── Boot ───────────────────────────────────────────────────
    let settings = Settings::load()?;

    let save_file = SaveFile::open(&settings.database_path)?;
    let blobs = Arc::new(DiskStore::open(&settings.upload_dir)?);

    if ensure_default_admin(&save_file, &settings)? {
        tracing::warn!(
            email = %settings.default_admin_email,
            "seeded default admin account; change its password"
        );
    }

    let state: SharedState = Arc::new(AppState::new(&settings, save_file, blobs));

    // ── Revocation sweep ───────────────────────────────────────
    let sweep_state = state.clone();
    let every = Duration::from_secs(settings.revocation_sweep_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = sweep_state.registry.purge_expired(chrono::Utc::now().timestamp());
            if purged > 0 {
                tracing::debug!(purged, remaining = sweep_state.registry.len(), "swept revoked tokens");
            }
        }
    });

    // ── Start ──────────────────────────────────────────────────
    let app = build_router(state, settings.cors_origin.as_deref());

    let addr = settings.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server running");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "profile-console")]
fn init_tracing() {
    console_subscriber::init();
}

#[cfg(not(feature = "profile-console"))]
fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
