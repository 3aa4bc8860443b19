use std::{net::SocketAddr, sync::Arc};

use tokio::signal;
use tracing::info;

use serviprev_api as api;
use serviprev_api::{events, mercadopago::MercadoPagoClient, services::AppServices, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = Arc::new(api::db::establish_connection(&cfg).await?);
    if cfg.auto_migrate {
        api::db::create_schema(&db).await?;
    }

    let (event_sender, event_rx) = events::channel();
    tokio::spawn(events::process_events(event_rx));

    let mp = Arc::new(MercadoPagoClient::new(cfg.mp_api_base_url.clone()));
    let config = Arc::new(cfg);
    let services = AppServices::build(
        db.clone(),
        mp,
        event_sender.clone(),
        config.clone(),
    );
    let state = AppState::new(db, config.clone(), event_sender, services);

    let app = api::app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("serviprev-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
