use std::net::SocketAddr;
use std::sync::Arc;

use rusqlite::Connection;
use tetora_approval::ApprovalGate;
use tetora_core::config::TetoraConfig;
use tetora_dispatcher::Dispatcher;
use tetora_events::EventBroker;
use tetora_router::{NoopClassifier, RoleDescriptor, Router};
use tetora_scheduler::{run_delivery, SchedulerEngine, SchedulerHandle};
use tetora_sessions::SessionManager;
use tetora_slots::{SlotGuard, SlotGuardConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod approval_channel;
mod board;
mod http;
mod post_action;
mod roles;
mod sink;
mod state;
mod summarizer;

use roles::RoleRegistry;
use sink::DispatchSink;
use state::AppState;

/// Spec §6 CLI exit codes.
mod exit_code {
    pub const GENERIC_ERROR: i32 = 1;
    pub const CONFIG_INVALID: i32 = 2;
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tetora_gateway=info,tower_http=debug".into()),
        )
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "gateway exited with an error");
        std::process::exit(exit_code::GENERIC_ERROR);
    }
}

async fn run() -> anyhow::Result<()> {
    // Config errors are fatal at load, reported to stderr, process exits
    // before serving (spec §7) — unlike the teacher's warn-and-fall-back-to-
    // defaults behaviour, since spec draws a hard line here.
    let config_path = std::env::var("TETORA_CONFIG").ok();
    let config = match TetoraConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(exit_code::CONFIG_INVALID);
        }
    };

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let shutdown = CancellationToken::new();
    let events = EventBroker::new();

    let sessions_conn = open_connection(&config.sessions.db_path)?;
    tetora_sessions::db::init_db(&sessions_conn)?;
    let sessions = Arc::new(SessionManager::new(sessions_conn));

    let slots = SlotGuard::new(SlotGuardConfig::from(&config.slots), events.clone());
    {
        let monitor_slots = slots.clone();
        let monitor_shutdown = shutdown.clone();
        tokio::spawn(async move {
            monitor_slots.run_monitor(monitor_shutdown).await;
        });
    }

    let approval_gate = ApprovalGate::new(Vec::<String>::new());

    let role_descriptors: Vec<RoleDescriptor> = config
        .roles
        .iter()
        .map(|(key, role)| RoleDescriptor {
            key: key.clone(),
            description: role.description.clone(),
        })
        .collect();
    let router = Router::new(config.routing.clone(), role_descriptors, Box::new(NoopClassifier));
    let roles = Arc::new(RoleRegistry::new(config.roles.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatcher.clone(),
        slots.clone(),
        events.clone(),
        sessions.clone(),
        Arc::new(summarizer::NoSummarizer),
        Arc::new(tetora_agent::testing::EchoProvider),
        Vec::new(),
        approval_gate.clone(),
        Arc::new(approval_channel::LoggingApprovalChannel),
        std::time::Duration::from_secs(config.dispatcher.default_timeout_secs),
        false,
        config.sessions.compact_threshold,
        Arc::new(post_action::LoggingPostActionSink),
    ));

    let sink = Arc::new(DispatchSink::new(
        dispatcher.clone(),
        roles.clone(),
        config.routing.default_role.clone(),
        shutdown.clone(),
    ));

    let scheduler_db_path = sibling_db_path(&config.sessions.db_path, "scheduler.db");
    let handle_conn = open_connection(&scheduler_db_path)?;
    let scheduler = SchedulerHandle::new(handle_conn)?;

    let (fired_tx, fired_rx) = mpsc::channel(64);
    let engine_conn = open_connection(&scheduler_db_path)?;
    let engine = SchedulerEngine::new(engine_conn, Some(fired_tx))?;
    {
        let (watch_tx, watch_rx) = tokio::sync::watch::channel(false);
        let engine_shutdown = shutdown.clone();
        tokio::spawn(async move {
            engine_shutdown.cancelled().await;
            let _ = watch_tx.send(true);
        });
        tokio::spawn(engine.run(watch_rx));
    }
    {
        let delivery_sink: Arc<dyn tetora_scheduler::JobSink> = sink.clone();
        tokio::spawn(run_delivery(fired_rx, delivery_sink));
    }

    let state = Arc::new(AppState::new(
        config,
        dispatcher.clone(),
        router,
        roles,
        events,
        sessions,
        approval_gate,
        slots,
        scheduler,
        sink,
        shutdown.clone(),
    ));

    let app = http::build_router(state.clone());

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, "tetora gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown.clone(), state))
        .await?;

    Ok(())
}

async fn wait_for_shutdown_signal(shutdown: CancellationToken, state: Arc<AppState>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutting down, cancelling in-flight tasks");
    state.dispatcher.running().cancel_all();
    shutdown.cancel();
}

fn open_connection(path: &str) -> anyhow::Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Connection::open(path)?)
}

fn sibling_db_path(db_path: &str, file_name: &str) -> String {
    let path = std::path::Path::new(db_path);
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(file_name).to_string_lossy().into_owned()
        }
        _ => file_name.to_string(),
    }
}
