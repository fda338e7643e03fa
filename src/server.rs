//! Server lifecycle: wiring, startup and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;

use crate::api::routes::create_router;
use crate::config::{Environment, SchedulerBackend, Settings};
use crate::db::{establish_async_connection_pool, run_pending_migrations};
use crate::external::{ChatModel, HttpScheduleClient, OpenAiChatModel, ScheduleAdapter};
use crate::jobs::LocalScheduler;
use crate::repositories::Repositories;
use crate::services::Services;
use crate::state::AppState;

pub struct Server {
    settings: Settings,
    environment: Environment,
}

impl Server {
    pub fn new(settings: Settings, environment: Environment) -> Self {
        Self {
            settings,
            environment,
        }
    }

    /// Runs until Ctrl+C or SIGTERM, then drains in-flight workflow runs.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = self.settings;
        let environment = self.environment;

        tracing::info!(
            app_name = %settings.application.name,
            app_version = %crate::pkg_version(),
            environment = %environment.as_str(),
            "Application starting"
        );
        tracing::info!(
            max_connections = settings.database.max_connections,
            min_connections = settings.database.min_connections,
            connection_timeout = settings.database.connection_timeout,
            "Database configuration loaded"
        );
        tracing::info!(
            base_url = %settings.llm.base_url,
            default_model = %settings.llm.default_model,
            priced_models = settings.llm.pricing.len(),
            api_key_configured = !settings.llm.api_key.is_empty(),
            "Model configuration loaded"
        );

        if settings.jwt.secret.is_empty() {
            anyhow::bail!("jwt.secret must be set to verify bearer tokens");
        }
        settings.database.validate()?;

        if settings.database.auto_migrate {
            let applied = run_pending_migrations(&settings.database.url).await?;
            tracing::info!(applied = applied.len(), "Database migrations applied");
        }

        let pool = establish_async_connection_pool(&settings.database).await?;
        tracing::info!("Database connection pool initialized");

        let repos = Repositories::new(pool.clone());
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(&settings.llm));

        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let (schedules, local): (Arc<dyn ScheduleAdapter>, Option<Arc<LocalScheduler>>) =
            match settings.scheduler.backend {
                SchedulerBackend::Local => {
                    let local = Arc::new(LocalScheduler::new(fired_tx).await?);
                    let definitions = repos.workflows.scheduled_definitions().await?;
                    let restored = local.restore(&definitions).await?;
                    tracing::info!(restored, "Local schedules restored");
                    let adapter: Arc<dyn ScheduleAdapter> = local.clone();
                    (adapter, Some(local))
                }
                SchedulerBackend::Http => {
                    tracing::info!(
                        service_url = %settings.scheduler.service_url,
                        "Using the external schedule service"
                    );
                    let adapter: Arc<dyn ScheduleAdapter> =
                        Arc::new(HttpScheduleClient::new(&settings.scheduler));
                    (adapter, None)
                }
            };

        let services = Services::new(repos, &settings, model, schedules);
        if let Some(local) = &local {
            services.runs.forward_scheduled(fired_rx);
            local.start().await?;
            tracing::info!("Local scheduler started");
        }

        let runs = services.runs.clone();
        let state = AppState::new(
            services,
            pool,
            settings.jwt.clone(),
            settings.scheduler.callback_token.clone(),
        );
        let router = create_router(
            state,
            Duration::from_secs(settings.server.request_timeout),
            environment.exposes_api_docs(),
        );

        let address = settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;
        tracing::info!(address = %address, "Server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(local) = &local
            && let Err(e) = local.stop().await
        {
            tracing::warn!(error = %e, "Local scheduler did not stop cleanly");
        }
        runs.shutdown(Duration::from_secs(settings.workflow.shutdown_grace_secs))
            .await;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
