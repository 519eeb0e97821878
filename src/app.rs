use color_eyre::Result;
use eyre::Context as _;
use stats_pusher_collector::{
    GraphiteSink,
    Orchestrator,
    PushHealth,
    Scheduler,
};
use stats_pusher_config::Config;
use stats_pusher_http::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct App {
    config: Config,
    health: PushHealth,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            health: PushHealth::default(),
        }
    }

    /// Pushes stats until Ctrl-C is pressed.
    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        let shutdown = CancellationToken::new();

        let sink = Arc::new(GraphiteSink::new(&config.sink.address, config.sink.connect_timeout));
        let orchestrator = Arc::new(Orchestrator::from_config(config, sink, self.health.clone()));
        info!(
            users_file = %config.users_file.display(),
            graphite = %config.sink.address,
            namespace = %config.sink.namespace(),
            "Starting stats pusher"
        );

        let status_server = match config.status_port() {
            Some(port) => {
                let listener = stats_pusher_http::bind(port).await?;
                let state = AppState {
                    health: self.health.clone(),
                    stale_after_minutes: config.health.stale_after_minutes,
                };
                Some(tokio::spawn(stats_pusher_http::serve(listener, state, shutdown.clone())))
            }
            None => None,
        };

        let scheduler = tokio::spawn(Scheduler::new(config.interval).run(orchestrator, shutdown.clone()));

        tokio::signal::ctrl_c()
            .await
            .wrap_err("Failed to listen for Ctrl-C")?;
        info!("Shutting down");
        shutdown.cancel();

        scheduler.await?;
        if let Some(status_server) = status_server {
            status_server.await??;
        }
        Ok(())
    }
}
