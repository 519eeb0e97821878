use crate::{
    cycle::{
        partition,
        Cadence,
        CollectionCycle,
        GroupReport,
        HostGroup,
        HostGroupKey,
    },
    health::PushHealth,
    probe::HostProbe,
    publisher::{
        MetricsSink,
        PublishError,
        PublishOutcome,
        Publisher,
    },
    registry::UserRegistry,
    scheduler::TickHandler,
    session::SessionStore,
};
use chrono::{
    DateTime,
    Utc,
};
use eyre::Result;
use futures::future::join_all;
use stats_pusher_api::RemoteClient;
use stats_pusher_config::Config;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
};

/// What one host group produced during a tick.
#[derive(Debug)]
pub struct GroupOutcome {
    pub key: HostGroupKey,
    pub report: GroupReport,
    pub publish: Result<PublishOutcome, PublishError>,
}

/// Runs complete ticks: load the users, collect every host group and publish each group's batch.
pub struct Orchestrator {
    registry: UserRegistry,
    cycle: CollectionCycle,
    publisher: Publisher,
}

impl Orchestrator {
    pub fn new(registry: UserRegistry, cycle: CollectionCycle, publisher: Publisher) -> Self {
        Self {
            registry,
            cycle,
            publisher,
        }
    }

    pub fn from_config(config: &Config, sink: Arc<dyn MetricsSink>, health: PushHealth) -> Self {
        let registry = UserRegistry::new(
            &config.users_file,
            HostProbe::new(&config.probe),
            config.official.clone(),
        );
        let cycle = CollectionCycle::new(
            RemoteClient::new(config.request_timeout),
            SessionStore::default(),
            Cadence::new(config.cadence.window),
            config.official.clone(),
        );
        let publisher = Publisher::new(sink, config.sink.namespace(), health);
        Self::new(registry, cycle, publisher)
    }

    /// Host groups are handled concurrently. Only an unreadable users file fails the tick.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<Vec<GroupOutcome>> {
        let accounts = self.registry.load().await?;
        let groups = partition(accounts);
        Ok(join_all(groups.iter().map(|group| self.run_group(group, now))).await)
    }

    async fn run_group(&self, group: &HostGroup, now: DateTime<Utc>) -> GroupOutcome {
        let (batch, report) = self.cycle.collect(group, now).await;
        let publish = self.publisher.publish(batch, now).await;
        match &publish {
            Ok(PublishOutcome::Pushed { metrics }) => {
                info!(group = %group.key, metrics, "Pushed stats to {}", self.publisher.sink_name())
            }
            Ok(PublishOutcome::NothingToPush) if report.tasks > 0 => info!(group = %group.key, "No stats to push"),
            Ok(PublishOutcome::NothingToPush) => debug!(group = %group.key, "No accounts due"),
            Err(err) => error!(group = %group.key, %err, "Error while pushing stats"),
        }
        if report.failed > 0 || report.fallbacks > 0 {
            warn!(
                group = %group.key,
                failed = report.failed,
                fallbacks = report.fallbacks,
                "Incomplete stats"
            );
        }
        GroupOutcome {
            key: group.key.clone(),
            report,
            publish,
        }
    }
}

impl TickHandler for Orchestrator {
    fn on_tick(&self, now: DateTime<Utc>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(err) = self.run_tick(now).await {
                error!("Tick failed: {err:#}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::tests::MemorySink;
    use axum::{
        routing::get,
        Json,
        Router,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stats_pusher_api::payload::encode_compressed;

    async fn private_server() -> std::net::SocketAddr {
        let data = encode_compressed(&json!({"gcl": 5})).unwrap();
        let router = Router::new()
            .route(
                "/api/user/memory",
                get(move || {
                    let data = data.clone();
                    async move { Json(json!({"ok": 1, "data": data})) }
                }),
            )
            .route("/api/auth/me", get(|| async { Json(json!({"power": 7})) }))
            .route(
                "/api/leaderboard/find",
                get(|| async { Json(json!({"list": [{"rank": 9, "score": 100}, {"rank": 4, "score": 250}]})) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn pushes_every_group_of_a_tick() {
        let addr = private_server().await;
        let dir = temp_dir::TempDir::new().unwrap();
        let users_file = dir.child("users.json");
        std::fs::write(
            &users_file,
            json!([
                {"username": "alice", "type": "private", "host": addr.ip().to_string(), "port": addr.port(), "token": "t", "shards": ["shard0"]},
                {"username": "nobody"}
            ])
            .to_string(),
        )
        .unwrap();

        let mut config = Config::default();
        config.users_file = users_file;
        config.sink.prefix = Some("team".to_string());
        let sink = Arc::new(MemorySink::default());
        let orchestrator = Orchestrator::from_config(&config, sink.clone(), PushHealth::default());

        let now = Utc::now();
        let outcomes = orchestrator.run_tick(now).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].publish, Ok(PublishOutcome::Pushed { metrics: 4 })));

        let ts = now.timestamp();
        let writes = sink.writes.lock().unwrap();
        assert_eq!(
            *writes,
            vec![vec![
                format!("team.screeps.stats.alice.shard0.gcl 5 {ts}"),
                format!("team.screeps.stats.alice.shard0.leaderboard.rank 4 {ts}"),
                format!("team.screeps.stats.alice.shard0.leaderboard.score 250 {ts}"),
                format!("team.screeps.stats.alice.shard0.power 7 {ts}"),
            ]]
        );
    }

    #[tokio::test]
    async fn missing_users_file_fails_the_tick() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut config = Config::default();
        config.users_file = dir.child("missing.json");
        let orchestrator = Orchestrator::from_config(&config, Arc::new(MemorySink::default()), PushHealth::default());

        assert!(orchestrator.run_tick(Utc::now()).await.is_err());
    }
}
