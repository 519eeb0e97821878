use crate::{
    race::first_success,
    registry::ResolvedHost,
};
use stats_pusher_config::ProbeConfig;
use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::{
        Duration,
        Instant,
    },
};
use tokio::net::TcpStream;

/// Bounds of a single connection attempt.
pub const CONNECT_TIMEOUT_RANGE: (Duration, Duration) = (Duration::from_millis(200), Duration::from_millis(2500));

/// Looks for a private game server listening on one of a fixed set of local candidate hosts.
#[derive(Debug, Clone)]
pub struct HostProbe {
    candidates: Vec<String>,
    port: u16,
    connect_timeout: Duration,
    overall_timeout: Duration,
    cache_ttl: Duration,
    found: Arc<Mutex<Option<(ResolvedHost, Instant)>>>,
}

impl HostProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        let (min, max) = CONNECT_TIMEOUT_RANGE;
        let connect_timeout = config.connect_timeout.clamp(min, max);
        if connect_timeout != config.connect_timeout {
            warn!(
                configured = ?config.connect_timeout,
                used = ?connect_timeout,
                "Probe connect timeout out of range"
            );
        }
        Self {
            candidates: config.candidates.clone(),
            port: config.port,
            connect_timeout,
            overall_timeout: config.overall_timeout,
            cache_ttl: config.cache_ttl,
            found: Arc::default(),
        }
    }

    /// The previously found host while it is still trusted, else the result of a fresh
    /// [`HostProbe::find`]. A miss is never remembered.
    pub async fn discover(&self) -> Option<ResolvedHost> {
        if let Some(host) = self.cached() {
            trace!(%host, "using previously found server");
            return Some(host);
        }
        let found = self.find().await;
        if let Some(host) = &found {
            *self.found.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((host.clone(), Instant::now()));
        }
        found
    }

    /// Connects to every candidate at once. The first candidate accepting a connection wins; its
    /// connection is closed right away and every other attempt is cancelled.
    pub async fn find(&self) -> Option<ResolvedHost> {
        info!("Checking for local server");
        let port = self.port;
        let connect_timeout = self.connect_timeout;
        let attempts = self.candidates.iter().cloned().map(move |host| async move {
            let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host.as_str(), port)))
                .await
                .map_err(|_| format!("{host}:{port} timed out"))?
                .map_err(|err| format!("{host}:{port} refused: {err}"))?;
            drop(stream);
            Ok::<_, String>(host)
        });

        let found = first_success(attempts, self.overall_timeout)
            .await
            .map(|host| ResolvedHost::new(host, port));
        match &found {
            Some(host) => info!(%host, "Found server"),
            None => info!("No local server found"),
        }
        found
    }

    fn cached(&self) -> Option<ResolvedHost> {
        let found = self.found.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        found
            .as_ref()
            .filter(|(_, at)| at.elapsed() < self.cache_ttl)
            .map(|(host, _)| host.clone())
    }
}
