use crate::{
    batch::{
        AggregateBatch,
        BatchWriter,
    },
    registry::{
        ResolvedHost,
        TrackedAccount,
    },
    session::SessionStore,
};
use chrono::{
    DateTime,
    Timelike,
    Utc,
};
use eyre::{
    eyre,
    Context as _,
    Result,
};
use serde_json::{
    json,
    Map,
    Value,
};
use stats_pusher_api::{
    ApiTarget,
    RemoteClient,
    Standing,
};
use stats_pusher_config::{
    AccountKind,
    OfficialConfig,
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinSet;

/// Accounts sharing a backend kind and a resolved address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostGroupKey {
    pub kind: AccountKind,
    pub host: ResolvedHost,
}

impl HostGroupKey {
    /// Root URL of the game API, including the season path for seasonal accounts.
    pub fn base_url(&self, official: &OfficialConfig) -> String {
        let ResolvedHost { host, port } = &self.host;
        match self.kind {
            AccountKind::Mmo => format!("{}://{host}:{port}", official.scheme),
            AccountKind::Season => format!("{}://{host}:{port}{}", official.scheme, official.season_path),
            AccountKind::Private => format!("http://{host}:{port}"),
        }
    }
}

impl fmt::Display for HostGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.host)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostGroup {
    pub key: HostGroupKey,
    pub accounts: Vec<TrackedAccount>,
}

/// Groups accounts by kind and host. Accounts keep their relative order within a group.
pub fn partition(accounts: Vec<TrackedAccount>) -> Vec<HostGroup> {
    let mut groups: BTreeMap<HostGroupKey, Vec<TrackedAccount>> = BTreeMap::new();
    for account in accounts {
        let key = HostGroupKey {
            kind: account.kind,
            host: account.host.clone(),
        };
        groups.entry(key).or_default().push(account);
    }
    groups
        .into_iter()
        .map(|(key, accounts)| HostGroup { key, accounts })
        .collect()
}

/// When accounts are due for polling.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    window: Duration,
}

impl Cadence {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Official servers are rate limited: their accounts are polled in the first seconds of a
    /// minute, and of those only every `shards.len()` minutes. Private accounts are always due.
    pub fn is_due(&self, account: &TrackedAccount, now: DateTime<Utc>) -> bool {
        if !account.kind.is_official() {
            return true;
        }
        let in_window = u64::from(now.second()) < self.window.as_secs();
        let shard_count = u32::try_from(account.shards.len()).unwrap_or(u32::MAX).max(1);
        in_window && now.minute() % shard_count == 0
    }
}

/// What happened to a host group during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    /// Fetch tasks launched.
    pub tasks: usize,
    /// Snapshots folded into the batch.
    pub folded: usize,
    /// Fetches that returned nothing usable.
    pub empty: usize,
    pub failed: usize,
    /// Enrichment values replaced by their defaults.
    pub fallbacks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOutcome {
    Folded,
    NoData,
}

/// Fetches and folds the statistics of one host group.
#[derive(Debug, Clone)]
pub struct CollectionCycle {
    client: RemoteClient,
    sessions: SessionStore,
    cadence: Cadence,
    official: OfficialConfig,
}

impl CollectionCycle {
    pub fn new(client: RemoteClient, sessions: SessionStore, cadence: Cadence, official: OfficialConfig) -> Self {
        Self {
            client,
            sessions,
            cadence,
            official,
        }
    }

    pub async fn collect(&self, group: &HostGroup, now: DateTime<Utc>) -> (AggregateBatch, GroupReport) {
        let mut report = GroupReport::default();
        let base_url = group.key.base_url(&self.official);
        let base = match ApiTarget::new(&base_url) {
            Ok(base) => base,
            Err(err) => {
                error!(group = %group.key, url = %base_url, %err, "Invalid server address");
                return (AggregateBatch::default(), report);
            }
        };

        let writer = BatchWriter::default();
        let fallbacks = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        for account in group.accounts.iter().filter(|account| self.cadence.is_due(account, now)) {
            for shard in &account.shards {
                let fetch = Fetch {
                    client: self.client.clone(),
                    sessions: self.sessions.clone(),
                    base: base.clone(),
                    account: account.clone(),
                    shard: shard.clone(),
                    writer: writer.clone(),
                    fallbacks: fallbacks.clone(),
                };
                tasks.spawn(fetch.run());
            }
        }
        report.tasks = tasks.len();
        if report.tasks > 0 {
            info!(group = %group.key, tasks = report.tasks, "Getting stats");
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(FetchOutcome::Folded)) => report.folded += 1,
                Ok(Ok(FetchOutcome::NoData)) => report.empty += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(group = %group.key, "{err:#}");
                }
                Err(err) => {
                    report.failed += 1;
                    error!(group = %group.key, %err, "Fetch task did not complete");
                }
            }
        }
        report.fallbacks = fallbacks.load(Ordering::Relaxed);

        let mut batch = writer.into_batch();
        if !group.key.kind.is_official() {
            self.collect_server_stats(&base, &mut batch).await;
        }
        (batch, report)
    }

    async fn collect_server_stats(&self, base: &ApiTarget, batch: &mut AggregateBatch) {
        let (server, admin) = tokio::join!(self.client.server_stats(base), self.client.admin_server_stats(base));
        match server {
            Ok(Some(stats)) => batch.set_server_stats(stats),
            Ok(None) => {}
            Err(err) => warn!(url = %base.base_url(), %err, "Server stats unavailable"),
        }
        match admin {
            Ok(Some(stats)) => batch.set_admin_stats(stats),
            Ok(None) => {}
            Err(err) => warn!(url = %base.base_url(), %err, "Admin-utils server stats unavailable"),
        }
    }
}

/// One account and shard.
struct Fetch {
    client: RemoteClient,
    sessions: SessionStore,
    base: ApiTarget,
    account: TrackedAccount,
    shard: String,
    writer: BatchWriter,
    fallbacks: Arc<AtomicUsize>,
}

impl Fetch {
    async fn run(self) -> Result<FetchOutcome> {
        let target = self
            .base
            .clone()
            .with_username(&self.account.username)
            .with_token(self.token().await?);

        let fetched = match self.account.segment {
            Some(segment) => self.client.memory_segment(&target, segment, &self.shard).await,
            None => self.client.memory(&target, &self.shard).await,
        };
        let snapshot = match fetched {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(user = %self.account.username, shard = %self.shard, "No stats");
                return Ok(FetchOutcome::NoData);
            }
            Err(err) => {
                if err.is_unauthorized() && self.sessions.forget(&self.account) {
                    debug!(user = %self.account.username, "Dropped rejected session token");
                }
                return Err(err)
                    .wrap_err_with(|| format!("Failed to get stats of {} in {}", self.account.username, self.shard));
            }
        };

        let snapshot = self.enrich(&target, snapshot).await;
        let sink_key = self.account.sink_key();
        info!("Pushing stats for {sink_key} in {}", self.shard);
        self.writer.fold(sink_key, self.shard.as_str(), snapshot);
        Ok(FetchOutcome::Folded)
    }

    /// Official servers get the configured token. Private servers get a cached session token, or
    /// a fresh one from signing in with the password; the configured token is only used by accounts
    /// without a password.
    async fn token(&self) -> Result<Option<String>> {
        let configured = self.account.credentials.token().map(str::to_string);
        if self.account.kind.is_official() {
            return Ok(configured);
        }
        if let Some(token) = self.sessions.get(&self.account) {
            return Ok(Some(token));
        }
        let Some(password) = self.account.credentials.password() else {
            return Ok(configured);
        };
        let target = self.base.clone().with_username(&self.account.username);
        let token = self
            .client
            .sign_in(&target, password)
            .await
            .wrap_err_with(|| format!("Failed to sign in {}", self.account.username))?
            .ok_or_else(|| eyre!("Server returned no token for {}", self.account.username))?;
        self.sessions.store(&self.account, token.clone());
        Ok(Some(token))
    }

    /// Adds `power` and `leaderboard`, falling back to zeroes when the server does not tell.
    async fn enrich(&self, target: &ApiTarget, mut snapshot: Map<String, Value>) -> Map<String, Value> {
        let (me, standing) = tokio::join!(
            self.client.me(target),
            self.client.leaderboard(target, &self.account.username)
        );

        let power = match me {
            Ok(me) => me.and_then(|me| me.get("power").filter(|power| power.is_number()).cloned()),
            Err(err) => {
                debug!(user = %self.account.username, %err, "Self info unavailable");
                None
            }
        };
        let power = power.unwrap_or_else(|| {
            self.fallback("power");
            json!(0)
        });

        let standing = match standing {
            Ok(standing) => standing,
            Err(err) => {
                debug!(user = %self.account.username, %err, "Leaderboard unavailable");
                None
            }
        };
        let standing = standing.unwrap_or_else(|| {
            self.fallback("leaderboard");
            Standing::default()
        });

        snapshot.insert("power".to_string(), power);
        snapshot.insert(
            "leaderboard".to_string(),
            json!({ "rank": standing.rank, "score": standing.score }),
        );
        snapshot
    }

    fn fallback(&self, field: &str) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        warn!(user = %self.account.username, shard = %self.shard, field, "Using default value");
    }
}
