use crate::probe::HostProbe;
use eyre::Result;
use stats_pusher_config::{
    AccountDescriptor,
    AccountKind,
    OfficialConfig,
};
use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
};

/// A host and port a game server answers on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedHost {
    pub host: String,
    pub port: u16,
}

impl ResolvedHost {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ResolvedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How an account authenticates. At least one of password and token is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    Token(String),
    Both { password: String, token: String },
}

impl Credentials {
    fn from_parts(password: Option<String>, token: Option<String>) -> Option<Self> {
        match (password, token) {
            (Some(password), Some(token)) => Some(Credentials::Both { password, token }),
            (Some(password), None) => Some(Credentials::Password(password)),
            (None, Some(token)) => Some(Credentials::Token(token)),
            (None, None) => None,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Credentials::Password(password) | Credentials::Both { password, .. } => Some(password),
            Credentials::Token(_) => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Credentials::Token(token) | Credentials::Both { token, .. } => Some(token),
            Credentials::Password(_) => None,
        }
    }
}

/// A validated account, ready to be polled.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedAccount {
    pub username: String,
    pub replace_name: Option<String>,
    pub kind: AccountKind,
    pub host: ResolvedHost,
    pub credentials: Credentials,
    pub prefix: Option<String>,
    pub segment: Option<u32>,
    pub shards: Vec<String>,
}

impl TrackedAccount {
    /// The name the account is published under.
    pub fn display_name(&self) -> &str {
        self.replace_name.as_deref().unwrap_or(&self.username)
    }

    /// The key below `stats` the account's snapshots are stored at.
    pub fn sink_key(&self) -> String {
        match self.prefix.as_deref() {
            Some(prefix) => format!("{prefix}.{}", self.display_name()),
            None => self.display_name().to_string(),
        }
    }
}

/// Why an entry of the users file is not polled.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Malformed entry: {0}")]
    Malformed(String),
    #[error("Missing username")]
    MissingUsername,
    #[error("Missing type and host")]
    MissingType,
    #[error("Invalid type `{0}`")]
    InvalidType(String),
    #[error("No local server available and no host given")]
    NoLocalServer,
    #[error("Missing host or port")]
    MissingHostOrPort,
    #[error("Missing password or token")]
    MissingCredentials,
    #[error("Missing shards")]
    MissingShards,
}

/// Dots are path separators in the metric tree, so they are dropped from names.
pub fn replacement_name(username: &str) -> Option<String> {
    username.contains('.').then(|| username.replace('.', ""))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn needs_local_server(descriptor: &AccountDescriptor) -> bool {
    let private = match non_empty(descriptor.kind.clone()) {
        Some(kind) => AccountKind::from_str(&kind).is_ok_and(|kind| kind == AccountKind::Private),
        None => false,
    };
    private && non_empty(descriptor.host.clone()).is_none()
}

/// Checks one entry and fills in what can be derived. The first failing check decides the
/// rejection.
pub fn validate(
    descriptor: AccountDescriptor,
    local_server: Option<&ResolvedHost>,
    official: &OfficialConfig,
) -> Result<TrackedAccount, Rejection> {
    let username = non_empty(descriptor.username).ok_or(Rejection::MissingUsername)?;
    let replace_name = non_empty(descriptor.replace_name).or_else(|| replacement_name(&username));

    let explicit_host = non_empty(descriptor.host);
    let kind = match non_empty(descriptor.kind) {
        Some(kind) => AccountKind::from_str(&kind).map_err(|_| Rejection::InvalidType(kind))?,
        None if explicit_host.is_some() => AccountKind::Private,
        None => return Err(Rejection::MissingType),
    };

    let host = match (explicit_host, kind) {
        (Some(host), AccountKind::Private) => {
            ResolvedHost::new(host, descriptor.port.ok_or(Rejection::MissingHostOrPort)?)
        }
        (Some(host), _) => ResolvedHost::new(host, descriptor.port.unwrap_or(official.port)),
        (None, AccountKind::Private) => local_server.cloned().ok_or(Rejection::NoLocalServer)?,
        (None, _) => ResolvedHost::new(official.host.clone(), official.port),
    };
    if host.port == 0 {
        return Err(Rejection::MissingHostOrPort);
    }

    let credentials = Credentials::from_parts(non_empty(descriptor.password), non_empty(descriptor.token))
        .ok_or(Rejection::MissingCredentials)?;

    let shards = descriptor
        .shards
        .filter(|shards| !shards.is_empty() && shards.iter().all(|shard| !shard.trim().is_empty()))
        .ok_or(Rejection::MissingShards)?;

    Ok(TrackedAccount {
        username,
        replace_name,
        kind,
        host,
        credentials,
        prefix: non_empty(descriptor.prefix),
        segment: descriptor.segment,
        shards,
    })
}

/// Reads the users file and turns it into the accounts to poll.
#[derive(Debug, Clone)]
pub struct UserRegistry {
    users_file: PathBuf,
    probe: HostProbe,
    official: OfficialConfig,
}

impl UserRegistry {
    pub fn new(users_file: impl Into<PathBuf>, probe: HostProbe, official: OfficialConfig) -> Self {
        Self {
            users_file: users_file.into(),
            probe,
            official,
        }
    }

    /// Loads the users file afresh. Invalid entries are logged and skipped; only an unreadable
    /// file is an error.
    pub async fn load(&self) -> Result<Vec<TrackedAccount>> {
        let entries = AccountDescriptor::load_all(&self.users_file)?;
        Ok(self.resolve(entries).await)
    }

    /// Validates entries in file order. The local server is looked up at most once, and only if an
    /// entry depends on it.
    pub async fn resolve(&self, entries: Vec<Result<AccountDescriptor, serde_json::Error>>) -> Vec<TrackedAccount> {
        let local_server = if entries.iter().flatten().any(needs_local_server) {
            self.probe.discover().await
        } else {
            None
        };

        let total = entries.len();
        let mut accounts = Vec::with_capacity(total);
        for (index, entry) in entries.into_iter().enumerate() {
            let username = entry
                .as_ref()
                .ok()
                .and_then(|descriptor| descriptor.username.clone())
                .unwrap_or_default();
            let checked = entry
                .map_err(|err| Rejection::Malformed(err.to_string()))
                .and_then(|descriptor| validate(descriptor, local_server.as_ref(), &self.official));
            match checked {
                Ok(account) => accounts.push(account),
                Err(rejection) => warn!(index, username = %username, %rejection, "Ignoring user"),
            }
        }

        info!("Loaded {} users (out of {total})", accounts.len());
        accounts
    }
}
