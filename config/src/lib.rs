#[macro_use]
extern crate tracing;

mod account;
mod app_config;
mod args;

pub use account::{
    AccountDescriptor,
    AccountKind,
};
use app_config::AppConfig;
pub use app_config::{
    get_config_dir,
    get_data_dir,
};
pub use args::Args;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    pub app_config: AppConfig,
    pub users_file: PathBuf,
    #[serde(with = "humantime_str")]
    pub interval: Duration,
    #[serde(with = "humantime_str")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub log_file: bool,
    pub sink: SinkConfig,
    pub probe: ProbeConfig,
    pub official: OfficialConfig,
    pub cadence: CadenceConfig,
    pub health: HealthConfig,
}

/// Where and under which namespace metrics are written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SinkConfig {
    pub address: String,
    pub root: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(with = "humantime_str")]
    pub connect_timeout: Duration,
}

impl SinkConfig {
    /// The top-level key all metrics are pushed below: `<prefix>.<root>`, or just `<root>`.
    pub fn namespace(&self) -> String {
        match self.prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}.{}", self.root),
            _ => self.root.clone(),
        }
    }
}

/// Discovery of a private server running next to the pusher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub candidates: Vec<String>,
    pub port: u16,
    #[serde(with = "humantime_str")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_str")]
    pub overall_timeout: Duration,
    /// How long a discovered host is trusted before it is probed again. Zero probes on every load.
    #[serde(with = "humantime_str")]
    pub cache_ttl: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OfficialConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub season_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Official accounts are only polled during this many seconds at the start of a minute.
    #[serde(with = "humantime_str")]
    pub window: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub port: Option<u16>,
    pub stale_after_minutes: u64,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layers, lowest precedence first: embedded defaults, `config.yaml` in the config directory,
    /// the file passed with `--config`, `STATS_PUSHER__*` environment variables, command-line
    /// arguments.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let data_dir = get_data_dir();
        let config_dir = get_config_dir();
        let mut builder =
            config::Config::builder().set_default("data_dir", data_dir.to_string_lossy().to_string())?;

        builder = builder.add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        if let Some(path) = &args.config {
            debug!(?path, "Adding configuration file from args");
            builder = builder.add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(app_config::PROJECT_NAME)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    pub fn data_dir(&self) -> &Path {
        &self.app_config.data_dir
    }

    /// The push status port, if the endpoint is enabled. Port zero disables it.
    pub fn status_port(&self) -> Option<u16> {
        self.health.port.filter(|port| *port != 0)
    }
}

mod humantime_str {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
