use clap::Parser;
use std::path::PathBuf;

/// Pushes Screeps player statistics to Graphite.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Additional YAML configuration file, applied on top of the stored configuration.
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON file listing the accounts to track.
    #[clap(long, env = "USERS_FILE", value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    /// Namespace prefix. Metrics are pushed below `<prefix>.screeps`.
    #[clap(long, env = "PREFIX")]
    pub prefix: Option<String>,

    /// Port probed on the candidate hosts when looking for a local private server.
    #[clap(long, env = "SERVER_PORT")]
    pub server_port: Option<u16>,

    /// Graphite plaintext receiver, `host:port`.
    #[clap(long, env = "GRAPHITE_ADDRESS", value_name = "ADDRESS")]
    pub graphite: Option<String>,

    /// Serve the push status endpoint on this port.
    #[clap(long, env = "PUSH_STATUS_PORT")]
    pub push_status_port: Option<u16>,

    /// Collection interval, e.g. `30s` or `1m`.
    #[clap(long, value_name = "DURATION")]
    pub interval: Option<String>,

    /// Also write logs to a file in the data directory.
    #[clap(long = "log-file", action)]
    pub log_file: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(users_file) = &self.users_file {
                cache.insert("users_file".to_string(), users_file.display().to_string().into());
            }
            if let Some(prefix) = &self.prefix {
                cache.insert("sink.prefix".to_string(), prefix.clone().into());
            }
            if let Some(port) = self.server_port {
                cache.insert("probe.port".to_string(), u64::from(port).into());
            }
            if let Some(graphite) = &self.graphite {
                cache.insert("sink.address".to_string(), graphite.clone().into());
            }
            if let Some(port) = self.push_status_port {
                cache.insert("health.port".to_string(), u64::from(port).into());
            }
            if let Some(interval) = &self.interval {
                cache.insert("interval".to_string(), interval.clone().into());
            }
            if self.log_file {
                cache.insert("log_file".to_string(), true.into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();
    let data_dir_path = crate::get_data_dir().display().to_string();

    format!(
        "\
Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
