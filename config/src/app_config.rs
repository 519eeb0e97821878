use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env,
    path::PathBuf,
};

/// Settings that are derived from the environment rather than read from configuration files.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Where the log file goes.
    #[serde(default)]
    pub data_dir: PathBuf,
}

pub(crate) const PROJECT_NAME: &str = "STATS_PUSHER";

lazy_static::lazy_static! {
    static ref DATA_FOLDER: Option<PathBuf> = dir_from_env("DATA");
    static ref CONFIG_FOLDER: Option<PathBuf> = dir_from_env("CONFIG");
}

/// `STATS_PUSHER_<suffix>`, if set.
fn dir_from_env(suffix: &str) -> Option<PathBuf> {
    env::var_os(format!("{PROJECT_NAME}_{suffix}")).map(PathBuf::from)
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "screepers", "stats-pusher")
}

/// `STATS_PUSHER_DATA`, else the platform's local data directory, else `./.data`.
pub fn get_data_dir() -> PathBuf {
    DATA_FOLDER
        .clone()
        .or_else(|| project_directory().map(|dirs| dirs.data_local_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".").join(".data"))
}

/// `STATS_PUSHER_CONFIG`, else the platform's local config directory, else `./.config`.
pub fn get_config_dir() -> PathBuf {
    CONFIG_FOLDER
        .clone()
        .or_else(|| project_directory().map(|dirs| dirs.config_local_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".").join(".config"))
}
