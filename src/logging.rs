use eyre::{
    Context as _,
    Result,
};
use stats_pusher_config::Config;
use std::{
    fs::OpenOptions,
    sync::Mutex,
};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

lazy_static::lazy_static! {
    static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

/// `RUST_LOG`, or `info` if unset.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_logging(config: &Config) -> Result<()> {
    let file_layer = if config.log_file {
        let directory = config.data_dir();
        std::fs::create_dir_all(directory)
            .wrap_err_with(|| format!("Failed to create directory {}", directory.display()))?;
        let log_path = directory.join(LOG_FILE.as_str());
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .wrap_err_with(|| format!("Failed to open log file {}", log_path.display()))?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(env_filter()),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(env_filter()))
        .with(file_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .wrap_err("Failed to initialize tracing subscriber")
}
