#[macro_use]
extern crate tracing;

mod app;
pub mod logging;

pub use app::App;
use color_eyre::Result;
pub use logging::init_logging;
pub use stats_pusher_config::{
    Args,
    Config,
};

/// Installs the `color-eyre` report handler and routes panics through tracing as well.
pub fn init_errors() -> Result<()> {
    color_eyre::install()?;
    let report_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("{info}");
        report_panic(info);
    }));
    Ok(())
}
