//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with an explicit default level
///
/// `RUST_LOG` still overrides the level when set. Returns `false` when a
/// logger was already installed, in which case the call changes nothing.
pub fn init_with_level(level: &str) -> bool {
    let filter = level.parse().unwrap_or(log::LevelFilter::Info);
    match env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            debug!("Logger already installed, keeping it: {}", err);
            false
        }
    }
}
