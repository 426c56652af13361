//! `env_logger` setup.
//!
//! `RUST_LOG` always wins; without it the filter follows the `debug` setting.

use env_logger::Env;

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "info,voice_satellite=debug"
    } else {
        "info"
    }
}

/// Install the global logger.  Later calls are ignored.
pub fn init(debug: bool) {
    let env = Env::default().default_filter_or(default_filter(debug));
    let result = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
    if result.is_err() {
        log::debug!("logger already initialised");
    }
}
