//! Logger setup shared by the binaries.

use env_logger::{Builder, Env};

/// Install an `env_logger` writing to stderr.
///
/// `RUST_LOG` overrides `default_filter`. Calling this twice is harmless;
/// the first logger stays in place.
pub fn init(default_filter: &str) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter));
    builder.format_target(false);
    if builder.try_init().is_err() {
        log::debug!("logger already initialised");
    }
}
