use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `fmt` subscriber filtered by `levels`
/// (an `EnvFilter` directive such as `"outlet=debug,warn"`).
///
/// Later calls are ignored, since tests initialize this multiple times.
pub fn init(levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_ansi(false).try_init();
}
