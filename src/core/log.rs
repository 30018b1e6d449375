use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Level for this crate's events given the number of `-v` flags. Warnings are
/// always shown, dependencies stay quiet unless `RUST_LOG` says otherwise.
fn app_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub fn init_logging(verbosity: u8) {
    let app_filter = Targets::new().with_target(env!("CARGO_CRATE_NAME"), app_level(verbosity));
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(app_level(verbosity).to_string()));

    let fmt_layer = if verbosity == 0 {
        // Plain one-line warnings for regular runs
        fmt::layer()
            .compact()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .without_time()
            .with_writer(std::io::stderr)
            .boxed()
    };

    // A subscriber may already be installed, e.g. by a test harness
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(app_filter)
        .with(env_filter)
        .try_init();
}
