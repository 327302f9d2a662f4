use std::io;

/// Install the global subscriber. Logs go to stderr so rendered HTML on stdout stays clean.
pub fn setup_logging(verbose_level: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        // Use RUST_LOG if set
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        // Map verbosity count to filters
        let filter_str = match verbose_level {
            0 => "warn,chat_render=info",
            1 => "info,chat_render=debug",
            _ => "debug,chat_render=trace",
        };
        tracing_subscriber::EnvFilter::new(filter_str)
    };

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(io::stderr)
        .try_init();

    if let Err(err) = result {
        eprintln!("Warning: Could not install log subscriber: {err}");
    }
}
