//! Tracing subscriber setup from the `logging` config section.

use tracing_subscriber::EnvFilter;

use gemini_chat_core::config::LoggingConfig;

/// Filter directives: base level plus per-crate overrides.
/// `verbose` forces the base level to `debug`.
fn directives(logging: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level)
        .chain(logging.filters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` wins over the config when set.
pub fn init(logging: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(logging, verbose)));
    let json = logging.format == "json";
    let stdout = logging.output == "stdout";

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}
