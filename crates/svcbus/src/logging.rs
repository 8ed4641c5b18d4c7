use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Crates whose events the CLI shows at `--log-level`.
const SVCBUS_TARGETS: &[&str] = &[
    "svcbus",
    "svcbus_transport",
    "svcbus_frame",
    "svcbus_peer",
    "svcbus_service",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// `svcbus=<level>,svcbus_peer=<level>,...`; other crates stay at `warn`.
fn default_directives(level: LogLevel) -> String {
    let mut directives = String::from("warn");
    for target in SVCBUS_TARGETS {
        directives.push_str(&format!(",{target}={}", level.as_str()));
    }
    directives
}

/// `RUST_LOG` wins when set and valid.
fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the stderr subscriber. Stdout carries command output only.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level))
        .with_ansi(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_scope_level_to_svcbus_crates() {
        let directives = default_directives(LogLevel::Debug);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("svcbus=debug"));
        assert!(directives.contains("svcbus_service=debug"));
        assert!(directives.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn quiet_levels_still_parse() {
        assert!(default_directives(LogLevel::Error)
            .parse::<EnvFilter>()
            .is_ok());
    }
}
