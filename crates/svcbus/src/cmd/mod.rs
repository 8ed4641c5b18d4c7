use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use svcbus_peer::{connect_with_config, PeerConfig};
use svcbus_service::{ClientConfig, ServiceClient};
use svcbus_transport::Endpoint;

use crate::exit::{peer_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod listen;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host the demo `math` and `clock` services.
    Serve(ServeArgs),
    /// Call a remote method and print the result.
    Call(CallArgs),
    /// Subscribe to a remote event and print pushed values.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(env = "SVCBUS_SOCKET")]
    pub path: PathBuf,
    /// Time between `clock.tick` emissions (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Complete `clock.tick` after this many emissions.
    #[arg(long)]
    pub ticks: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Qualified method name, e.g. `math.add`.
    pub name: String,
    /// Positional arguments as a JSON array.
    #[arg(long, default_value = "[]")]
    pub args: String,
    /// Maximum time to wait for the connection and the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Qualified event name, e.g. `clock.tick`.
    pub name: String,
    /// Exit after receiving N values.
    #[arg(long)]
    pub count: Option<usize>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect to the socket at `path` and wrap the connection in a client proxy.
pub(crate) async fn connect_client(
    path: &Path,
    connect_timeout: Duration,
    config: ClientConfig,
) -> CliResult<ServiceClient> {
    let peer_config = PeerConfig {
        handshake_timeout: connect_timeout,
        ..PeerConfig::default()
    };
    let endpoint = Endpoint::from(path.to_path_buf());
    let transport = connect_with_config(&endpoint, peer_config)
        .await
        .map_err(|err| peer_error("connect failed", err))?;
    Ok(ServiceClient::new(transport, config))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
