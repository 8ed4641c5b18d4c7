use std::sync::Arc;

use svcbus_peer::FramedListener;
use svcbus_service::ServiceServer;
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::demo::{self, Clock, Math};
use crate::exit::{peer_error, service_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_serving, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let listener = FramedListener::bind(&args.path).map_err(|err| peer_error("bind failed", err))?;

    let server = ServiceServer::new(listener);
    server
        .register(Arc::new(Math), demo::math())
        .map_err(|err| service_error("register failed", err))?;
    server
        .register(Arc::new(Clock::new(interval, args.ticks)), demo::clock())
        .map_err(|err| service_error("register failed", err))?;
    server.start();

    print_serving(&args.path, &server.method_names(), &server.event_names(), format);
    info!(socket = %args.path.display(), "serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    info!("interrupted; shutting down");
    server.shutdown();
    Ok(SUCCESS)
}
