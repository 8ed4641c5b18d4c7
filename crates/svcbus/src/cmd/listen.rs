use futures_util::StreamExt;
use serde_json::Value;
use svcbus_service::ClientConfig;
use tracing::info;

use crate::cmd::{connect_client, parse_duration, ListenArgs};
use crate::exit::{service_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat, ValueKind};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let client = connect_client(&args.path, timeout, ClientConfig::default()).await?;
    let mut events = client.listen::<Value>(&args.name);

    let mut printed = 0usize;
    loop {
        let next = tokio::select! {
            next = events.next() => next,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };

        match next {
            Some(Ok(value)) => {
                printed = printed.saturating_add(1);
                print_value(ValueKind::Event, &args.name, Some(printed), &value, format);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Some(Err(err)) => return Err(service_error("listen failed", err)),
            None => {
                info!(event = %args.name, received = printed, "event completed");
                break;
            }
        }
    }

    drop(events);
    client.dispose();
    Ok(SUCCESS)
}
