//! Calls the demo `math` service of a running `svcbus serve`.
//!
//! Run with:
//!   cargo run --features cli -- serve /tmp/svcbus-demo.sock
//!
//! In another terminal:
//!   cargo run --example unix-socket -- /tmp/svcbus-demo.sock

use std::path::PathBuf;

use svcbus::peer::connect;
use svcbus::service::{ClientConfig, ServiceClient, ServiceError};
use svcbus::transport::Endpoint;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/svcbus-demo.sock"));

    let transport = connect(&Endpoint::from(path)).await?;
    eprintln!("connected as {}", svcbus::peer::Client::id(transport.as_ref()));
    let client = ServiceClient::new(transport, ClientConfig::default());

    let sum: i64 = client.call("math.add", (2, 3)).await?;
    let product: i64 = client.call("math.multiply", (6, 7)).await?;
    println!("2 + 3 = {sum}, 6 * 7 = {product}");

    match client.call::<_, f64>("math.divide", (1, 0)).await {
        Err(ServiceError::InvocationFailure(reason)) => println!("1 / 0 failed: {reason}"),
        other => println!("unexpected: {other:?}"),
    }

    client.dispose();
    Ok(())
}
