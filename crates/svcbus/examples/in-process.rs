//! Server and client in one process over an in-memory channel.
//!
//! Run with:
//!   cargo run --example in-process

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use svcbus::peer::{FramedClient, FramedListener, PeerConfig};
use svcbus::service::{ClientConfig, ServiceClient, ServiceDescriptor, ServiceServer};
use svcbus::transport::{memory_channel, Endpoint};

struct Greeter {
    greeting: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (acceptor, connector) = memory_channel();

    let server = ServiceServer::new(FramedListener::new(acceptor));
    let greeter = Arc::new(Greeter {
        greeting: "hello".to_string(),
    });
    let descriptor = ServiceDescriptor::new("greeter")
        .method("greet", |greeter: Arc<Greeter>, (name,): (String,)| async move {
            Ok::<_, Infallible>(format!("{}, {name}", greeter.greeting))
        })
        .event("countdown", |_greeter: &Greeter| {
            stream::iter([3, 2, 1]).then(|n| async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                n
            })
        });
    server.register(greeter, descriptor)?;
    server.start();

    let client = ServiceClient::new(
        Arc::new(FramedClient::new(PeerConfig::default())),
        ClientConfig::default(),
    );
    client.connect(&Endpoint::from(connector)).await?;
    let mut countdown = client.listen::<u32>("greeter.countdown");

    let reply: String = client.call("greeter.greet", ("svcbus",)).await?;
    println!("{reply}");

    while let Some(n) = countdown.next().await {
        println!("countdown: {}", n?);
    }

    client.dispose();
    server.shutdown();
    Ok(())
}
