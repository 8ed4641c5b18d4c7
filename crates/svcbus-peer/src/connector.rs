use std::sync::Arc;

use svcbus_transport::Endpoint;

use crate::config::PeerConfig;
use crate::error::Result;
use crate::framed::FramedClient;
use crate::traits::Client;

/// Dial `endpoint` and complete the handshake with default configuration.
pub async fn connect(endpoint: &Endpoint) -> Result<Arc<FramedClient>> {
    connect_with_config(endpoint, PeerConfig::default()).await
}

/// Dial `endpoint` and complete the handshake.
pub async fn connect_with_config(endpoint: &Endpoint, config: PeerConfig) -> Result<Arc<FramedClient>> {
    let client = Arc::new(FramedClient::new(config));
    client.connect(endpoint).await?;
    Ok(client)
}
