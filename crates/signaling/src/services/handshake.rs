use crate::connection::{Inbound, PeerHandle, TransportError, CLOSE_PROTOCOL_ERROR};
use crate::keepalive::recv_with_keepalive;
use crate::registry::{PeerRegistry, RegistryError};
use crate::repository::peer_repository::Peer;
use shared::models::ClientId;
use shared::protocol::{Hello, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid hello from {0}")]
    InvalidHello(SocketAddr),
    #[error("registration rejected: {0}")]
    Rejected(#[from] RegistryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What a connection registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client(ClientId),
    Media,
}

/// Reads the hello and registers the peer. Rejected peers are closed with
/// [`CLOSE_PROTOCOL_ERROR`] before this returns.
pub async fn register_peer<I: Inbound>(
    inbound: &mut I,
    handle: &PeerHandle,
    registry: &PeerRegistry,
    keepalive: Duration,
) -> Result<Role, HandshakeError> {
    let hello = recv_with_keepalive(inbound, handle, keepalive).await?;
    debug!(peer = %handle.remote_addr(), hello = %hello, "Received hello");

    match Hello::parse(&hello) {
        Some(Hello::Client) => register_client(handle, registry).await.map(Role::Client),
        Some(Hello::Media) => register_media(handle, registry).await.map(|()| Role::Media),
        None => {
            reject(handle, "invalid protocol");
            Err(HandshakeError::InvalidHello(handle.remote_addr()))
        }
    }
}

async fn register_client(
    handle: &PeerHandle,
    registry: &PeerRegistry,
) -> Result<ClientId, HandshakeError> {
    let mut table = registry.write().await;
    let Some(media) = table.media_server().map(|media| media.handle.clone()) else {
        drop(table);
        reject(handle, "no media server registered");
        return Err(RegistryError::NoMediaServer.into());
    };

    let client_id = match table.add_client(Peer::new(handle.clone())) {
        Ok(client_id) => client_id,
        Err(err) => {
            drop(table);
            reject(handle, "client limit reached");
            return Err(err.into());
        }
    };

    // A dead socket on either side surfaces in that side's own receive loop.
    let _ = handle.send_text(ServerMessage::AssignedUid(client_id).to_string());
    if media
        .send_text(ServerMessage::BindSessionClient(client_id).to_string())
        .is_err()
    {
        warn!(client_id, "Media server went away before bind");
    }
    drop(table);

    info!(client_id, peer = %handle.remote_addr(), "Registered client");
    Ok(client_id)
}

async fn register_media(handle: &PeerHandle, registry: &PeerRegistry) -> Result<(), HandshakeError> {
    let mut table = registry.write().await;
    if let Err(err) = table.set_media_server(Peer::new(handle.clone())) {
        drop(table);
        reject(handle, "already connected to a media source");
        warn!(peer = %handle.remote_addr(), "Multiple media server connections detected");
        return Err(err.into());
    }
    let _ = handle.send_text(ServerMessage::Registered.to_string());
    drop(table);

    info!(peer = %handle.remote_addr(), "Registered media server");
    Ok(())
}

fn reject(handle: &PeerHandle, reason: &str) {
    let _ = handle.close(CLOSE_PROTOCOL_ERROR, reason);
}
