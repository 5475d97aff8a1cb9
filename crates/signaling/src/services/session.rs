use crate::connection::{Inbound, PeerHandle};
use crate::registry::PeerRegistry;
use crate::services::handshake::{register_peer, HandshakeError};
use crate::services::router::{route_messages, SessionError};
use crate::services::teardown::remove_peer;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Drives one connection: hello, message loop, cleanup.
///
/// Teardown runs exactly once for every peer that got registered, whatever ended its
/// loop. Peers that fail the hello never reach the registry and are closed by the
/// handshake itself.
#[instrument(skip_all, fields(connection_id = handle.id(), peer = %handle.remote_addr()))]
pub async fn run_peer_session<I: Inbound>(
    mut inbound: I,
    handle: PeerHandle,
    registry: &PeerRegistry,
    keepalive: Duration,
) {
    info!("Connected");
    let role = match register_peer(&mut inbound, &handle, registry, keepalive).await {
        Ok(role) => role,
        Err(HandshakeError::Transport(err)) => {
            info!(error = %err, "Connection ended before registration");
            return;
        }
        Err(err) => {
            warn!(error = %err, "Registration failed");
            return;
        }
    };

    match route_messages(&mut inbound, &handle, role, registry, keepalive).await {
        Ok(()) => info!(?role, "Connection closed, exiting handler"),
        Err(SessionError::Transport(err)) => info!(?role, error = %err, "Connection lost"),
        Err(SessionError::Signal(err)) => error!(?role, error = %err, "Session torn down"),
    }

    if let Err(err) = remove_peer(registry, role, &handle).await {
        error!(?role, error = %err, "Inconsistent registry during teardown");
    }
}
