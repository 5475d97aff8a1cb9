use crate::connection::{Inbound, PeerHandle, TransportError};
use std::time::Duration;
use tracing::debug;

/// Waits for the next message for as long as it takes.
///
/// Every `timeout` of silence a ping is queued on `handle` so idle connections are not
/// reclaimed by routers in between. Only transport failures end the wait.
pub async fn recv_with_keepalive<I: Inbound>(
    inbound: &mut I,
    handle: &PeerHandle,
    timeout: Duration,
) -> Result<String, TransportError> {
    loop {
        match tokio::time::timeout(timeout, inbound.recv()).await {
            Ok(received) => return received,
            Err(_elapsed) => {
                debug!(peer = %handle.remote_addr(), "Sending keepalive ping");
                handle.ping()?;
            }
        }
    }
}
