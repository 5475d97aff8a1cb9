use crate::connection::{Inbound, PeerHandle, TransportError};
use crate::keepalive::recv_with_keepalive;
use crate::registry::PeerRegistry;
use crate::services::handshake::Role;
use shared::models::ClientId;
use shared::protocol::{forward_target, MediaMessage, SessionReport};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-message faults caused by what the media server sent. Reported back to it, the
/// connection stays up. The display text is the wire report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("ERROR session: unknown client uid msg {0}")]
    UnknownSessionClient(String),
    #[error("ERROR Unknown SESSION report from server {0}")]
    UnknownSessionReport(String),
    #[error("ERROR bad data sent msg {0}")]
    BadData(String),
    #[error("ERROR forward unknown client uid msg {0}")]
    UnknownForwardTarget(String),
}

/// Registry states that cannot arise while peers follow the protocol.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("no media server to forward client {0} messages to")]
    NoMediaServer(ClientId),
    #[error("no media server to deregister client {0} from")]
    NoMediaToDeregister(ClientId),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Dispatches messages of a registered peer until its connection ends.
///
/// A clean close returns `Ok`; broken transports and structural faults return the cause.
pub async fn route_messages<I: Inbound>(
    inbound: &mut I,
    handle: &PeerHandle,
    role: Role,
    registry: &PeerRegistry,
    keepalive: Duration,
) -> Result<(), SessionError> {
    loop {
        let msg = match recv_with_keepalive(inbound, handle, keepalive).await {
            Ok(msg) => msg,
            Err(TransportError::Closed) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        match role {
            Role::Client(client_id) => forward_to_media(registry, client_id, &msg).await?,
            Role::Media => {
                if let Err(err) = handle_media_message(registry, &msg).await {
                    warn!(error = %err, "Rejected media server message");
                    handle.send_text(err.to_string())?;
                }
            }
        }
    }
}

/// Client traffic goes to the media server untouched.
pub async fn forward_to_media(
    registry: &PeerRegistry,
    client_id: ClientId,
    msg: &str,
) -> Result<(), SignalError> {
    let table = registry.read().await;
    let media = table
        .media_server()
        .ok_or(SignalError::NoMediaServer(client_id))?;
    debug!(client_id, "client -> media server: {msg}");
    if media.handle.send_text(msg).is_err() {
        debug!(client_id, "Media server connection already gone");
    }
    Ok(())
}

pub async fn handle_media_message(registry: &PeerRegistry, msg: &str) -> Result<(), RouteError> {
    match MediaMessage::parse(msg) {
        MediaMessage::Session(report) => apply_session_report(registry, report, msg).await,
        MediaMessage::MalformedSession => Err(RouteError::UnknownSessionReport(msg.to_string())),
        MediaMessage::Forward(raw) => forward_to_client(registry, raw).await,
    }
}

async fn apply_session_report(
    registry: &PeerRegistry,
    report: SessionReport<'_>,
    msg: &str,
) -> Result<(), RouteError> {
    let mut table = registry.write().await;
    let client = match report.client_id() {
        Some(client_id) => table.lookup_client_mut(client_id),
        None => None,
    }
    .ok_or_else(|| RouteError::UnknownSessionClient(msg.to_string()))?;
    let status = report
        .status()
        .ok_or_else(|| RouteError::UnknownSessionReport(msg.to_string()))?;
    client.in_session = status.in_session();
    debug!(client_uid = report.client_uid, ?status, "Session status updated");
    Ok(())
}

async fn forward_to_client(registry: &PeerRegistry, raw: &str) -> Result<(), RouteError> {
    let target = forward_target(raw).map_err(|_| RouteError::BadData(raw.to_string()))?;

    let table = registry.read().await;
    let (client_id, client) = target
        .and_then(|client_id| table.lookup_client(client_id).map(|client| (client_id, client)))
        .ok_or_else(|| RouteError::UnknownForwardTarget(raw.to_string()))?;
    debug!(client_id, "media server -> client: {raw}");
    if client.handle.send_text(raw).is_err() {
        debug!(client_id, "Client connection already gone");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{drain, peer, text};
    use crate::connection::Outbound;
    use crate::repository::peer_repository::Peer;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: PeerRegistry,
        media: PeerHandle,
        media_rx: mpsc::UnboundedReceiver<Outbound>,
        clients: Vec<(ClientId, mpsc::UnboundedReceiver<Outbound>)>,
    }

    async fn fixture(client_count: u64) -> Fixture {
        let registry = PeerRegistry::new(1000);
        let (media, media_rx) = peer(0);
        let mut clients = Vec::new();
        {
            let mut table = registry.write().await;
            table.set_media_server(Peer::new(media.clone())).unwrap();
            for n in 1..=client_count {
                let (handle, rx) = peer(n);
                let id = table.add_client(Peer::new(handle)).unwrap();
                clients.push((id, rx));
            }
        }
        Fixture {
            registry,
            media,
            media_rx,
            clients,
        }
    }

    async fn in_session(registry: &PeerRegistry, id: ClientId) -> bool {
        registry.read().await.lookup_client(id).unwrap().in_session
    }

    fn unused_id(fx: &Fixture) -> ClientId {
        (0..).find(|id| fx.clients.iter().all(|(c, _)| c != id)).unwrap()
    }

    #[tokio::test]
    async fn test_session_reports_toggle_flag() {
        let fx = fixture(1).await;
        let id = fx.clients[0].0;

        handle_media_message(&fx.registry, &format!("SESSION {id} BOUND")).await.unwrap();
        assert!(in_session(&fx.registry, id).await);

        handle_media_message(&fx.registry, &format!("SESSION {id} UNBOUND")).await.unwrap();
        assert!(!in_session(&fx.registry, id).await);
    }

    #[tokio::test]
    async fn test_session_report_for_unknown_client() {
        let fx = fixture(1).await;
        let id = fx.clients[0].0;
        let msg = format!("SESSION {} BOUND", unused_id(&fx));

        let err = handle_media_message(&fx.registry, &msg).await.unwrap_err();

        assert_eq!(err, RouteError::UnknownSessionClient(msg));
        assert!(!in_session(&fx.registry, id).await);
    }

    #[tokio::test]
    async fn test_session_report_with_garbage_uid() {
        let fx = fixture(1).await;
        let err = handle_media_message(&fx.registry, "SESSION one BOUND").await.unwrap_err();
        assert!(matches!(err, RouteError::UnknownSessionClient(_)));
    }

    #[tokio::test]
    async fn test_unknown_session_status() {
        let fx = fixture(1).await;
        let id = fx.clients[0].0;
        handle_media_message(&fx.registry, &format!("SESSION {id} BOUND")).await.unwrap();

        let msg = format!("SESSION {id} PAUSED");
        let err = handle_media_message(&fx.registry, &msg).await.unwrap_err();

        assert_eq!(err, RouteError::UnknownSessionReport(msg));
        assert!(in_session(&fx.registry, id).await);
    }

    #[tokio::test]
    async fn test_forward_reaches_only_target() {
        let mut fx = fixture(3).await;
        let target = fx.clients[1].0;
        let msg = format!(r#"{{"client_uid": {target}, "sdp": {{"type": "offer", "sdp": "v=0"}}}}"#);

        handle_media_message(&fx.registry, &msg).await.unwrap();

        for (id, rx) in fx.clients.iter_mut() {
            let frames = drain(rx);
            if *id == target {
                assert_eq!(frames, vec![text(&msg)]);
            } else {
                assert!(frames.is_empty());
            }
        }
        assert!(drain(&mut fx.media_rx).is_empty());
    }

    #[tokio::test]
    async fn test_forward_without_target_reaches_nobody() {
        let mut fx = fixture(2).await;
        let missing = r#"{"sdp": "v=0"}"#;
        let unknown = format!(r#"{{"client_uid": {}}}"#, unused_id(&fx));

        assert_eq!(
            handle_media_message(&fx.registry, missing).await.unwrap_err(),
            RouteError::UnknownForwardTarget(missing.to_string())
        );
        assert_eq!(
            handle_media_message(&fx.registry, &unknown).await.unwrap_err(),
            RouteError::UnknownForwardTarget(unknown.clone())
        );
        for (_, rx) in fx.clients.iter_mut() {
            assert!(drain(rx).is_empty());
        }
    }

    #[tokio::test]
    async fn test_bad_json_is_terminal_for_message() {
        let mut fx = fixture(1).await;
        let err = handle_media_message(&fx.registry, "{not json").await.unwrap_err();
        assert_eq!(err.to_string(), "ERROR bad data sent msg {not json");
        assert!(drain(&mut fx.clients[0].1).is_empty());
    }

    #[tokio::test]
    async fn test_client_messages_go_to_media_verbatim() {
        let mut fx = fixture(1).await;
        let id = fx.clients[0].0;

        forward_to_media(&fx.registry, id, "candidate:1 1 UDP 2122 ...").await.unwrap();

        assert_eq!(drain(&mut fx.media_rx), vec![text("candidate:1 1 UDP 2122 ...")]);
    }

    #[tokio::test]
    async fn test_client_forward_without_media_is_structural() {
        let fx = fixture(1).await;
        let id = fx.clients[0].0;
        fx.registry.write().await.clear_media_server();

        let err = forward_to_media(&fx.registry, id, "hello").await.unwrap_err();
        assert!(matches!(err, SignalError::NoMediaServer(client) if client == id));
    }

    #[tokio::test]
    async fn test_media_loop_reports_errors_and_keeps_going() {
        let mut fx = fixture(1).await;
        let id = fx.clients[0].0;
        let (tx, mut inbound) = mpsc::unbounded_channel();
        let forward = format!(r#"{{"client_uid": {id}, "ice": "a"}}"#);
        tx.send("SESSION 99999 BOUND".to_string()).unwrap();
        tx.send(forward.clone()).unwrap();
        tx.send(format!("SESSION {id} BOUND")).unwrap();
        drop(tx);

        let result = route_messages(
            &mut inbound,
            &fx.media,
            Role::Media,
            &fx.registry,
            Duration::from_secs(30),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(
            drain(&mut fx.media_rx),
            vec![text("ERROR session: unknown client uid msg SESSION 99999 BOUND")]
        );
        assert_eq!(drain(&mut fx.clients[0].1), vec![text(&forward)]);
        assert!(in_session(&fx.registry, id).await);
    }

    #[tokio::test]
    async fn test_client_loop_ends_when_media_missing() {
        let mut fx = fixture(1).await;
        let (id, _) = fx.clients.remove(0);
        let client = fx.registry.read().await.lookup_client(id).unwrap().handle.clone();
        fx.registry.write().await.clear_media_server();
        let (tx, mut inbound) = mpsc::unbounded_channel();
        tx.send("offer".to_string()).unwrap();

        let result = route_messages(
            &mut inbound,
            &client,
            Role::Client(id),
            &fx.registry,
            Duration::from_secs(30),
        )
        .await;

        assert!(matches!(result, Err(SessionError::Signal(SignalError::NoMediaServer(_)))));
    }
}
