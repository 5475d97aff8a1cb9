use crate::connection::{PeerHandle, CLOSE_NORMAL};
use crate::registry::PeerRegistry;
use crate::services::handshake::Role;
use crate::services::router::SignalError;
use shared::protocol::ServerMessage;
use tracing::info;

/// Unregisters the peer behind `handle` and tells its counterpart.
///
/// Only entries owned by this very connection are touched, so running it twice, or
/// after the id was handed to a newer client, changes nothing.
pub async fn remove_peer(
    registry: &PeerRegistry,
    role: Role,
    handle: &PeerHandle,
) -> Result<(), SignalError> {
    match role {
        Role::Client(client_id) => {
            let mut table = registry.write().await;
            let owned = table
                .lookup_client(client_id)
                .is_some_and(|client| client.handle.id() == handle.id());
            if !owned {
                return Ok(());
            }

            let media = table.media_server().map(|media| media.handle.clone());
            if let Some(media) = &media {
                let _ = media.send_text(ServerMessage::UnbindSessionClient(client_id).to_string());
            }
            if let Some(client) = table.remove_client(client_id) {
                let _ = client.handle.close(CLOSE_NORMAL, "");
            }
            drop(table);

            if media.is_none() {
                return Err(SignalError::NoMediaToDeregister(client_id));
            }
            info!(client_id, "Cleaned up and disconnected from client");
        }
        Role::Media => {
            let mut table = registry.write().await;
            let owned = table
                .media_server()
                .is_some_and(|media| media.handle.id() == handle.id());
            if !owned {
                return Ok(());
            }
            if let Some(media) = table.clear_media_server() {
                let _ = media.handle.close(CLOSE_NORMAL, "");
            }
            drop(table);

            info!(peer = %handle.remote_addr(), "Cleaned up and disconnected from media server");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{drain, peer, text};
    use crate::connection::Outbound;
    use crate::repository::peer_repository::Peer;

    fn closed_normally(frames: &[Outbound]) -> bool {
        matches!(frames.last(), Some(Outbound::Close { code, .. }) if *code == CLOSE_NORMAL)
    }

    #[tokio::test]
    async fn test_client_teardown_unbinds_once() {
        let registry = PeerRegistry::new(1000);
        let (media, mut media_rx) = peer(1);
        let (client, mut client_rx) = peer(2);
        let id = {
            let mut table = registry.write().await;
            table.set_media_server(Peer::new(media)).unwrap();
            table.add_client(Peer::new(client.clone())).unwrap()
        };

        remove_peer(&registry, Role::Client(id), &client).await.unwrap();
        remove_peer(&registry, Role::Client(id), &client).await.unwrap();

        assert_eq!(
            drain(&mut media_rx),
            vec![text(&format!("UNBIND-SESSION-CLIENT {id}"))]
        );
        assert!(closed_normally(&drain(&mut client_rx)));
        assert!(registry.read().await.lookup_client(id).is_none());
    }

    #[tokio::test]
    async fn test_client_teardown_without_media_still_cleans_up() {
        let registry = PeerRegistry::new(1000);
        let (client, mut client_rx) = peer(2);
        let id = registry
            .write()
            .await
            .add_client(Peer::new(client.clone()))
            .unwrap();

        let err = remove_peer(&registry, Role::Client(id), &client).await.unwrap_err();

        assert!(matches!(err, SignalError::NoMediaToDeregister(client_id) if client_id == id));
        assert!(closed_normally(&drain(&mut client_rx)));
        assert_eq!(registry.read().await.client_count(), 0);
    }

    #[tokio::test]
    async fn test_recycled_id_is_left_alone() {
        let registry = PeerRegistry::new(0);
        let (media, mut media_rx) = peer(1);
        let (old, _old_rx) = peer(2);
        let (new, mut new_rx) = peer(3);
        let id = {
            let mut table = registry.write().await;
            table.set_media_server(Peer::new(media)).unwrap();
            table.add_client(Peer::new(new)).unwrap()
        };

        remove_peer(&registry, Role::Client(id), &old).await.unwrap();

        assert!(drain(&mut media_rx).is_empty());
        assert!(drain(&mut new_rx).is_empty());
        assert_eq!(registry.read().await.lookup_client(id).unwrap().handle.id(), 3);
    }

    #[tokio::test]
    async fn test_media_teardown_clears_slot() {
        let registry = PeerRegistry::new(1000);
        let (media, mut media_rx) = peer(1);
        registry
            .write()
            .await
            .set_media_server(Peer::new(media.clone()))
            .unwrap();

        remove_peer(&registry, Role::Media, &media).await.unwrap();
        remove_peer(&registry, Role::Media, &media).await.unwrap();

        assert!(closed_normally(&drain(&mut media_rx)));
        assert!(registry.read().await.media_server().is_none());
    }

    #[tokio::test]
    async fn test_media_teardown_keeps_other_media() {
        let registry = PeerRegistry::new(1000);
        let (current, mut current_rx) = peer(1);
        let (stale, _stale_rx) = peer(2);
        registry
            .write()
            .await
            .set_media_server(Peer::new(current))
            .unwrap();

        remove_peer(&registry, Role::Media, &stale).await.unwrap();

        assert!(drain(&mut current_rx).is_empty());
        assert_eq!(registry.read().await.media_server().unwrap().handle.id(), 1);
    }
}
