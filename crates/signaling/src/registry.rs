use crate::repository::peer_repository::PeerTable;
use shared::models::{ClientId, ClientStatusDto, RegistryStatusResponse};
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no media server registered")]
    NoMediaServer,
    #[error("a media server is already registered")]
    MediaServerAlreadyRegistered,
    #[error("client id space exhausted")]
    IdSpaceExhausted,
}

/// Process-wide peer state shared by every connection task.
///
/// All decisions that depend on who is registered are taken while holding one of the
/// guards, and frames are only enqueued under it, never awaited.
#[derive(Debug)]
pub struct PeerRegistry {
    table: RwLock<PeerTable>,
}

impl PeerRegistry {
    pub fn new(max_clients: ClientId) -> Self {
        Self {
            table: RwLock::new(PeerTable::new(max_clients)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, PeerTable> {
        self.table.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, PeerTable> {
        self.table.write().await
    }

    pub async fn snapshot(&self) -> RegistryStatusResponse {
        let table = self.table.read().await;
        let mut clients: Vec<ClientStatusDto> = table
            .clients()
            .map(|(client_uid, peer)| ClientStatusDto {
                client_uid,
                remote_address: peer.remote_addr.to_string(),
                in_session: peer.in_session,
            })
            .collect();
        clients.sort_by_key(|client| client.client_uid);

        RegistryStatusResponse {
            media_server: table
                .media_server()
                .map(|media| media.remote_addr.to_string()),
            clients,
        }
    }
}
