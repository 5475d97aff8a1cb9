use crate::connection::PeerHandle;
use crate::registry::RegistryError;
use rand::Rng;
use shared::models::ClientId;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Random draws before falling back to a scan of the id range.
const RANDOM_ALLOCATION_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub struct Peer {
    pub handle: PeerHandle,
    pub remote_addr: SocketAddr,
    pub in_session: bool,
}

impl Peer {
    pub fn new(handle: PeerHandle) -> Self {
        Self {
            remote_addr: handle.remote_addr(),
            handle,
            in_session: false,
        }
    }
}

/// Registered peers: the media endpoint slot and the client map.
///
/// Plain data, no locking; [`crate::registry::PeerRegistry`] serializes access.
#[derive(Debug)]
pub struct PeerTable {
    clients: HashMap<ClientId, Peer>,
    media_server: Option<Peer>,
    max_clients: ClientId,
}

impl PeerTable {
    pub fn new(max_clients: ClientId) -> Self {
        Self {
            clients: HashMap::new(),
            media_server: None,
            max_clients,
        }
    }

    /// Stores `peer` under a random id from `0..=max_clients` not currently in use.
    pub fn add_client(&mut self, peer: Peer) -> Result<ClientId, RegistryError> {
        let client_id = self.allocate_id()?;
        self.clients.insert(client_id, peer);
        Ok(client_id)
    }

    fn allocate_id(&self) -> Result<ClientId, RegistryError> {
        let capacity = u64::from(self.max_clients) + 1;
        if self.clients.len() as u64 >= capacity {
            return Err(RegistryError::IdSpaceExhausted);
        }
        let mut rng = rand::rng();
        for _ in 0..RANDOM_ALLOCATION_ATTEMPTS {
            let candidate = rng.random_range(0..=self.max_clients);
            if !self.clients.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        // Almost full: take the first hole instead of drawing forever.
        (0..=self.max_clients)
            .find(|candidate| !self.clients.contains_key(candidate))
            .ok_or(RegistryError::IdSpaceExhausted)
    }

    /// No-op when `client_id` is absent.
    pub fn remove_client(&mut self, client_id: ClientId) -> Option<Peer> {
        self.clients.remove(&client_id)
    }

    pub fn lookup_client(&self, client_id: ClientId) -> Option<&Peer> {
        self.clients.get(&client_id)
    }

    pub fn lookup_client_mut(&mut self, client_id: ClientId) -> Option<&mut Peer> {
        self.clients.get_mut(&client_id)
    }

    pub fn clients(&self) -> impl Iterator<Item = (ClientId, &Peer)> {
        self.clients.iter().map(|(id, peer)| (*id, peer))
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn set_media_server(&mut self, peer: Peer) -> Result<(), RegistryError> {
        if self.media_server.is_some() {
            return Err(RegistryError::MediaServerAlreadyRegistered);
        }
        self.media_server = Some(peer);
        Ok(())
    }

    pub fn clear_media_server(&mut self) -> Option<Peer> {
        self.media_server.take()
    }

    pub fn media_server(&self) -> Option<&Peer> {
        self.media_server.as_ref()
    }
}
