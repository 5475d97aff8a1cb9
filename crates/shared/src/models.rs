use serde::{Deserialize, Serialize};

/// Identifier handed to a client in `ASSIGNED UID <id>`.
pub type ClientId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub media_registered: bool,
    pub clients: usize,
    pub keepalive_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatusDto {
    pub client_uid: ClientId,
    pub remote_address: String,
    pub in_session: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatusResponse {
    pub media_server: Option<String>,
    pub clients: Vec<ClientStatusDto>,
}
