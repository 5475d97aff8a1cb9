use shared::models::ClientId;
use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

const DEFAULT_LISTEN_PORT: u16 = 8443;
const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CLIENTS: ClientId = 1000;

#[derive(Debug, Clone)]
pub struct SignalingServerConfig {
    pub listen_addr: SocketAddr,
    /// Silence on a connection longer than this triggers a ping.
    pub keepalive_timeout: Duration,
    /// Client ids are drawn from `0..=max_clients`.
    pub max_clients: ClientId,
}

impl SignalingServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_port = env::var("SIGNALING_PORT")
            .ok()
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(DEFAULT_LISTEN_PORT);

        let listen_addr = env::var("SIGNALING_ADDR")
            .ok()
            .and_then(|raw| raw.parse::<IpAddr>().ok())
            .map(|ip| SocketAddr::new(ip, listen_port))
            .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), listen_port));

        let keepalive_timeout = env::var("SIGNALING_KEEPALIVE_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_KEEPALIVE_TIMEOUT_SECS));
        if keepalive_timeout.is_zero() {
            anyhow::bail!("SIGNALING_KEEPALIVE_SECS must be greater than zero");
        }

        let max_clients = env::var("SIGNALING_MAX_CLIENTS")
            .ok()
            .and_then(|raw| raw.parse::<ClientId>().ok())
            .unwrap_or(DEFAULT_MAX_CLIENTS);

        Ok(Self {
            listen_addr,
            keepalive_timeout,
            max_clients,
        })
    }

    /// Same settings bound to an explicit address, used when embedding the server.
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Self::fallback()
        }
    }

    fn fallback() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT),
            keepalive_timeout: Duration::from_secs(DEFAULT_KEEPALIVE_TIMEOUT_SECS),
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}
