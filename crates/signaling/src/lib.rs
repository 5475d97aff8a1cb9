pub mod config;
pub mod connection;
pub mod keepalive;
pub mod registry;
pub mod repository;
pub mod server;
pub mod services;

pub use config::SignalingServerConfig;
pub use registry::{PeerRegistry, RegistryError};
pub use server::{run_server, serve};
