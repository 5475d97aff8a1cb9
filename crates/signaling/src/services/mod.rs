pub mod handshake;
pub mod router;
pub mod session;
pub mod teardown;
