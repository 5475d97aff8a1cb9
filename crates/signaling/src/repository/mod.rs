pub mod peer_repository;
