//! Command implementations: init, migrate, seed, status, backup/restore, reset.

pub mod backup;
pub mod init;
pub mod migrate;
pub mod reset;
pub mod seed;
pub mod status;
