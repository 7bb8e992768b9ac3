//! Remote file sync through the `mutagen` CLI.

pub mod mutagen;

mod commands;

pub use commands::{sync_command, SyncRequest};
