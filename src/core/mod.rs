//! Storage engine internals

pub mod catalog;
pub mod config;
pub mod error;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod header;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod slotfs;
pub mod vfs;

pub use slotfs::SlotFs;
