//! Redfish mockup server library.
//!
//! Serves a recorded Redfish mockup tree over HTTP. Reads come straight
//! from the fixture files; PATCH, POST, and DELETE land in an in-memory
//! copy-on-write overlay so the tree on disk is never modified. Test events
//! fan out to the subscribers recorded in the mockup itself.

pub mod config;
pub mod error;
pub mod events;
pub mod overlay;
pub mod pagination;
pub mod path;
pub mod repository;
pub mod server;
pub mod ssdp;
pub mod timing;
