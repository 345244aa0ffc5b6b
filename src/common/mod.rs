//! # Common Components
//!
//! Shared data structures used by the session core and the client.
//!
//! ## Modules
//!
//! - [`messages`]: Responses of the remote steganography service
//! - [`config`]: Configuration parsing utilities

pub mod config;
pub mod messages;
