//! # Client Components
//!
//! The client is split into two main components:
//!
//! ## Core Client ([`client`])
//! Talks to the remote steganography service: upload, embed, extract.
//! Stateless; it knows nothing about sessions.
//!
//! ## Session Middleware ([`middleware`])
//! Coordinates user actions against the service and the editing session:
//! - Pre-flight validation and warnings
//! - Busy indication
//! - Stale response detection after a reset
//! - Password prompts and bounded re-prompting
//! - Optional metrics
//!
//! The presentation layer plugs in through [`presenter::Presenter`].

pub mod client;
pub mod metrics;
pub mod middleware;
pub mod presenter;

// Re-export for convenience
pub use client::{HttpStegoClient, StegoService, TransportError};
pub use metrics::SessionMetrics;
pub use middleware::SessionMiddleware;
pub use presenter::{PasswordPurpose, Presenter, Warning};
