pub mod client;
pub mod common;
pub mod session;
pub mod utils;

pub use client::SessionMiddleware;
pub use common::config::ClientConfig;
pub use session::EditingSession;
