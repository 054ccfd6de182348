//! Viewer connections: framing, dispatch and broadcast.

pub mod dispatch;
pub mod messages;
pub mod server;

pub use messages::GestureInput;
pub use server::{ServerConfig, ViewerServer};
