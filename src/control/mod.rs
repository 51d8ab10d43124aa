//! Control boundary: wire protocol, command dispatch, TCP server and client.

pub mod client;
pub mod frame;
pub mod handler;
pub mod protocol;
pub mod server;

pub use client::{ControlClient, send_command};
pub use frame::Frame;
pub use handler::{CommandHandler, ControlSurface};
pub use protocol::{Command, Event, StateInfo};
pub use server::ControlServer;
