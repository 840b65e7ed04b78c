//! Remote debug drawing for a simulation viewer
//!
//! External programs send UDP datagrams carrying draw commands (circles,
//! lines, points, spheres, polygons, text annotations, agent labels and
//! selection). The receiver decodes them on a background thread and
//! publishes them into double-buffered named sets, which the render loop
//! reads once per frame:
//! - [`core`]: protocol codec, buffered sets, registry and command execution
//! - [`receiver`]: UDP socket and receive thread

pub mod core;
pub mod receiver;
pub mod receiver_state;

pub use crate::core::{Command, DrawingRegistry, Roster, WorldModel};
pub use receiver::{DrawReceiver, ReceiverConfig, ReceiverStats, StatsSnapshot};
pub use receiver_state::ReceiverState;
