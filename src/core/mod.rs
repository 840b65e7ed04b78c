//! Platform-agnostic core - protocol codec, drawing registry and command execution

pub mod buffered_set;
pub mod decoder;
pub mod encoder;
pub mod executor;
pub mod registry;
pub mod types;
pub mod wire;

pub use buffered_set::BufferedSet;
pub use decoder::{decode, PacketCommands};
pub use encoder::{encode, encode_into};
pub use executor::{execute_packet, format_packet, CommandExecutor, PacketOutcome, Roster, WorldModel};
pub use registry::{DrawingRegistry, NameFilter, SetInfo, SetListChange, SetListListener};
pub use types::{
    to_viewer_coords, AgentAnnotation, AgentRef, Annotation, AnnotationCommand, Command, Rgb, Rgba,
    Shape, Team, Vec2, Vec3,
};
pub use wire::{DecodeError, EncodeError};
