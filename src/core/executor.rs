//! Command execution against the drawing registry
//!
//! Agent-directed commands go through a [`WorldModel`] lookup first; a
//! reference to an agent that is not (or no longer) present is ignored.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::{debug, trace, warn};

use super::decoder::PacketCommands;
use super::registry::DrawingRegistry;
use super::types::{AgentRef, AnnotationCommand, Command};
use super::wire::DecodeError;

/// The viewer's world model, as far as draw commands need it
pub trait WorldModel {
    /// Live agent handle
    type Agent;

    fn resolve_agent(&self, agent: AgentRef) -> Option<Self::Agent>;

    /// Make `agent` the globally selected object (last write wins)
    fn select_agent(&self, agent: Self::Agent);
}

/// In-process world model: a set of connected agents and the selection cell.
///
/// `Roster::open()` accepts every reference, for headless use without a
/// simulation connection.
#[derive(Debug, Default)]
pub struct Roster {
    /// None = every agent is considered present
    present: RwLock<Option<HashSet<AgentRef>>>,
    selected: RwLock<Option<AgentRef>>,
}

impl Roster {
    /// Roster with no agents connected
    pub fn new() -> Self {
        Self {
            present: RwLock::new(Some(HashSet::new())),
            selected: RwLock::new(None),
        }
    }

    /// Roster that resolves every agent reference
    pub fn open() -> Self {
        Self::default()
    }

    pub fn connect(&self, agent: AgentRef) {
        if let Some(present) = self.present.write().as_mut() {
            present.insert(agent);
        }
    }

    pub fn disconnect(&self, agent: AgentRef) {
        if let Some(present) = self.present.write().as_mut() {
            present.remove(&agent);
        }
    }

    pub fn selected(&self) -> Option<AgentRef> {
        *self.selected.read()
    }
}

impl WorldModel for Roster {
    type Agent = AgentRef;

    fn resolve_agent(&self, agent: AgentRef) -> Option<AgentRef> {
        match &*self.present.read() {
            Some(present) => present.contains(&agent).then_some(agent),
            None => Some(agent),
        }
    }

    fn select_agent(&self, agent: AgentRef) {
        *self.selected.write() = Some(agent);
    }
}

/// Applies decoded commands to one registry
pub struct CommandExecutor<'a, W: WorldModel> {
    registry: &'a DrawingRegistry,
    world: &'a W,
}

impl<'a, W: WorldModel> CommandExecutor<'a, W> {
    pub fn new(registry: &'a DrawingRegistry, world: &'a W) -> Self {
        Self { registry, world }
    }

    pub fn execute(&self, cmd: Command) {
        match cmd {
            Command::SetSwap { prefix } => {
                let swapped = self.registry.swap_buffers(&prefix);
                trace!(prefix = %prefix, swapped, "Swap buffers");
            }
            Command::DrawShape(shape) => self.registry.put_shape(shape),
            Command::DrawAnnotation(AnnotationCommand::Standard(annotation)) => {
                self.registry.put_annotation(annotation)
            }
            Command::DrawAnnotation(AnnotationCommand::AgentSet(annotation)) => {
                if self.world.resolve_agent(annotation.agent).is_some() {
                    self.registry.set_agent_annotation(annotation);
                } else {
                    trace!(agent = ?annotation.agent, "Annotation for unknown agent ignored");
                }
            }
            Command::DrawAnnotation(AnnotationCommand::AgentClear(agent)) => {
                if self.world.resolve_agent(agent).is_some() {
                    self.registry.clear_agent_annotation(agent);
                }
            }
            Command::SelectAgent(agent) => match self.world.resolve_agent(agent) {
                Some(live) => {
                    debug!(?agent, "Agent selected");
                    self.world.select_agent(live);
                }
                None => trace!(?agent, "Selection of unknown agent ignored"),
            },
        }
    }
}

/// Result of processing one datagram
#[derive(Debug, Clone, PartialEq)]
pub struct PacketOutcome {
    /// Commands decoded and applied before the end (or the first error)
    pub executed: usize,
    pub error: Option<DecodeError>,
}

/// Decode and execute every command of one datagram.
///
/// Stops at the first decode error; commands before it stay applied, the
/// failed command and everything after it are dropped.
pub fn execute_packet<W: WorldModel>(
    packet: &[u8],
    registry: &DrawingRegistry,
    world: &W,
) -> PacketOutcome {
    let executor = CommandExecutor::new(registry, world);
    let mut executed = 0;

    for item in PacketCommands::new(packet) {
        match item {
            Ok(cmd) => {
                executor.execute(cmd);
                executed += 1;
            }
            Err(e) => {
                warn!(
                    offset = e.offset(),
                    len = packet.len(),
                    executed,
                    error = %e,
                    "Dropping rest of malformed draw packet"
                );
                debug!("Packet dump:\n{}", format_packet(packet));
                return PacketOutcome { executed, error: Some(e) };
            }
        }
    }

    PacketOutcome { executed, error: None }
}

/// Render a packet as an index row over a byte-value row, 16 bytes per line
pub fn format_packet(packet: &[u8]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "length {}", packet.len());
    for (line, chunk) in packet.chunks(16).enumerate() {
        let base = line * 16;
        for i in 0..chunk.len() {
            let _ = write!(out, "{:3}|", base + i);
        }
        out.push('\n');
        for b in chunk {
            let _ = write!(out, "{:3}|", b);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoder::{encode, encode_into};
    use crate::core::types::{AgentAnnotation, Rgb, Shape, Team};

    fn point_cmd(set: &str) -> Command {
        Command::DrawShape(Shape::Point {
            pos: [1.0, 2.0, 3.0],
            size: 4.0,
            color: Rgb::from_bytes([255, 0, 0]),
            set: set.into(),
        })
    }

    fn left(number: u8) -> AgentRef {
        AgentRef { team: Team::Left, number }
    }

    #[test]
    fn test_point_then_swap_scenario() {
        let registry = DrawingRegistry::new();
        let world = Roster::open();
        let mut packet = encode(&point_cmd("dbg")).unwrap();
        encode_into(&mut packet, &Command::SetSwap { prefix: String::new() }).unwrap();

        let outcome = execute_packet(&packet, &registry, &world);
        assert_eq!(outcome, PacketOutcome { executed: 2, error: None });

        let front = registry.shape_set("dbg").unwrap().front_snapshot();
        assert_eq!(front.len(), 1);
        let Shape::Point { pos, size, color, set } = &front[0] else {
            panic!("expected a point");
        };
        for (got, want) in pos.iter().zip([1.0f32, 2.0, 3.0]) {
            assert!((got - want).abs() < 1e-4);
        }
        assert!((*size - 4.0).abs() < 1e-4);
        assert_eq!(color.0, [1.0, 0.0, 0.0]);
        assert_eq!(set, "dbg");
    }

    #[test]
    fn test_agent_annotation_set_and_clear() {
        let registry = DrawingRegistry::new();
        let world = Roster::new();
        world.connect(left(1));
        let executor = CommandExecutor::new(&registry, &world);

        executor.execute(Command::DrawAnnotation(AnnotationCommand::AgentSet(AgentAnnotation {
            agent: left(1),
            text: "hi".into(),
            color: Rgb::default(),
        })));
        assert_eq!(registry.agent_annotation(left(1)).unwrap().text, "hi");
        // no swap required, and no named set involved
        assert_eq!(registry.annotation_set_count(), 0);

        executor.execute(Command::DrawAnnotation(AnnotationCommand::AgentClear(left(1))));
        assert!(registry.agent_annotation(left(1)).is_none());
    }

    #[test]
    fn test_unknown_agent_is_ignored() {
        let registry = DrawingRegistry::new();
        let world = Roster::new();
        world.connect(left(2));
        let executor = CommandExecutor::new(&registry, &world);

        executor.execute(Command::DrawAnnotation(AnnotationCommand::AgentSet(AgentAnnotation {
            agent: left(5),
            text: "ghost".into(),
            color: Rgb::default(),
        })));
        executor.execute(Command::SelectAgent(left(5)));
        assert!(registry.agent_annotation(left(5)).is_none());
        assert_eq!(world.selected(), None);

        executor.execute(Command::SelectAgent(left(2)));
        assert_eq!(world.selected(), Some(left(2)));

        world.disconnect(left(2));
        executor.execute(Command::SelectAgent(left(2)));
        assert_eq!(world.resolve_agent(left(2)), None);
        assert_eq!(world.selected(), Some(left(2)));
    }

    #[test]
    fn test_malformed_mid_packet_containment() {
        let registry = DrawingRegistry::new();
        let world = Roster::open();
        let mut packet = encode(&point_cmd("a")).unwrap();
        encode_into(&mut packet, &point_cmd("b")).unwrap();
        let garbage_at = packet.len();
        packet.extend_from_slice(&[1, 2, b'?', b'?', b'?', b'?', b'?', b'?']);
        // a valid command after the garbage must not be applied
        encode_into(&mut packet, &point_cmd("c")).unwrap();

        let outcome = execute_packet(&packet, &registry, &world);
        assert_eq!(outcome.executed, 2);
        assert_eq!(outcome.error.unwrap().offset(), garbage_at + 2);
        assert_eq!(registry.shape_set_count(), 2);
        assert!(registry.shape_set("c").is_none());
    }

    #[test]
    fn test_unknown_command_applies_nothing() {
        let registry = DrawingRegistry::new();
        let outcome = execute_packet(&[7, 0, 0], &registry, &Roster::open());
        assert_eq!(outcome.executed, 0);
        assert!(matches!(outcome.error, Some(DecodeError::UnknownCommand { tag: 7, offset: 0 })));
        assert_eq!(registry.shape_set_count(), 0);
    }

    #[test]
    fn test_format_packet() {
        let dump = format_packet(&[0, 255]);
        assert_eq!(dump, "length 2\n  0|  1|\n  0|255|\n");
    }
}
