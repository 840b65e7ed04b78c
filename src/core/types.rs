//! Drawing primitives and commands carried by the draw protocol
//!
//! This module contains:
//! - Basic geometry/color types (raw sender coordinates, normalized colors)
//! - AgentRef, the single-byte (team, agent number) reference
//! - Shape / Annotation items stored in named sets
//! - Command, the closed set of everything a datagram can ask for

use serde::{Deserialize, Serialize};

// ============================================================================
// Basic Types
// ============================================================================

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];

/// RGB color with channels in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb(pub [f32; 3]);

/// RGBA color with channels in [0, 1], alpha last
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgba(pub [f32; 4]);

impl Rgb {
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes.map(channel_from_byte))
    }

    pub fn to_bytes(self) -> [u8; 3] {
        self.0.map(channel_to_byte)
    }
}

impl Rgba {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes.map(channel_from_byte))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.map(channel_to_byte)
    }
}

fn channel_from_byte(b: u8) -> f32 {
    b as f32 / 255.0
}

fn channel_to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Convert sender (simulator) coordinates into the viewer's frame.
///
/// The simulator is z-up; the viewer is y-up with x mirrored.
pub fn to_viewer_coords(v: Vec3) -> Vec3 {
    [-v[0], v[2], v[1]]
}

// ============================================================================
// AgentRef
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Left,
    Right,
}

/// Reference to one agent: team plus 1-based agent number (1..=128)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentRef {
    pub team: Team,
    pub number: u8,
}

impl AgentRef {
    /// Build a reference, rejecting agent numbers outside 1..=128
    pub fn new(team: Team, number: u8) -> Option<Self> {
        (1..=128).contains(&number).then_some(Self { team, number })
    }

    /// Unpack the wire byte: [0,127] is the left team, [128,255] the right team
    pub fn from_byte(b: u8) -> Self {
        if b < 128 {
            Self { team: Team::Left, number: b + 1 }
        } else {
            Self { team: Team::Right, number: b - 127 }
        }
    }

    /// Pack into the wire byte; out-of-range numbers are clamped to 1..=128
    pub fn to_byte(self) -> u8 {
        let number = self.number.clamp(1, 128);
        match self.team {
            Team::Left => number - 1,
            Team::Right => number + 127,
        }
    }
}

// ============================================================================
// Drawing items
// ============================================================================

/// A shape stored in a named shape set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle {
        center: Vec2,
        radius: f32,
        thickness: f32,
        color: Rgb,
        set: String,
    },
    Line {
        a: Vec3,
        b: Vec3,
        thickness: f32,
        color: Rgb,
        set: String,
    },
    Point {
        pos: Vec3,
        size: f32,
        color: Rgb,
        set: String,
    },
    Sphere {
        pos: Vec3,
        radius: f32,
        color: Rgb,
        set: String,
    },
    /// At most 255 vertices (count travels in one byte)
    Polygon {
        vertices: Vec<Vec3>,
        color: Rgba,
        set: String,
    },
}

impl Shape {
    pub fn set_name(&self) -> &str {
        match self {
            Shape::Circle { set, .. }
            | Shape::Line { set, .. }
            | Shape::Point { set, .. }
            | Shape::Sphere { set, .. }
            | Shape::Polygon { set, .. } => set,
        }
    }
}

/// Free-floating text stored in a named annotation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub pos: Vec3,
    pub color: Rgb,
    pub set: String,
}

/// Text attached to a single agent's annotation slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnnotation {
    pub agent: AgentRef,
    pub text: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationCommand {
    Standard(Annotation),
    AgentSet(AgentAnnotation),
    AgentClear(AgentRef),
}

/// One decoded client command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Publish back buffers of every set whose name starts with `prefix` ("" = all)
    SetSwap { prefix: String },
    DrawShape(Shape),
    DrawAnnotation(AnnotationCommand),
    SelectAgent(AgentRef),
}
