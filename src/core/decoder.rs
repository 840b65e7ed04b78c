//! Command decoder for draw datagrams
//!
//! Decoding is pure: it never touches the registry. One datagram may carry
//! several commands back-to-back; [`PacketCommands`] walks them and stops at
//! the first error.

use super::types::{AgentAnnotation, Annotation, AnnotationCommand, Command, Shape};
use super::wire::*;

/// Decode one command from the start of `buf`.
///
/// Returns the command and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> Result<(Command, usize), DecodeError> {
    decode_at(buf, 0)
}

/// Decode one command starting at `start`; returns the command and its length.
fn decode_at(buf: &[u8], start: usize) -> Result<(Command, usize), DecodeError> {
    let mut r = WireReader::at(buf, start);
    let command = read_command(&mut r)?;
    Ok((command, r.position() - start))
}

fn read_command(r: &mut WireReader<'_>) -> Result<Command, DecodeError> {
    let offset = r.position();
    let tag = r.read_u8()?;
    match tag {
        CMD_DRAW_OPTION => read_draw_option(r),
        CMD_DRAW_SHAPE => read_shape(r).map(Command::DrawShape),
        CMD_DRAW_ANNOTATION => read_annotation(r).map(Command::DrawAnnotation),
        CMD_CONTROL => read_control(r),
        _ => Err(DecodeError::UnknownCommand { tag, offset }),
    }
}

fn read_subtype(r: &mut WireReader<'_>) -> Result<(u8, usize), DecodeError> {
    let offset = r.position();
    Ok((r.read_u8()?, offset))
}

fn read_draw_option(r: &mut WireReader<'_>) -> Result<Command, DecodeError> {
    match read_subtype(r)? {
        (OPTION_SWAP_BUFFERS, _) => Ok(Command::SetSwap { prefix: r.read_string()? }),
        (tag, offset) => Err(DecodeError::UnknownSubtype { command: CMD_DRAW_OPTION, tag, offset }),
    }
}

fn read_shape(r: &mut WireReader<'_>) -> Result<Shape, DecodeError> {
    let shape = match read_subtype(r)? {
        (SHAPE_CIRCLE, _) => Shape::Circle {
            center: r.read_vec2()?,
            radius: r.read_float()?,
            thickness: r.read_float()?,
            color: r.read_rgb()?,
            set: r.read_string()?,
        },
        (SHAPE_LINE, _) => Shape::Line {
            a: r.read_vec3()?,
            b: r.read_vec3()?,
            thickness: r.read_float()?,
            color: r.read_rgb()?,
            set: r.read_string()?,
        },
        (SHAPE_POINT, _) => Shape::Point {
            pos: r.read_vec3()?,
            size: r.read_float()?,
            color: r.read_rgb()?,
            set: r.read_string()?,
        },
        (SHAPE_SPHERE, _) => Shape::Sphere {
            pos: r.read_vec3()?,
            radius: r.read_float()?,
            color: r.read_rgb()?,
            set: r.read_string()?,
        },
        (SHAPE_POLYGON, _) => {
            let count = r.read_u8()? as usize;
            let color = r.read_rgba()?;
            let vertices = (0..count)
                .map(|_| r.read_vec3())
                .collect::<Result<Vec<_>, _>>()?;
            Shape::Polygon { vertices, color, set: r.read_string()? }
        }
        (tag, offset) => {
            return Err(DecodeError::UnknownSubtype { command: CMD_DRAW_SHAPE, tag, offset })
        }
    };
    Ok(shape)
}

fn read_annotation(r: &mut WireReader<'_>) -> Result<AnnotationCommand, DecodeError> {
    match read_subtype(r)? {
        (ANNOTATION_STANDARD, _) => Ok(AnnotationCommand::Standard(Annotation {
            pos: r.read_vec3()?,
            color: r.read_rgb()?,
            text: r.read_string()?,
            set: r.read_string()?,
        })),
        (ANNOTATION_AGENT_SET, _) => Ok(AnnotationCommand::AgentSet(AgentAnnotation {
            agent: r.read_agent()?,
            color: r.read_rgb()?,
            text: r.read_string()?,
        })),
        (ANNOTATION_AGENT_CLEAR, _) => Ok(AnnotationCommand::AgentClear(r.read_agent()?)),
        (tag, offset) => Err(DecodeError::UnknownSubtype { command: CMD_DRAW_ANNOTATION, tag, offset }),
    }
}

fn read_control(r: &mut WireReader<'_>) -> Result<Command, DecodeError> {
    match read_subtype(r)? {
        (CONTROL_SELECT_AGENT, _) => Ok(Command::SelectAgent(r.read_agent()?)),
        (tag, offset) => Err(DecodeError::UnknownSubtype { command: CMD_CONTROL, tag, offset }),
    }
}

/// Iterator over the commands of one datagram.
///
/// Yields `Ok` commands until the bytes are exhausted; the first decode error
/// is yielded once and ends iteration (the rest of the datagram is discarded).
pub struct PacketCommands<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> PacketCommands<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, failed: false }
    }

    /// Offset of the next undecoded byte
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Iterator for PacketCommands<'_> {
    type Item = Result<Command, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        match decode_at(self.buf, self.pos) {
            Ok((cmd, len)) => {
                self.pos += len;
                Some(Ok(cmd))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
