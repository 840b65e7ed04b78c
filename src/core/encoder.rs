//! Sender-side command encoder
//!
//! Produces the exact byte framing the decoder expects, so Rust clients (and
//! the demo sender in the CLI) can emit drawings. Floats are written through
//! the lossy 6-character text form.

use super::types::{AnnotationCommand, Command, Shape};
use super::wire::*;

/// Encode one command
pub fn encode(cmd: &Command) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(32);
    encode_into(&mut out, cmd)?;
    Ok(out)
}

/// Append one command to `out` (for packing several commands into a datagram)
pub fn encode_into(out: &mut Vec<u8>, cmd: &Command) -> Result<(), EncodeError> {
    match cmd {
        Command::SetSwap { prefix } => {
            out.extend_from_slice(&[CMD_DRAW_OPTION, OPTION_SWAP_BUFFERS]);
            write_string(out, prefix)
        }
        Command::DrawShape(shape) => encode_shape(out, shape),
        Command::DrawAnnotation(annotation) => encode_annotation(out, annotation),
        Command::SelectAgent(agent) => {
            out.extend_from_slice(&[CMD_CONTROL, CONTROL_SELECT_AGENT, agent.to_byte()]);
            Ok(())
        }
    }
}

fn encode_shape(out: &mut Vec<u8>, shape: &Shape) -> Result<(), EncodeError> {
    match shape {
        Shape::Circle { center, radius, thickness, color, set } => {
            out.extend_from_slice(&[CMD_DRAW_SHAPE, SHAPE_CIRCLE]);
            write_vec2(out, *center);
            write_float(out, *radius);
            write_float(out, *thickness);
            write_rgb(out, *color);
            write_string(out, set)
        }
        Shape::Line { a, b, thickness, color, set } => {
            out.extend_from_slice(&[CMD_DRAW_SHAPE, SHAPE_LINE]);
            write_vec3(out, *a);
            write_vec3(out, *b);
            write_float(out, *thickness);
            write_rgb(out, *color);
            write_string(out, set)
        }
        Shape::Point { pos, size, color, set } => {
            out.extend_from_slice(&[CMD_DRAW_SHAPE, SHAPE_POINT]);
            write_vec3(out, *pos);
            write_float(out, *size);
            write_rgb(out, *color);
            write_string(out, set)
        }
        Shape::Sphere { pos, radius, color, set } => {
            out.extend_from_slice(&[CMD_DRAW_SHAPE, SHAPE_SPHERE]);
            write_vec3(out, *pos);
            write_float(out, *radius);
            write_rgb(out, *color);
            write_string(out, set)
        }
        Shape::Polygon { vertices, color, set } => {
            let count = u8::try_from(vertices.len())
                .map_err(|_| EncodeError::TooManyVertices(vertices.len()))?;
            out.extend_from_slice(&[CMD_DRAW_SHAPE, SHAPE_POLYGON, count]);
            write_rgba(out, *color);
            vertices.iter().for_each(|v| write_vec3(out, *v));
            write_string(out, set)
        }
    }
}

fn encode_annotation(out: &mut Vec<u8>, annotation: &AnnotationCommand) -> Result<(), EncodeError> {
    match annotation {
        AnnotationCommand::Standard(a) => {
            out.extend_from_slice(&[CMD_DRAW_ANNOTATION, ANNOTATION_STANDARD]);
            write_vec3(out, a.pos);
            write_rgb(out, a.color);
            write_string(out, &a.text)?;
            write_string(out, &a.set)
        }
        AnnotationCommand::AgentSet(a) => {
            out.extend_from_slice(&[CMD_DRAW_ANNOTATION, ANNOTATION_AGENT_SET, a.agent.to_byte()]);
            write_rgb(out, a.color);
            write_string(out, &a.text)
        }
        AnnotationCommand::AgentClear(agent) => {
            out.extend_from_slice(&[CMD_DRAW_ANNOTATION, ANNOTATION_AGENT_CLEAR, agent.to_byte()]);
            Ok(())
        }
    }
}
