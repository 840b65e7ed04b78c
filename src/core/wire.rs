//! Primitive field codec for the draw protocol
//!
//! | Field   | Encoding                                              |
//! |---------|-------------------------------------------------------|
//! | float   | exactly 6 ASCII bytes of decimal text                 |
//! | string  | raw bytes + one 0x00 terminator, no length prefix     |
//! | RGB(A)  | 3 (4) raw bytes, 0..=255 mapped to [0, 1]             |
//! | agent   | 1 byte, see [`AgentRef::from_byte`]                   |

use thiserror::Error;

use super::types::{AgentRef, Rgb, Rgba, Vec2, Vec3};

/// Width of a textual float on the wire
pub const FLOAT_WIDTH: usize = 6;

// Top-level command tags
pub const CMD_DRAW_OPTION: u8 = 0;
pub const CMD_DRAW_SHAPE: u8 = 1;
pub const CMD_DRAW_ANNOTATION: u8 = 2;
pub const CMD_CONTROL: u8 = 3;

// DrawOption sub-tags
pub const OPTION_SWAP_BUFFERS: u8 = 0;

// DrawShape sub-tags
pub const SHAPE_CIRCLE: u8 = 0;
pub const SHAPE_LINE: u8 = 1;
pub const SHAPE_POINT: u8 = 2;
pub const SHAPE_SPHERE: u8 = 3;
pub const SHAPE_POLYGON: u8 = 4;

// DrawAnnotation sub-tags
pub const ANNOTATION_STANDARD: u8 = 0;
pub const ANNOTATION_AGENT_SET: u8 = 1;
pub const ANNOTATION_AGENT_CLEAR: u8 = 2;

// Control sub-tags
pub const CONTROL_SELECT_AGENT: u8 = 0;

/// Failure to decode one command. Offsets are relative to the start of the datagram.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected end of packet at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEnd { offset: usize, needed: usize },

    #[error("unknown command tag {tag} at offset {offset}")]
    UnknownCommand { tag: u8, offset: usize },

    #[error("unknown sub-type {tag} for command {command} at offset {offset}")]
    UnknownSubtype { command: u8, tag: u8, offset: usize },

    #[error("invalid float {text:?} at offset {offset}")]
    InvalidFloat { text: String, offset: usize },
}

impl DecodeError {
    /// Byte offset at which decoding failed
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnexpectedEnd { offset, .. }
            | DecodeError::UnknownCommand { offset, .. }
            | DecodeError::UnknownSubtype { offset, .. }
            | DecodeError::InvalidFloat { offset, .. } => *offset,
        }
    }
}

/// Failure to encode a command for sending
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("polygon has {0} vertices, at most 255 fit in the count byte")]
    TooManyVertices(usize),

    #[error("string field contains a NUL byte")]
    InteriorNul,
}

// ============================================================================
// Reading
// ============================================================================

/// Cursor over one datagram. Every read reports the absolute offset on failure.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reader over the whole datagram, starting at `pos`
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos: pos.min(buf.len()) }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Parse a 6-byte textual float, tolerating space padding.
    ///
    /// Only decimal text is accepted; infinities and any spelling of NaN
    /// other than the `NaN` written by [`format_float`] are invalid.
    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        let offset = self.pos;
        let bytes = self.take(FLOAT_WIDTH)?;
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();
        match trimmed.parse::<f32>() {
            Ok(value) if value.is_finite() || trimmed == "NaN" => Ok(value),
            _ => Err(DecodeError::InvalidFloat {
                text: text.into_owned(),
                offset,
            }),
        }
    }

    pub fn read_vec2(&mut self) -> Result<Vec2, DecodeError> {
        Ok([self.read_float()?, self.read_float()?])
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, DecodeError> {
        Ok([self.read_float()?, self.read_float()?, self.read_float()?])
    }

    /// Read bytes up to (and consuming) the 0x00 terminator
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let rest = &self.buf[self.pos..];
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            return Err(DecodeError::UnexpectedEnd { offset: self.buf.len(), needed: 1 });
        };
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }

    pub fn read_rgb(&mut self) -> Result<Rgb, DecodeError> {
        let b = self.take(3)?;
        Ok(Rgb::from_bytes([b[0], b[1], b[2]]))
    }

    pub fn read_rgba(&mut self) -> Result<Rgba, DecodeError> {
        let b = self.take(4)?;
        Ok(Rgba::from_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_agent(&mut self) -> Result<AgentRef, DecodeError> {
        Ok(AgentRef::from_byte(self.read_u8()?))
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Format `value` as fixed 6-character text: printed with 6 decimals, then
/// truncated (or right-aligned padded for short forms like `NaN`).
pub fn format_float(value: f32) -> [u8; FLOAT_WIDTH] {
    let text = format!("{:>6.6}", value);
    let mut out = [b' '; FLOAT_WIDTH];
    out.copy_from_slice(&text.as_bytes()[..FLOAT_WIDTH]);
    out
}

pub fn write_float(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&format_float(value));
}

pub fn write_vec2(out: &mut Vec<u8>, v: Vec2) {
    v.iter().for_each(|&c| write_float(out, c));
}

pub fn write_vec3(out: &mut Vec<u8>, v: Vec3) {
    v.iter().for_each(|&c| write_float(out, c));
}

pub fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), EncodeError> {
    if s.as_bytes().contains(&0) {
        return Err(EncodeError::InteriorNul);
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

pub fn write_rgb(out: &mut Vec<u8>, color: Rgb) {
    out.extend_from_slice(&color.to_bytes());
}

pub fn write_rgba(out: &mut Vec<u8>, color: Rgba) {
    out.extend_from_slice(&color.to_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float_fixed_width() {
        assert_eq!(&format_float(1.0), b"1.0000");
        assert_eq!(&format_float(-12.5), b"-12.50");
        assert_eq!(&format_float(0.25), b"0.2500");
        assert_eq!(&format_float(123.456), b"123.45");
        assert_eq!(&format_float(f32::NAN), b"   NaN");
    }

    #[test]
    fn test_read_float() {
        let mut r = WireReader::new(b"3.1415-0.500  2.5 ");
        assert!((r.read_float().unwrap() - 3.1415).abs() < 1e-5);
        assert_eq!(r.read_float().unwrap(), -0.5);
        assert_eq!(r.read_float().unwrap(), 2.5);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_float_invalid() {
        let mut r = WireReader::new(b"xx1.00");
        let err = r.read_float().unwrap_err();
        assert_eq!(err, DecodeError::InvalidFloat { text: "xx1.00".into(), offset: 0 });
    }

    #[test]
    fn test_read_float_rejects_non_finite_text() {
        for text in [b"   inf", b"  -inf", b"   INF", b"   nan", b"+inf  "] {
            let err = WireReader::new(text).read_float().unwrap_err();
            assert!(matches!(err, DecodeError::InvalidFloat { offset: 0, .. }), "{:?}", err);
        }
        // the encoder's own NaN form still decodes
        assert!(WireReader::new(&format_float(f32::NAN)).read_float().unwrap().is_nan());
    }

    #[test]
    fn test_read_float_truncated() {
        let mut r = WireReader::new(b"1.00");
        assert_eq!(r.read_float().unwrap_err(), DecodeError::UnexpectedEnd { offset: 0, needed: 2 });
    }

    #[test]
    fn test_read_string() {
        let mut r = WireReader::new(b"abc\0\0x");
        assert_eq!(r.read_string().unwrap(), "abc");
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.position(), 5);
        // no terminator left
        assert!(matches!(r.read_string(), Err(DecodeError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_read_colors_and_agent() {
        let mut r = WireReader::new(&[255, 0, 0, 1, 2, 3, 255, 130]);
        assert_eq!(r.read_rgb().unwrap(), Rgb([1.0, 0.0, 0.0]));
        assert_eq!(r.read_rgba().unwrap().to_bytes(), [1, 2, 3, 255]);
        let agent = r.read_agent().unwrap();
        assert_eq!(agent.to_byte(), 130);
    }

    #[test]
    fn test_offsets_are_datagram_relative() {
        let mut r = WireReader::at(b"AB\0zzzzzz", 1);
        assert_eq!(r.read_string().unwrap(), "B");
        let err = r.read_float().unwrap_err();
        assert_eq!(err.offset(), 3);
    }

    #[test]
    fn test_write_string_rejects_nul() {
        let mut out = Vec::new();
        assert_eq!(write_string(&mut out, "a\0b"), Err(EncodeError::InteriorNul));
        write_string(&mut out, "ok").unwrap();
        assert_eq!(out, b"ok\0");
    }
}
