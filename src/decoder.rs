//! Wire-format decoding
//!
//! This module turns one fixed-size tracking packet into a [`Frame`].
//! The layout is not self-describing: every field is little-endian, packed
//! with no padding, and read strictly in the order of [`WIRE_LAYOUT`] by
//! advancing a cursor. Memory is never reinterpreted.

use crate::error::FormatError;
use crate::types::{ExpressionCoefficients, Frame, LANDMARK_COUNT, PNP_POINT_COUNT};

/// One entry of the ordered wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireField {
    pub name: &'static str,
    /// Width on the wire in bytes
    pub width: usize,
}

const fn field(name: &'static str, width: usize) -> WireField {
    WireField { name, width }
}

/// Every field of a packet, in wire order
pub const WIRE_LAYOUT: [WireField; 28] = [
    field("timestamp", 8),
    field("id", 4),
    field("width", 4),
    field("height", 4),
    field("eye_blink_right", 4),
    field("eye_blink_left", 4),
    field("success", 1),
    field("pnp_error", 4),
    field("quaternion", 4 * 4),
    field("euler", 3 * 4),
    field("translation", 3 * 4),
    field("landmark_confidence", LANDMARK_COUNT * 4),
    field("landmarks", LANDMARK_COUNT * 2 * 4),
    field("pnp_points", PNP_POINT_COUNT * 3 * 4),
    field("eye_left", 4),
    field("eye_right", 4),
    field("eye_steepness_left", 4),
    field("eye_updown_left", 4),
    field("eye_quirk_left", 4),
    field("eye_steepness_right", 4),
    field("eye_updown_right", 4),
    field("eye_quirk_right", 4),
    field("mouth_corner_updown_left", 4),
    field("mouth_corner_inout_left", 4),
    field("mouth_corner_updown_right", 4),
    field("mouth_corner_inout_right", 4),
    field("mouth_open", 4),
    field("mouth_wide", 4),
];

const fn layout_size(fields: &[WireField]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < fields.len() {
        total += fields[i].width;
        i += 1;
    }
    total
}

/// Size in bytes of every packet of the supported protocol version
pub const FRAME_SIZE: usize = layout_size(&WIRE_LAYOUT);

/// Decoder (and encoder) for the fixed packet layout
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode one packet.
    ///
    /// Fails with [`FormatError::WrongLength`] before reading anything when
    /// the buffer is not exactly [`FRAME_SIZE`] bytes long.
    pub fn decode(buf: &[u8]) -> Result<Frame, FormatError> {
        if buf.len() != FRAME_SIZE {
            return Err(FormatError::WrongLength {
                expected: FRAME_SIZE,
                actual: buf.len(),
            });
        }

        let mut r = Reader::new(buf);

        let timestamp = r.f64("timestamp")?;
        let id = r.i32("id")?;
        let width = r.f32("width")?;
        let height = r.f32("height")?;
        let eye_blink_right = r.f32("eye_blink_right")?;
        let eye_blink_left = r.f32("eye_blink_left")?;
        let success = r.u8("success")? != 0;
        let pnp_error = r.f32("pnp_error")?;
        let quaternion = r.f32_array("quaternion")?;
        let euler = r.f32_array("euler")?;
        let translation = r.f32_array("translation")?;
        let landmark_confidence = r.f32_array("landmark_confidence")?;
        let landmarks = r.points("landmarks")?;
        let pnp_points = r.points("pnp_points")?;

        let expression = ExpressionCoefficients {
            eye_left: r.f32("eye_left")?,
            eye_right: r.f32("eye_right")?,
            eye_steepness_left: r.f32("eye_steepness_left")?,
            eye_updown_left: r.f32("eye_updown_left")?,
            eye_quirk_left: r.f32("eye_quirk_left")?,
            eye_steepness_right: r.f32("eye_steepness_right")?,
            eye_updown_right: r.f32("eye_updown_right")?,
            eye_quirk_right: r.f32("eye_quirk_right")?,
            mouth_corner_updown_left: r.f32("mouth_corner_updown_left")?,
            mouth_corner_inout_left: r.f32("mouth_corner_inout_left")?,
            mouth_corner_updown_right: r.f32("mouth_corner_updown_right")?,
            mouth_corner_inout_right: r.f32("mouth_corner_inout_right")?,
            mouth_open: r.f32("mouth_open")?,
            mouth_wide: r.f32("mouth_wide")?,
        };

        Ok(Frame {
            timestamp,
            id,
            width,
            height,
            eye_blink_right,
            eye_blink_left,
            success,
            pnp_error,
            quaternion,
            euler,
            translation,
            landmark_confidence,
            landmarks,
            pnp_points,
            expression,
        })
    }

    /// Encode a frame into the wire layout. Inverse of [`FrameDecoder::decode`].
    pub fn encode(frame: &Frame) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_SIZE);

        buf.extend_from_slice(&frame.timestamp.to_le_bytes());
        buf.extend_from_slice(&frame.id.to_le_bytes());
        put_f32s(&mut buf, &[frame.width, frame.height]);
        put_f32s(&mut buf, &[frame.eye_blink_right, frame.eye_blink_left]);
        buf.push(u8::from(frame.success));
        put_f32s(&mut buf, &[frame.pnp_error]);
        put_f32s(&mut buf, &frame.quaternion);
        put_f32s(&mut buf, &frame.euler);
        put_f32s(&mut buf, &frame.translation);
        put_f32s(&mut buf, &frame.landmark_confidence);
        for point in &frame.landmarks {
            put_f32s(&mut buf, point);
        }
        for point in &frame.pnp_points {
            put_f32s(&mut buf, point);
        }

        let e = &frame.expression;
        put_f32s(
            &mut buf,
            &[
                e.eye_left,
                e.eye_right,
                e.eye_steepness_left,
                e.eye_updown_left,
                e.eye_quirk_left,
                e.eye_steepness_right,
                e.eye_updown_right,
                e.eye_quirk_right,
                e.mouth_corner_updown_left,
                e.mouth_corner_inout_left,
                e.mouth_corner_updown_right,
                e.mouth_corner_inout_right,
                e.mouth_open,
                e.mouth_wide,
            ],
        );

        debug_assert_eq!(buf.len(), FRAME_SIZE);
        buf
    }
}

fn put_f32s(buf: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// Forward-only cursor over a packet
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], FormatError> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(FormatError::Truncated {
                field,
                offset: self.pos,
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, FormatError> {
        let [b] = self.take::<1>(field)?;
        Ok(b)
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, FormatError> {
        Ok(i32::from_le_bytes(self.take(field)?))
    }

    fn f32(&mut self, field: &'static str) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.take(field)?))
    }

    fn f64(&mut self, field: &'static str) -> Result<f64, FormatError> {
        Ok(f64::from_le_bytes(self.take(field)?))
    }

    fn f32_array<const N: usize>(&mut self, field: &'static str) -> Result<[f32; N], FormatError> {
        let mut out = [0.0; N];
        for v in out.iter_mut() {
            *v = self.f32(field)?;
        }
        Ok(out)
    }

    fn points<const N: usize, const D: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[[f32; D]; N], FormatError> {
        let mut out = [[0.0; D]; N];
        for point in out.iter_mut() {
            *point = self.f32_array(field)?;
        }
        Ok(out)
    }
}
