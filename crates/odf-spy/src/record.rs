//! Typed payload fields for trace records.
//!
//! Each field is tagged with a one-byte format descriptor followed by the
//! field value encoded in little-endian order. [`PayloadBuilder`] writes the
//! layout and [`PayloadReader`] walks it back.

use crate::TraceError;

/// Format identifier for unsigned 8-bit fields.
pub const FMT_U8: u8 = 0x1;
/// Format identifier for unsigned 16-bit fields.
pub const FMT_U16: u8 = 0x3;
/// Format identifier for unsigned 32-bit fields.
pub const FMT_U32: u8 = 0x5;
/// Format identifier for 64-bit floating point fields.
pub const FMT_F64: u8 = 0x7;
/// Format identifier for null-terminated strings.
pub const FMT_STR: u8 = 0x8;
/// Format identifier for receiver handles.
pub const FMT_RCVR: u8 = 0xB;
/// Format identifier for simulation time stamps.
pub const FMT_TIME: u8 = 0xE;

/// A decoded payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    U8(u8),
    U16(u16),
    U32(u32),
    F64(f64),
    Str(String),
    Receiver(u32),
    Time(f64),
}

/// Incremental builder for record payloads.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    bytes: Vec<u8>,
}

impl PayloadBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Creates a builder with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn push_u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(FMT_U8);
        self.bytes.push(value);
        self
    }

    pub fn push_u16(&mut self, value: u16) -> &mut Self {
        self.bytes.push(FMT_U16);
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.push(FMT_U32);
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push_f64(&mut self, value: f64) -> &mut Self {
        self.bytes.push(FMT_F64);
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Adds a receiver handle.
    pub fn push_receiver(&mut self, id: u32) -> &mut Self {
        self.bytes.push(FMT_RCVR);
        self.bytes.extend_from_slice(&id.to_le_bytes());
        self
    }

    /// Adds a time stamp in its wire form (sentinels are negative).
    pub fn push_time(&mut self, wire_time: f64) -> &mut Self {
        self.bytes.push(FMT_TIME);
        self.bytes.extend_from_slice(&wire_time.to_le_bytes());
        self
    }

    /// Adds a null-terminated string field.
    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.bytes.push(FMT_STR);
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the builder and returns the accumulated payload bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

/// Sequential reader over a payload produced by [`PayloadBuilder`].
#[derive(Debug)]
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Decodes every remaining field.
    pub fn fields(mut self) -> Result<Vec<Field>, TraceError> {
        let mut fields = Vec::new();
        while let Some(field) = self.next_field()? {
            fields.push(field);
        }
        Ok(fields)
    }

    /// Decodes the next field, or `None` at the end of the payload.
    pub fn next_field(&mut self) -> Result<Option<Field>, TraceError> {
        let Some(&format) = self.bytes.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;

        let field = match format {
            FMT_U8 => Field::U8(self.take::<1>()?[0]),
            FMT_U16 => Field::U16(u16::from_le_bytes(self.take::<2>()?)),
            FMT_U32 => Field::U32(u32::from_le_bytes(self.take::<4>()?)),
            FMT_F64 => Field::F64(f64::from_le_bytes(self.take::<8>()?)),
            FMT_RCVR => Field::Receiver(u32::from_le_bytes(self.take::<4>()?)),
            FMT_TIME => Field::Time(f64::from_le_bytes(self.take::<8>()?)),
            FMT_STR => {
                let rest = &self.bytes[self.pos..];
                let end = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(TraceError::Frame("unterminated string field"))?;
                let text = String::from_utf8_lossy(&rest[..end]).into_owned();
                self.pos += end + 1;
                Field::Str(text)
            }
            _ => return Err(TraceError::Frame("unknown field format")),
        };
        Ok(Some(field))
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], TraceError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(TraceError::Frame("truncated field"))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}
