#![forbid(unsafe_code)]

use crate::ErrorKind;

/// Append-only write buffer for building Kafka wire payloads.
///
/// Array and length fields that are only known after their contents have
/// been emitted are handled with `reserve_i32`/`patch_i32`: the reservation
/// token must be spent on exactly one patch, and `finish` refuses a buffer
/// with outstanding reservations.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
    pending_reservations: usize,
}

/// Token for a reserved 4-byte length slot. Consumed by `patch_i32`.
#[derive(Debug)]
#[must_use = "a reserved length slot must be patched before finish()"]
pub struct Reservation {
    offset: usize,
}

impl Reservation {
    /// Byte offset of the reserved slot, usable for length arithmetic.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            pending_reservations: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Nullable string: `i16` length plus UTF-8 bytes, -1 length for null.
    pub fn write_str(&mut self, value: Option<&str>) -> Result<(), ErrorKind> {
        match value {
            None => self.write_i16(-1),
            Some(s) => {
                let len = i16::try_from(s.len()).map_err(|_| ErrorKind::InvalidArg)?;
                self.write_i16(len);
                self.buf.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    /// Nullable byte blob: `i32` length plus raw bytes, -1 length for null.
    pub fn write_bytes(&mut self, value: Option<&[u8]>) -> Result<(), ErrorKind> {
        match value {
            None => self.write_i32(-1),
            Some(bytes) => {
                let len = i32::try_from(bytes.len()).map_err(|_| ErrorKind::InvalidArg)?;
                self.write_i32(len);
                self.buf.extend_from_slice(bytes);
            }
        }
        Ok(())
    }

    /// Reserve a 4-byte slot whose value is only known later (array counts,
    /// frame lengths). Writes a zero placeholder.
    pub fn reserve_i32(&mut self) -> Reservation {
        let offset = self.buf.len();
        self.write_i32(0);
        self.pending_reservations += 1;
        Reservation { offset }
    }

    /// Back-patch a reserved slot. The token is consumed so a slot can never
    /// be patched twice.
    pub fn patch_i32(&mut self, reservation: Reservation, value: i32) {
        let offset = reservation.offset;
        self.buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
        self.pending_reservations -= 1;
    }

    /// Consume the writer, returning the finished payload. Sending a buffer
    /// with an unpatched reservation is a programmer error.
    pub fn finish(self) -> Vec<u8> {
        assert!(
            self.pending_reservations == 0,
            "{} length reservation(s) left unpatched",
            self.pending_reservations
        );
        self.buf
    }
}

/// Bounds-checked cursor over a reply payload. Every read either yields the
/// decoded value or fails with `BadMsg`, leaving the caller to abandon the
/// parse without publishing partial results.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ErrorKind> {
        if self.remaining() < len {
            return Err(ErrorKind::BadMsg);
        }
        let slice = &self.buf[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    pub fn read_i8(&mut self) -> Result<i8, ErrorKind> {
        let bytes = self.take(1)?;
        Ok(bytes[0] as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, ErrorKind> {
        let bytes = self.take(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ErrorKind> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64, ErrorKind> {
        let bytes = self.take(8)?;
        let mut raw = [0_u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    /// Nullable string; a -1 length decodes to `None`.
    pub fn read_str(&mut self) -> Result<Option<&'a str>, ErrorKind> {
        let len = self.read_i16()?;
        if len == -1 {
            return Ok(None);
        }
        if len < -1 {
            return Err(ErrorKind::BadMsg);
        }
        let bytes = self.take(len as usize)?;
        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|_| ErrorKind::BadMsg)
    }

    /// Nullable byte blob; a -1 length decodes to `None`.
    pub fn read_bytes(&mut self) -> Result<Option<&'a [u8]>, ErrorKind> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < -1 {
            return Err(ErrorKind::BadMsg);
        }
        self.take(len as usize).map(Some)
    }

    /// Skip a string without validating its contents.
    pub fn skip_str(&mut self) -> Result<(), ErrorKind> {
        let len = self.read_i16()?;
        if len == -1 {
            return Ok(());
        }
        if len < -1 {
            return Err(ErrorKind::BadMsg);
        }
        self.take(len as usize)?;
        Ok(())
    }
}
