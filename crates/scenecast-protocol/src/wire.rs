//! Binary field layout shared by every command.
//!
//! - integers and floats: little-endian (`u32`, `f32`)
//! - `bool`: one byte, `0` or `1` (any non-zero byte reads as `true`)
//! - strings: 7-bit variable-length byte count, then UTF-8 bytes
//!
//! The variable-length prefix stores seven bits per byte, low bits first,
//! with the high bit set on every byte but the last. Short strings (under
//! 128 bytes, which covers every command identifier) cost one prefix byte.

use bytes::{Buf, BufMut};

use crate::ProtocolError;

/// Writes protocol fields into any growable buffer.
pub trait WireWrite: BufMut {
    /// Writes a `bool` as a single byte.
    fn put_wire_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    /// Writes a 7-bit variable-length `u32`.
    fn put_var_u32(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    /// Writes a length-prefixed UTF-8 string.
    fn put_wire_str(&mut self, value: &str) {
        self.put_var_u32(value.len() as u32);
        self.put_slice(value.as_bytes());
    }
}

impl<B: BufMut + ?Sized> WireWrite for B {}

/// Reads protocol fields from a borrowed message.
///
/// Every read checks the remaining length first, so a short message turns
/// into [`ProtocolError::Truncated`] instead of a panic.
#[derive(Debug, Clone, Copy)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    /// Starts reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Everything not yet read, consuming it.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn need(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Reads a 7-bit variable-length `u32` (at most five bytes).
    pub fn read_var_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            let bits = u32::from(byte & 0x7f);
            if shift == 28 && bits > 0x0f {
                return Err(ProtocolError::BadLength);
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::BadLength)
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a length-prefixed UTF-8 string, borrowing from the message.
    pub fn read_str(&mut self) -> Result<&'a str, ProtocolError> {
        let len = self.read_var_u32()? as usize;
        let raw = self.read_bytes(len)?;
        Ok(std::str::from_utf8(raw)?)
    }
}
