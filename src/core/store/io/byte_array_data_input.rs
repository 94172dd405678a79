// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::core::store::io::DataInput;

use crate::error::ErrorKind::UnexpectedEOF;
use crate::error::Result;

use std::io::{self, Read};

/// DataInput backed by a byte array.
///
/// Only the first `length()` bytes of the backing storage are readable. When
/// the storage is a `Vec<u8>` it can be refilled from another input with
/// `reload`, which grows the vector as needed but never shrinks it.
pub struct ByteArrayDataInput<T: AsRef<[u8]>> {
    bytes: T,
    pos: usize,
    limit: usize,
}

impl<T: AsRef<[u8]>> ByteArrayDataInput<T> {
    pub fn new(bytes: T) -> ByteArrayDataInput<T> {
        let limit = bytes.as_ref().len();
        ByteArrayDataInput {
            bytes,
            pos: 0,
            limit,
        }
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        debug_assert!(pos <= self.limit);
        self.pos = pos;
    }

    pub fn length(&self) -> usize {
        self.limit
    }

    pub fn eof(&self) -> bool {
        self.pos == self.limit
    }

    pub fn reset(&mut self, bytes: T) {
        self.limit = bytes.as_ref().len();
        self.bytes = bytes;
        self.pos = 0;
    }

    /// The readable bytes, independent of the current position.
    pub fn data(&self) -> &[u8] {
        &self.bytes.as_ref()[..self.limit]
    }

    fn check_available(&self, count: usize) -> Result<()> {
        if self.pos + count > self.limit {
            bail!(UnexpectedEOF(format!(
                "read {} bytes at {} past the end of a {} byte array",
                count, self.pos, self.limit
            )));
        }
        Ok(())
    }
}

impl ByteArrayDataInput<Vec<u8>> {
    pub fn with_capacity(capacity: usize) -> ByteArrayDataInput<Vec<u8>> {
        ByteArrayDataInput {
            bytes: vec![0u8; capacity],
            pos: 0,
            limit: 0,
        }
    }

    /// Refills the buffer with the next `len` bytes of `input`.
    pub fn reload<I: DataInput + ?Sized>(&mut self, input: &mut I, len: usize) -> Result<()> {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
        input.read_bytes(&mut self.bytes, 0, len)?;
        self.pos = 0;
        self.limit = len;
        Ok(())
    }

    pub fn reload_slice(&mut self, slice: &[u8]) {
        if self.bytes.len() < slice.len() {
            self.bytes.resize(slice.len(), 0);
        }
        self.bytes[..slice.len()].copy_from_slice(slice);
        self.pos = 0;
        self.limit = slice.len();
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl<T: AsRef<[u8]>> DataInput for ByteArrayDataInput<T> {
    fn read_byte(&mut self) -> Result<u8> {
        self.check_available(1)?;
        let b = self.bytes.as_ref()[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, b: &mut [u8], offset: usize, len: usize) -> Result<()> {
        self.check_available(len)?;
        b[offset..offset + len].copy_from_slice(&self.bytes.as_ref()[self.pos..self.pos + len]);
        self.pos += len;
        Ok(())
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        self.check_available(count)?;
        self.pos += count;
        Ok(())
    }
}

impl<T: AsRef<[u8]>> Read for ByteArrayDataInput<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = ::std::cmp::min(buf.len(), self.limit - self.pos);
        buf[0..size].copy_from_slice(&self.bytes.as_ref()[self.pos..self.pos + size]);
        self.pos += size;
        Ok(size)
    }
}
