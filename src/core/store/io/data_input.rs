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

use crate::error::ErrorKind::{CorruptIndex, IllegalArgument, UnexpectedEOF};
use crate::error::Result;

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// Abstract base for performing read operations of the low-level data types
/// used by the term dictionary.
///
/// Fixed width integers are big-endian; variable-length integers store seven
/// bits per byte, low-order group first, with the high bit set on every byte
/// but the last.
pub trait DataInput: Read {
    fn read_byte(&mut self) -> Result<u8> {
        let mut buffer = [0u8; 1];
        if self.read(&mut buffer)? != 1 {
            bail!(UnexpectedEOF(
                "Reached EOF when a single byte is expected".to_owned()
            ))
        }
        Ok(buffer[0])
    }

    fn read_bytes(&mut self, b: &mut [u8], offset: usize, length: usize) -> Result<()> {
        let end = offset + length;
        if b.len() < end {
            bail!(IllegalArgument(format!(
                "Buffer too small: writing [{}, {}) to [0, {})",
                offset,
                end,
                b.len()
            )));
        }
        let mut read = 0;
        while read < length {
            let n = self.read(&mut b[offset + read..end])?;
            if n == 0 {
                bail!(UnexpectedEOF(format!(
                    "Reached EOF when {} bytes are expected",
                    length
                )));
            }
            read += n;
        }
        Ok(())
    }

    fn read_short(&mut self) -> Result<i16> {
        Ok(ReadBytesExt::read_i16::<BigEndian>(self)?)
    }

    fn read_int(&mut self) -> Result<i32> {
        Ok(ReadBytesExt::read_i32::<BigEndian>(self)?)
    }

    fn read_long(&mut self) -> Result<i64> {
        Ok(ReadBytesExt::read_i64::<BigEndian>(self)?)
    }

    fn read_vint(&mut self) -> Result<i32> {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let b = self.read_byte()?;
            if shift == 28 {
                if b & 0xf0 != 0 {
                    bail!(CorruptIndex("Invalid vInt detected".to_owned()));
                }
                return Ok((value | (u32::from(b) << 28)) as i32);
            }
            value |= u32::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value as i32);
            }
            shift += 7;
        }
    }

    fn read_vlong(&mut self) -> Result<i64> {
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let b = self.read_byte()?;
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value as i64);
            }
            shift += 7;
            // nine groups cover the 63 value bits, vLongs are never negative
            if shift > 56 {
                bail!(CorruptIndex("Invalid vLong detected".to_owned()));
            }
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let length = self.read_vint()?;
        if length < 0 {
            bail!(CorruptIndex(format!("Invalid string length: {}", length)));
        }
        let mut buffer = vec![0u8; length as usize];
        self.read_bytes(&mut buffer, 0, length as usize)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        const SKIP_BUFFER_SIZE: usize = 1024;
        let mut skip_buffer = [0u8; SKIP_BUFFER_SIZE];
        let mut skipped = 0;

        while skipped < count {
            let step = ::std::cmp::min(SKIP_BUFFER_SIZE, count - skipped);
            self.read_bytes(&mut skip_buffer, 0, step)?;
            skipped += step;
        }
        Ok(())
    }
}

impl<'a> DataInput for &'a [u8] {
    fn read_byte(&mut self) -> Result<u8> {
        match self.split_first() {
            Some((b, rest)) => {
                *self = rest;
                Ok(*b)
            }
            None => bail!(UnexpectedEOF("read past end of byte slice".to_owned())),
        }
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        if self.len() < count {
            bail!(UnexpectedEOF(format!(
                "skip {} bytes past end of byte slice",
                count
            )));
        }
        *self = &self[count..];
        Ok(())
    }
}
