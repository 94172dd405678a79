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
use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Trait for performing write operations of the low-level data types, the
/// mirror image of `DataInput`.
pub trait DataOutput: Write {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_all(&[b])?;
        Ok(())
    }

    #[inline]
    fn write_bytes(&mut self, b: &[u8], offset: usize, length: usize) -> Result<()> {
        debug_assert!(offset + length <= b.len());
        self.write_all(&b[offset..offset + length])?;
        Ok(())
    }

    fn write_short(&mut self, i: i16) -> Result<()> {
        WriteBytesExt::write_i16::<BigEndian>(self, i)?;
        Ok(())
    }

    fn write_int(&mut self, i: i32) -> Result<()> {
        WriteBytesExt::write_i32::<BigEndian>(self, i)?;
        Ok(())
    }

    fn write_long(&mut self, i: i64) -> Result<()> {
        WriteBytesExt::write_i64::<BigEndian>(self, i)?;
        Ok(())
    }

    fn write_vint(&mut self, i: i32) -> Result<()> {
        let mut i = i as u32;
        while (i & !0x7f_u32) != 0 {
            self.write_byte(((i & 0x7f) | 0x80) as u8)?;
            i >>= 7;
        }
        self.write_byte(i as u8)
    }

    fn write_vlong(&mut self, i: i64) -> Result<()> {
        if i < 0 {
            bail!(IllegalArgument(format!("Can't write negative vLong: {}", i)));
        }
        let mut i = i as u64;
        while (i & !0x7f_u64) != 0 {
            self.write_byte(((i & 0x7f_u64) | 0x80_u64) as u8)?;
            i >>= 7;
        }
        self.write_byte(i as u8)
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        let s = s.as_bytes();
        self.write_vint(s.len() as i32)?;
        self.write_all(s)?;
        Ok(())
    }

    fn copy_bytes<I: DataInput + ?Sized>(&mut self, from: &mut I, len: usize) -> Result<()> {
        const COPY_BUFFER_SIZE: usize = 16384;
        let mut copy_buffer = [0u8; COPY_BUFFER_SIZE];
        let mut left = len;
        while left > 0 {
            let to_copy = ::std::cmp::min(left, COPY_BUFFER_SIZE);
            from.read_bytes(&mut copy_buffer, 0, to_copy)?;
            self.write_all(&copy_buffer[..to_copy])?;
            left -= to_copy;
        }
        Ok(())
    }
}

// lets a plain Vec<u8> act as scratch output
impl DataOutput for Vec<u8> {}
