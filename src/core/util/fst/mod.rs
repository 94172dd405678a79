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

//! A compact finite state transducer mapping byte strings to outputs.
//!
//! The automaton is serialized into a single byte array that is written
//! node by node and read backwards, so every node address points at the
//! last byte written for that node.

mod bytes_output;

pub use self::bytes_output::*;

mod fst_builder;

pub use self::fst_builder::*;

mod fst_reader;

pub use self::fst_reader::*;

use std::fmt::Debug;
use std::hash::Hash;
use std::io;

use crate::core::store::io::{DataInput, DataOutput};
use crate::error::{ErrorKind, Result};

pub trait Output: Clone + Eq + Hash + Debug {
    fn cat(&self, other: &Self) -> Self;

    fn concat(&mut self, other: &Self);

    fn is_empty(&self) -> bool;
}

pub trait OutputFactory: Clone {
    type Value: Output;

    /// Return an empty Output
    fn empty(&self) -> Self::Value;

    fn common(&self, o1: &Self::Value, o2: &Self::Value) -> Self::Value;

    fn subtract(&self, o1: &Self::Value, o2: &Self::Value) -> Self::Value;

    fn add(&self, prefix: &Self::Value, output: &Self::Value) -> Self::Value;

    /// Decode an output value previously written with `write`
    fn read<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<Self::Value>;

    /// Encode an output value into a `DataOutput`
    fn write<T: DataOutput + ?Sized>(&self, output: &Self::Value, data_out: &mut T) -> Result<()>;

    /// Encode an final node output value into a `DataOutput`.
    /// By default this just calls `write`.
    fn write_final_output<T: DataOutput + ?Sized>(
        &self,
        output: &Self::Value,
        data_out: &mut T,
    ) -> Result<()> {
        self.write(output, data_out)
    }

    /// Decode an output value previously written with `write_final_output`.
    /// By default this just calls `read`.
    fn read_final_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<Self::Value> {
        self.read(data_in)
    }

    fn skip_final_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<()> {
        self.skip_output(data_in)
    }

    /// Skip the output; defaults to just calling `read`
    /// and discarding the result.
    fn skip_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<()> {
        self.read(data_in).map(|_| ())
    }
}

pub trait BytesReader: DataInput {
    /// Get current read position
    fn position(&self) -> usize;

    /// Set current read position.
    fn set_position(&mut self, pos: usize);

    /// Returns true if this reader uses reversed bytes
    /// under-the-hood.
    fn reversed(&self) -> bool;
}

/// Reads a borrowed byte array either forwards or backwards.
///
/// A reversed reader that consumed the byte at position 0 parks at
/// `usize::MAX`; any further read fails with `UnexpectedEOF`.
pub struct DirectionalBytesReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    reversed: bool,
}

impl<'a> DirectionalBytesReader<'a> {
    pub fn new(bytes: &'a [u8], reversed: bool) -> DirectionalBytesReader<'a> {
        DirectionalBytesReader {
            bytes,
            pos: 0,
            reversed,
        }
    }
}

impl<'a> BytesReader for DirectionalBytesReader<'a> {
    fn position(&self) -> usize {
        self.pos
    }

    fn set_position(&mut self, pos: usize) {
        self.pos = pos
    }

    fn reversed(&self) -> bool {
        self.reversed
    }
}

impl<'a> io::Read for DirectionalBytesReader<'a> {
    fn read(&mut self, b: &mut [u8]) -> io::Result<usize> {
        let mut read = 0;
        for v in b.iter_mut() {
            match self.bytes.get(self.pos) {
                Some(byte) => *v = *byte,
                None => break,
            }
            self.pos = if self.reversed {
                self.pos.wrapping_sub(1)
            } else {
                self.pos + 1
            };
            read += 1;
        }
        Ok(read)
    }
}

impl<'a> DataInput for DirectionalBytesReader<'a> {
    fn read_byte(&mut self) -> Result<u8> {
        match self.bytes.get(self.pos) {
            Some(b) => {
                let b = *b;
                self.pos = if self.reversed {
                    self.pos.wrapping_sub(1)
                } else {
                    self.pos + 1
                };
                Ok(b)
            }
            None => bail!(ErrorKind::UnexpectedEOF(format!(
                "read past the end of the fst bytes at {}",
                self.pos
            ))),
        }
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        if self.reversed {
            self.pos = self.pos.wrapping_sub(count);
        } else {
            self.pos += count;
        }

        Ok(())
    }
}
