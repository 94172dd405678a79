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

use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

use std::sync::Arc;

/// Interface for Bitset-like structures.
pub trait Bits: Send + Sync {
    fn get(&self, index: usize) -> Result<bool>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type BitsRef = Arc<dyn Bits>;

/// Bits impl of the specified length with all bits set.
#[derive(Clone)]
pub struct MatchAllBits {
    len: usize,
}

impl MatchAllBits {
    pub fn new(len: usize) -> Self {
        MatchAllBits { len }
    }
}

impl Bits for MatchAllBits {
    fn get(&self, _index: usize) -> Result<bool> {
        Ok(true)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Bits impl of the specified length with no bits set.
#[derive(Clone)]
pub struct MatchNoBits {
    len: usize,
}

impl MatchNoBits {
    pub fn new(len: usize) -> Self {
        MatchNoBits { len }
    }
}

impl Bits for MatchNoBits {
    fn get(&self, _index: usize) -> Result<bool> {
        Ok(false)
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[inline]
fn bits2words(num_bits: usize) -> usize {
    (num_bits + 63) >> 6
}

/// A bit set of fixed length backed by 64-bit words. Typically used for live
/// docs, where a set bit means the document is live.
#[derive(Clone, Debug, Default)]
pub struct FixedBitSet {
    bits: Vec<u64>,
    num_bits: usize,
}

impl FixedBitSet {
    pub fn new(num_bits: usize) -> FixedBitSet {
        FixedBitSet {
            bits: vec![0; bits2words(num_bits)],
            num_bits,
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.num_bits {
            bail!(IllegalArgument(format!(
                "index {} out of bounds for {} bits",
                index, self.num_bits
            )));
        }
        Ok(())
    }

    pub fn set(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.bits[index >> 6] |= 1u64 << (index & 0x3f);
        Ok(())
    }

    pub fn clear(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.bits[index >> 6] &= !(1u64 << (index & 0x3f));
        Ok(())
    }

    pub fn cardinality(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl Bits for FixedBitSet {
    fn get(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.bits[index >> 6] & (1u64 << (index & 0x3f)) != 0)
    }

    fn len(&self) -> usize {
        self.num_bits
    }
}
