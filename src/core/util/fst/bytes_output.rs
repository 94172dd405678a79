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

use std::cmp::min;

use crate::core::store::io::{DataInput, DataOutput};
use crate::core::util::fst::{Output, OutputFactory};
use crate::error::{ErrorKind, Result};

/// An FST output holding an arbitrary byte sequence.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ByteSequenceOutput {
    bytes: Vec<u8>,
}

impl From<ByteSequenceOutput> for Vec<u8> {
    fn from(output: ByteSequenceOutput) -> Vec<u8> {
        output.bytes
    }
}

impl ByteSequenceOutput {
    pub fn new(bytes: Vec<u8>) -> ByteSequenceOutput {
        ByteSequenceOutput { bytes }
    }

    pub fn empty() -> ByteSequenceOutput {
        ByteSequenceOutput {
            bytes: Vec::with_capacity(0),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    fn starts_with(&self, other: &ByteSequenceOutput) -> bool {
        self.bytes.starts_with(&other.bytes)
    }

    #[inline]
    pub fn inner(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Output for ByteSequenceOutput {
    fn cat(&self, other: &ByteSequenceOutput) -> ByteSequenceOutput {
        if self.is_empty() {
            other.clone()
        } else if other.is_empty() {
            self.clone()
        } else {
            let mut result = Vec::with_capacity(self.bytes.len() + other.bytes.len());
            result.extend_from_slice(&self.bytes);
            result.extend_from_slice(&other.bytes);
            ByteSequenceOutput::new(result)
        }
    }

    fn concat(&mut self, other: &ByteSequenceOutput) {
        self.bytes.extend_from_slice(&other.bytes);
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Copy, Clone, Default, Debug)]
pub struct ByteSequenceOutputFactory {}

impl ByteSequenceOutputFactory {
    pub fn new() -> ByteSequenceOutputFactory {
        ByteSequenceOutputFactory {}
    }
}

impl OutputFactory for ByteSequenceOutputFactory {
    type Value = ByteSequenceOutput;

    fn empty(&self) -> Self::Value {
        ByteSequenceOutput::empty()
    }

    fn common(&self, o1: &ByteSequenceOutput, o2: &ByteSequenceOutput) -> ByteSequenceOutput {
        let stop = min(o1.len(), o2.len());
        let shared = (0..stop)
            .take_while(|&i| o1.bytes[i] == o2.bytes[i])
            .count();
        if shared == 0 {
            self.empty()
        } else {
            ByteSequenceOutput::new(o1.bytes[..shared].to_vec())
        }
    }

    fn subtract(&self, o1: &ByteSequenceOutput, o2: &ByteSequenceOutput) -> ByteSequenceOutput {
        if o2.is_empty() {
            o1.clone()
        } else {
            debug_assert!(o1.starts_with(o2));
            if o1.len() == o2.len() {
                self.empty()
            } else {
                ByteSequenceOutput::new(o1.bytes[o2.len()..].to_vec())
            }
        }
    }

    fn add(&self, prefix: &ByteSequenceOutput, output: &ByteSequenceOutput) -> ByteSequenceOutput {
        prefix.cat(output)
    }

    fn read<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<ByteSequenceOutput> {
        let len = data_in.read_vint()?;
        if len < 0 {
            bail!(ErrorKind::CorruptIndex(format!(
                "invalid output length: {}",
                len
            )));
        }
        if len == 0 {
            return Ok(self.empty());
        }
        let len = len as usize;
        let mut buffer = vec![0u8; len];
        data_in.read_bytes(&mut buffer, 0, len)?;
        Ok(ByteSequenceOutput::new(buffer))
    }

    fn write<T: DataOutput + ?Sized>(
        &self,
        output: &ByteSequenceOutput,
        data_out: &mut T,
    ) -> Result<()> {
        data_out.write_vint(output.bytes.len() as i32)?;
        data_out.write_bytes(&output.bytes, 0, output.bytes.len())
    }

    fn skip_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<()> {
        let len = data_in.read_vint()?;
        if len < 0 {
            bail!(ErrorKind::CorruptIndex(format!(
                "invalid output length: {}",
                len
            )));
        }
        data_in.skip_bytes(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_and_subtract() {
        let outputs = ByteSequenceOutputFactory::new();
        let o1 = ByteSequenceOutput::new(vec![1, 2, 3, 4, 5]);
        let o2 = ByteSequenceOutput::new(vec![1, 2, 4, 5, 6]);
        let common = outputs.common(&o1, &o2);
        assert_eq!(common.inner(), &[1, 2]);
        assert_eq!(outputs.subtract(&o1, &common).inner(), &[3, 4, 5]);
        assert_eq!(outputs.subtract(&o1, &outputs.empty()), o1);
        assert!(outputs.subtract(&common, &common).is_empty());
        assert!(outputs
            .common(&ByteSequenceOutput::new(vec![7]), &o1)
            .is_empty());
    }

    #[test]
    fn test_cat() {
        let output1 = ByteSequenceOutput::new(vec![1, 2, 3]);
        let output2 = ByteSequenceOutput::new(vec![4, 5]);
        assert_eq!(output1.cat(&output2).inner(), &[1, 2, 3, 4, 5]);
        assert_eq!(ByteSequenceOutput::empty().cat(&output2).inner(), &[4, 5]);

        let mut grown = output1.clone();
        grown.concat(&output2);
        assert_eq!(grown, output1.cat(&output2));
    }

    #[test]
    fn test_read_write() {
        let output_factory = ByteSequenceOutputFactory::new();
        let mut bytes: Vec<u8> = Vec::new();
        output_factory
            .write(&ByteSequenceOutput::new(vec![1, 2, 3, 4, 5]), &mut bytes)
            .unwrap();
        output_factory.write(&output_factory.empty(), &mut bytes).unwrap();
        bytes.push(42);
        assert_eq!(&bytes[..6], &[5, 1, 2, 3, 4, 5]);

        let mut input: &[u8] = &bytes;
        let output = output_factory.read(&mut input).unwrap();
        assert_eq!(output.inner(), &[1, 2, 3, 4, 5]);
        output_factory.skip_output(&mut input).unwrap();
        assert_eq!(input, &[42]);
    }
}
