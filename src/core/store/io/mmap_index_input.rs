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

use crate::core::store::io::{DataInput, IndexInput};

use crate::error::ErrorKind::{IllegalArgument, UnexpectedEOF};
use crate::error::Result;
use memmap::{Mmap, MmapOptions};

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

/// `IndexInput` over a read-only memory map.
///
/// Clones and slices share one `Mmap` through an `Arc`, the map is released
/// when the last of them is dropped. Empty files are never mapped.
#[derive(Clone)]
pub struct MmapIndexInput {
    map: Option<Arc<Mmap>>,
    offset: usize,
    length: usize,
    position: usize,
    description: String,
}

impl MmapIndexInput {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<MmapIndexInput> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let length = file.metadata()?.len() as usize;
        let map = if length == 0 {
            None
        } else {
            let mmap = unsafe { MmapOptions::new().len(length).map(&file)? };
            Some(Arc::new(mmap))
        };
        Ok(MmapIndexInput {
            map,
            offset: 0,
            length,
            position: 0,
            description: format!("MmapIndexInput(path=\"{}\")", path.display()),
        })
    }

    #[inline]
    fn window(&self) -> &[u8] {
        match self.map {
            Some(ref map) => &map[self.offset..self.offset + self.length],
            None => &[],
        }
    }
}

impl IndexInput for MmapIndexInput {
    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(Clone::clone(self)))
    }

    fn file_pointer(&self) -> i64 {
        self.position as i64
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 || pos as usize > self.length {
            bail!(UnexpectedEOF(format!(
                "seek to {} is beyond the end of {} (length {})",
                pos, self.description, self.length
            )));
        }
        self.position = pos as usize;
        Ok(())
    }

    #[inline]
    fn len(&self) -> u64 {
        self.length as u64
    }

    fn name(&self) -> &str {
        &self.description
    }

    fn slice(&self, description: &str, offset: i64, length: i64) -> Result<Box<dyn IndexInput>> {
        if offset < 0 || length < 0 || (offset + length) as usize > self.length {
            bail!(IllegalArgument(format!(
                "Illegal (offset, length) slice: ({}, {}) for {} of length: {}",
                offset, length, self.description, self.length
            )));
        }
        Ok(Box::new(MmapIndexInput {
            map: self.map.clone(),
            offset: self.offset + offset as usize,
            length: length as usize,
            position: 0,
            description: format!("{} [slice={}]", self.description, description),
        }))
    }
}

impl DataInput for MmapIndexInput {
    fn read_byte(&mut self) -> Result<u8> {
        if self.position >= self.length {
            bail!(UnexpectedEOF(format!("read past EOF: {}", self.description)));
        }
        let b = self.window()[self.position];
        self.position += 1;
        Ok(b)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        if self.position + count > self.length {
            bail!(UnexpectedEOF(format!("skip past EOF: {}", self.description)));
        }
        self.position += count;
        Ok(())
    }
}

impl Read for MmapIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.position;
        let count = buf.len().min(self.length - pos);
        buf[..count].copy_from_slice(&self.window()[pos..pos + count]);
        self.position += count;
        Ok(count)
    }
}
