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

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::store::directory::Directory;
use crate::core::store::io::{DataInput, DataOutput, IndexInput, IndexOutput};
use crate::core::store::IOContext;
use crate::error::ErrorKind::{IllegalArgument, UnexpectedEOF};
use crate::error::Result;

type FileMap = HashMap<String, Arc<RwLock<Vec<u8>>>>;

/// A memory-resident `Directory`.
///
/// Keeps a count of the inputs handed out by `open_input` that are still
/// alive. Clones of an input are not counted, dropping the input returned
/// by `open_input` is what releases the handle.
pub struct RAMDirectory {
    files: RwLock<FileMap>,
    open_inputs: Arc<AtomicUsize>,
}

impl RAMDirectory {
    pub fn new() -> RAMDirectory {
        RAMDirectory {
            files: RwLock::new(HashMap::new()),
            open_inputs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of inputs opened through this directory and not yet dropped.
    pub fn open_input_count(&self) -> usize {
        self.open_inputs.load(Ordering::Acquire)
    }

    /// Returns a copy of the named file's current content.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let file = self.file(name)?;
        let data = file.read()?;
        Ok(data.clone())
    }

    /// Replaces the named file's content.
    pub fn write_file(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.files
            .write()?
            .insert(name.to_string(), Arc::new(RwLock::new(bytes)));
        Ok(())
    }

    fn file(&self, name: &str) -> Result<Arc<RwLock<Vec<u8>>>> {
        match self.files.read()?.get(name) {
            Some(file) => Ok(Arc::clone(file)),
            None => bail!(IllegalArgument(format!("file {} does not exist", name))),
        }
    }
}

impl Default for RAMDirectory {
    fn default() -> Self {
        RAMDirectory::new()
    }
}

impl Directory for RAMDirectory {
    type IndexOutput = RAMIndexOutput;

    fn list_all(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        let file = self.file(name)?;
        let len = file.read()?.len();
        Ok(len as i64)
    }

    fn create_output(&self, name: &str, _context: &IOContext) -> Result<Self::IndexOutput> {
        let file = Arc::new(RwLock::new(Vec::new()));
        self.files
            .write()?
            .insert(name.to_string(), Arc::clone(&file));
        Ok(RAMIndexOutput {
            name: name.to_string(),
            file,
            position: 0,
        })
    }

    fn open_input(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        let file = self.file(name)?;
        let data = Arc::new(file.read()?.clone());
        let length = data.len();
        self.open_inputs.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(RAMIndexInput {
            name: name.to_string(),
            data,
            offset: 0,
            length,
            position: 0,
            _handle: Some(OpenHandle(Arc::clone(&self.open_inputs))),
        }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        if self.files.write()?.remove(name).is_none() {
            bail!(IllegalArgument(format!("file {} does not exist", name)));
        }
        Ok(())
    }
}

impl fmt::Display for RAMDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RAMDirectory")
    }
}

struct OpenHandle(Arc<AtomicUsize>);

impl Drop for OpenHandle {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// `IndexInput` over a snapshot of a `RAMDirectory` file.
pub struct RAMIndexInput {
    name: String,
    data: Arc<Vec<u8>>,
    offset: usize,
    length: usize,
    position: usize,
    _handle: Option<OpenHandle>,
}

impl RAMIndexInput {
    fn window(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    fn view(&self, name: String, offset: usize, length: usize) -> RAMIndexInput {
        RAMIndexInput {
            name,
            data: Arc::clone(&self.data),
            offset,
            length,
            position: 0,
            _handle: None,
        }
    }
}

impl IndexInput for RAMIndexInput {
    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        let mut input = self.view(self.name.clone(), self.offset, self.length);
        input.position = self.position;
        Ok(Box::new(input))
    }

    fn file_pointer(&self) -> i64 {
        self.position as i64
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 || pos as usize > self.length {
            bail!(UnexpectedEOF(format!(
                "seek to {} is beyond the end of {} (length {})",
                pos, self.name, self.length
            )));
        }
        self.position = pos as usize;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.length as u64
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn slice(&self, description: &str, offset: i64, length: i64) -> Result<Box<dyn IndexInput>> {
        if offset < 0 || length < 0 || (offset + length) as usize > self.length {
            bail!(IllegalArgument(format!(
                "Illegal (offset, length) slice: ({}, {}) for {} of length: {}",
                offset, length, self.name, self.length
            )));
        }
        let name = format!("{} [slice={}]", self.name, description);
        Ok(Box::new(self.view(
            name,
            self.offset + offset as usize,
            length as usize,
        )))
    }
}

impl DataInput for RAMIndexInput {
    fn read_byte(&mut self) -> Result<u8> {
        if self.position >= self.length {
            bail!(UnexpectedEOF(format!("read past EOF: {}", self.name)));
        }
        let b = self.window()[self.position];
        self.position += 1;
        Ok(b)
    }
}

impl Read for RAMIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.position;
        let count = buf.len().min(self.length - pos);
        buf[..count].copy_from_slice(&self.window()[pos..pos + count]);
        self.position += count;
        Ok(count)
    }
}

/// `IndexOutput` appending to a `RAMDirectory` file.
pub struct RAMIndexOutput {
    name: String,
    file: Arc<RwLock<Vec<u8>>>,
    position: usize,
}

impl Write for RAMIndexOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .write()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "poisoned RAM file"))?;
        file.extend_from_slice(buf);
        self.position += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DataOutput for RAMIndexOutput {}

impl IndexOutput for RAMIndexOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> i64 {
        self.position as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::IO_CONTEXT_READ;

    #[test]
    fn test_open_input_accounting() {
        let dir = RAMDirectory::new();
        {
            let mut out = dir.create_output("a", &IOContext::Flush).unwrap();
            out.write_vint(1000).unwrap();
            out.write_string("x").unwrap();
        }
        assert_eq!(dir.file_length("a").unwrap(), 4);

        let input = dir.open_input("a", &IO_CONTEXT_READ).unwrap();
        assert_eq!(dir.open_input_count(), 1);
        let mut clone = input.clone_input().unwrap();
        assert_eq!(dir.open_input_count(), 1);
        drop(input);
        assert_eq!(dir.open_input_count(), 0);

        // clones stay readable after the original is released
        assert_eq!(clone.read_vint().unwrap(), 1000);
        assert_eq!(clone.read_string().unwrap(), "x");
        assert!(clone.read_byte().is_err());
    }

    #[test]
    fn test_slice_reads_stay_in_window() {
        let dir = RAMDirectory::new();
        dir.write_file("c", vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let input = dir.open_input("c", &IO_CONTEXT_READ).unwrap();

        let mut slice = input.slice("mid", 2, 4).unwrap();
        assert_eq!(slice.read_byte().unwrap(), 3);
        let mut buf = [0u8; 5];
        slice.read_bytes(&mut buf, 1, 3).unwrap();
        assert_eq!(buf, [0, 4, 5, 6, 0]);
        assert!(slice.read_byte().is_err());

        let mut nested = slice.slice("tail", 3, 1).unwrap();
        assert_eq!(nested.read_byte().unwrap(), 6);
        let mut rest = [0u8; 2];
        assert!(nested.read_bytes(&mut rest, 0, 2).is_err());
    }

    #[test]
    fn test_write_file_replaces_content() {
        let dir = RAMDirectory::new();
        dir.write_file("b", vec![1, 2, 3]).unwrap();
        let mut bytes = dir.read_file("b").unwrap();
        bytes[0] = 9;
        dir.write_file("b", bytes).unwrap();

        let mut input = dir.open_input("b", &IO_CONTEXT_READ).unwrap();
        assert_eq!(input.read_byte().unwrap(), 9);
        assert_eq!(dir.list_all().unwrap(), vec!["b"]);
        assert!(dir.open_input("missing", &IO_CONTEXT_READ).is_err());
        dir.delete_file("b").unwrap();
        assert!(dir.list_all().unwrap().is_empty());
    }
}
