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

use std::fmt;

use crate::core::store::io::{IndexInput, IndexOutput};
use crate::core::store::IOContext;
use crate::error::Result;

/// A Directory is a flat list of files.
///
/// Files may be written once, when they are created. Once a file is created it may only
/// be opened for read, or deleted. Random access is permitted when reading.
pub trait Directory: fmt::Display + Send + Sync {
    type IndexOutput: IndexOutput;

    /// Returns the names of all files in the directory, sorted.
    fn list_all(&self) -> Result<Vec<String>>;

    /// Returns the byte length of a file in the directory.
    fn file_length(&self, name: &str) -> Result<i64>;

    /// Creates a new, empty file in the directory with the given name.
    /// Returns a stream writing this file.
    fn create_output(&self, name: &str, context: &IOContext) -> Result<Self::IndexOutput>;

    fn open_input(&self, name: &str, ctx: &IOContext) -> Result<Box<dyn IndexInput>>;

    fn delete_file(&self, name: &str) -> Result<()>;
}
