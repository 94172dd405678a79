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

pub mod directory;
pub mod io;

/// Hint passed to a `Directory` about what an opened file will be used for.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum IOContext {
    /// `true` when the file is read once, sequentially.
    Read(bool),
    Default,
    Flush,
    Merge,
}

impl IOContext {
    pub fn is_merge(&self) -> bool {
        match self {
            IOContext::Merge => true,
            _ => false,
        }
    }
}

pub const IO_CONTEXT_READONCE: IOContext = IOContext::Read(true);
pub const IO_CONTEXT_READ: IOContext = IOContext::Read(false);
