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

//! Reader for the block-tree terms dictionary of a rucene segment.
//!
//! The dictionary of a segment lives in two files: the terms dict (`.tim`)
//! holds the terms of every field in prefix-sharing blocks, and the optional
//! terms index (`.tip`) holds one FST per field mapping block prefixes to
//! block file pointers. `BlockTreeTermsReader` opens both and hands out a
//! `FieldReader` per field, whose `SegmentTermIterator` supports sequential
//! iteration, exact and ceiling seeks, and term state reuse.

#![recursion_limit = "1024"]
#![cfg_attr(not(feature = "clippy"), allow(unknown_lints))]
#![allow(clippy::cast_lossless)]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

extern crate byteorder;
extern crate memmap;

#[cfg(test)]
extern crate rand;
#[cfg(test)]
extern crate tempfile;

pub mod core;
pub mod error;
