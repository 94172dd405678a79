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

use crate::core::codec::field_infos::FieldInfos;
use crate::core::store::directory::Directory;
use crate::core::store::IOContext;
use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

use std::fmt;
use std::sync::Arc;

/// Returns a file name that includes the given segment name, a suffix and an
/// extension: `{name}_{suffix}.{ext}`, dropping the parts that are empty.
pub fn segment_file_name(name: &str, suffix: &str, ext: &str) -> String {
    if !ext.is_empty() || !suffix.is_empty() {
        debug_assert!(!ext.starts_with('.'));
        let mut filename = String::with_capacity(name.len() + 2 + suffix.len() + ext.len());
        filename.push_str(name);
        if !suffix.is_empty() {
            filename.push('_');
            filename.push_str(suffix);
        }
        if !ext.is_empty() {
            filename.push('.');
            filename.push_str(ext);
        }
        filename
    } else {
        String::from(name)
    }
}

/// Information about a segment such as its name and document count.
#[derive(Clone, Debug, Serialize)]
pub struct SegmentInfo {
    pub name: String,
    pub max_doc: i32,
}

impl SegmentInfo {
    pub fn new(name: String, max_doc: i32) -> Result<SegmentInfo> {
        if max_doc < 0 {
            bail!(IllegalArgument(format!(
                "invalid max_doc {} for segment {}",
                max_doc, name
            )));
        }
        Ok(SegmentInfo { name, max_doc })
    }

    pub fn max_doc(&self) -> i32 {
        self.max_doc
    }
}

impl fmt::Display for SegmentInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(max_doc={})", self.name, self.max_doc)
    }
}

/// Holder of the common parameters used while opening a segment's readers.
pub struct SegmentReadState<'a, D: Directory> {
    /// `Directory` where this segment is read from.
    pub directory: Arc<D>,

    /// `SegmentInfo` describing this segment.
    pub segment_info: &'a SegmentInfo,

    /// `FieldInfos` describing all fields in this segment.
    pub field_infos: Arc<FieldInfos>,

    /// `IOContext` to pass to `Directory::open_input`.
    pub context: &'a IOContext,

    /// Unique suffix for any postings files read for this segment. Every file
    /// read must be named through `segment_file_name` with this suffix.
    pub segment_suffix: String,
}

impl<'a, D: Directory> SegmentReadState<'a, D> {
    pub fn new(
        directory: Arc<D>,
        segment_info: &'a SegmentInfo,
        field_infos: Arc<FieldInfos>,
        context: &'a IOContext,
        segment_suffix: String,
    ) -> SegmentReadState<'a, D> {
        SegmentReadState {
            directory,
            segment_info,
            field_infos,
            context,
            segment_suffix,
        }
    }

    /// Name of this segment's file with the given extension.
    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment_info.name, &self.segment_suffix, ext)
    }
}
