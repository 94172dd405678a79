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

//! A postings format for tests: every term keeps its doc ids directly in the
//! metadata blob of its block, so the dictionary can be checked end to end
//! without a real postings file.

use crate::core::codec::codec_util;
use crate::core::codec::field_infos::FieldInfo;
use crate::core::codec::postings::blocktree::BlockTermState;
use crate::core::codec::postings::{DocIterator, PostingIterator, PostingsReaderBase, NO_MORE_DOCS};
use crate::core::codec::segment_infos::SegmentReadState;
use crate::core::store::directory::Directory;
use crate::core::store::io::{DataInput, DataOutput, IndexInput};
use crate::core::util::{BitsRef, DocId};
use crate::error::ErrorKind::IllegalState;
use crate::error::Result;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const MOCK_POSTINGS_CODEC: &str = "MockPostings";
pub const MOCK_POSTINGS_VERSION: i32 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MockTermState {
    pub docs: Vec<DocId>,
}

/// Writes the postings header and the per-term metadata.
///
/// The first doc of a term is a zig-zag encoded delta against the first doc
/// of the previous term in the same block, unless the term is absolute.
#[derive(Default)]
pub struct MockPostingsWriter {
    last_first_doc: DocId,
}

impl MockPostingsWriter {
    pub fn write_header<T: DataOutput + ?Sized>(&self, out: &mut T) -> Result<()> {
        codec_util::write_header(out, MOCK_POSTINGS_CODEC, MOCK_POSTINGS_VERSION)
    }

    pub fn encode_term<T: DataOutput + ?Sized>(
        &mut self,
        out: &mut T,
        docs: &[DocId],
        absolute: bool,
    ) -> Result<()> {
        debug_assert!(!docs.is_empty());
        if absolute {
            self.last_first_doc = 0;
        }
        out.write_vint(docs.len() as i32)?;
        let mut prev = self.last_first_doc;
        for (i, &doc) in docs.iter().enumerate() {
            if i == 0 {
                let delta = i64::from(doc) - i64::from(prev);
                out.write_vlong((delta << 1) ^ (delta >> 63))?;
            } else {
                out.write_vint(doc - prev)?;
            }
            prev = doc;
        }
        self.last_first_doc = docs[0];
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPostingsReader {
    initialized: bool,
    close_count: Arc<AtomicUsize>,
}

impl MockPostingsReader {
    pub fn new() -> MockPostingsReader {
        MockPostingsReader::default()
    }

    /// Shared counter of `close` calls, readable after the reader was moved.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_count)
    }
}

impl PostingsReaderBase for MockPostingsReader {
    type TermState = MockTermState;
    type Postings = MockPostingIterator;

    fn init<D: Directory>(
        &mut self,
        terms_in: &mut dyn IndexInput,
        _state: &SegmentReadState<'_, D>,
    ) -> Result<()> {
        codec_util::check_header(
            terms_in,
            MOCK_POSTINGS_CODEC,
            MOCK_POSTINGS_VERSION,
            MOCK_POSTINGS_VERSION,
        )?;
        self.initialized = true;
        Ok(())
    }

    fn decode_term(
        &self,
        bytes: &mut dyn DataInput,
        _field_info: &FieldInfo,
        state: &mut BlockTermState<MockTermState>,
        absolute: bool,
    ) -> Result<()> {
        let prev_first = if absolute {
            0
        } else {
            state.postings.docs.first().cloned().unwrap_or(0)
        };
        let count = bytes.read_vint()?;
        let docs = &mut state.postings.docs;
        docs.clear();
        let mut prev = prev_first;
        for i in 0..count {
            let doc = if i == 0 {
                let zig_zag = bytes.read_vlong()?;
                let delta = (zig_zag as u64 >> 1) as i64 ^ -(zig_zag & 1);
                (i64::from(prev) + delta) as DocId
            } else {
                prev + bytes.read_vint()?
            };
            docs.push(doc);
            prev = doc;
        }
        Ok(())
    }

    fn postings(
        &self,
        _field_info: &FieldInfo,
        state: &BlockTermState<MockTermState>,
        live_docs: Option<BitsRef>,
        _flags: u16,
    ) -> Result<MockPostingIterator> {
        if !self.initialized {
            bail!(IllegalState("postings reader is not initialized".into()));
        }
        let mut docs = Vec::with_capacity(state.postings.docs.len());
        for &doc in &state.postings.docs {
            let live = match live_docs {
                Some(ref bits) => bits.get(doc as usize)?,
                None => true,
            };
            if live {
                docs.push(doc);
            }
        }
        Ok(MockPostingIterator {
            docs,
            upto: 0,
            doc: -1,
        })
    }

    fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

pub struct MockPostingIterator {
    docs: Vec<DocId>,
    upto: usize,
    doc: DocId,
}

impl DocIterator for MockPostingIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        self.doc = match self.docs.get(self.upto) {
            Some(&doc) => doc,
            None => NO_MORE_DOCS,
        };
        self.upto += 1;
        Ok(self.doc)
    }

    fn cost(&self) -> usize {
        self.docs.len()
    }
}

impl PostingIterator for MockPostingIterator {
    fn freq(&self) -> Result<i32> {
        Ok(1)
    }

    fn next_position(&mut self) -> Result<i32> {
        Ok(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::field_infos::IndexOptions;

    #[test]
    fn test_delta_encoded_terms() {
        let field = FieldInfo::new("f".into(), 0, IndexOptions::Docs, false).unwrap();
        let mut writer = MockPostingsWriter::default();
        let mut bytes = Vec::new();
        writer.encode_term(&mut bytes, &[5, 9, 30], true).unwrap();
        writer.encode_term(&mut bytes, &[2, 3], false).unwrap();

        let reader = MockPostingsReader::new();
        let mut state = reader.new_term_state();
        let mut input: &[u8] = &bytes;
        reader.decode_term(&mut input, &field, &mut state, true).unwrap();
        assert_eq!(state.postings.docs, vec![5, 9, 30]);
        reader.decode_term(&mut input, &field, &mut state, false).unwrap();
        assert_eq!(state.postings.docs, vec![2, 3]);
        assert!(input.is_empty());
    }
}
