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

use crate::core::util::DocId;
use crate::error::Result;

/// Returned by `DocIterator::doc_id` and `next` once iteration is exhausted.
pub const NO_MORE_DOCS: DocId = ::std::i32::MAX;

/// Flag constants for `TermIterator::postings_with_flags`.
pub struct PostingIteratorFlags;

impl PostingIteratorFlags {
    /// Don't require per-document postings in the returned iterator.
    pub const NONE: u16 = 0;

    /// Require term frequencies in the returned iterator.
    pub const FREQS: u16 = 1 << 3;

    /// Require term positions in the returned iterator.
    pub const POSITIONS: u16 = Self::FREQS | 1 << 4;

    /// Require offsets in the returned iterator.
    pub const OFFSETS: u16 = Self::POSITIONS | 1 << 5;

    /// Require payloads in the returned iterator.
    pub const PAYLOADS: u16 = Self::POSITIONS | 1 << 6;

    /// Require positions, payloads and offsets in the returned iterator.
    pub const ALL: u16 = Self::OFFSETS | Self::PAYLOADS;

    pub fn feature_requested(flags: u16, feature: u16) -> bool {
        (flags & feature) == feature
    }
}

/// Iterates over a sorted set of doc ids.
pub trait DocIterator: Send {
    /// Returns `-1` before the first `next()` or `advance()`, `NO_MORE_DOCS`
    /// once exhausted, otherwise the doc the iterator is currently on.
    fn doc_id(&self) -> DocId;

    /// Advances to the next document and returns it, or `NO_MORE_DOCS`.
    fn next(&mut self) -> Result<DocId>;

    /// Advances to the first document whose number is greater than or equal
    /// to `target` and returns it, or `NO_MORE_DOCS`.
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let mut doc = self.doc_id();
        while doc < target {
            doc = self.next()?;
        }
        Ok(doc)
    }

    /// Upper bound of the number of documents this iterator may match.
    fn cost(&self) -> usize;
}

/// Iterates through the postings of one term.
///
/// NOTE: you must first call `next()` before using any of the per-doc methods.
pub trait PostingIterator: DocIterator {
    /// Returns term frequency in the current document, or 1 if the field was
    /// indexed with `IndexOptions::Docs`.
    fn freq(&self) -> Result<i32>;

    /// Returns the next position, or -1 if positions were not indexed.
    fn next_position(&mut self) -> Result<i32>;
}

/// A `PostingIterator` with no matching docs.
#[derive(Clone)]
pub struct EmptyPostingIterator {
    doc_id: DocId,
}

impl Default for EmptyPostingIterator {
    fn default() -> Self {
        EmptyPostingIterator { doc_id: -1 }
    }
}

impl DocIterator for EmptyPostingIterator {
    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn next(&mut self) -> Result<DocId> {
        self.doc_id = NO_MORE_DOCS;
        Ok(NO_MORE_DOCS)
    }

    fn advance(&mut self, _target: DocId) -> Result<DocId> {
        self.next()
    }

    fn cost(&self) -> usize {
        0
    }
}

impl PostingIterator for EmptyPostingIterator {
    fn freq(&self) -> Result<i32> {
        Ok(0)
    }

    fn next_position(&mut self) -> Result<i32> {
        Ok(-1)
    }
}
