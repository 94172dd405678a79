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

//! Block-tree terms dictionary.
//!
//! Terms are stored in blocks of entries sharing a prefix (the `.tim` file).
//! Each entry is either a term suffix or a pointer to a sub-block holding
//! terms with a longer prefix. A prefix trie, encoded as an FST in the `.tip`
//! file, maps every block prefix to the block's file pointer so that a seek
//! can jump straight to the deepest block that may hold the target.

mod blocktree_reader;

pub use self::blocktree_reader::*;

mod term_iter_frame;

#[cfg(test)]
pub(crate) mod blocktree_writer;

use crate::core::codec::TermState;

/// Extension of terms file
pub const TERMS_EXTENSION: &str = "tim";
pub const TERMS_CODEC_NAME: &str = "BLOCK_TREE_TERMS_DICT";

/// Initial terms format.
pub const VERSION_START: i32 = 0;

/// The directory offset moved from right after the header to a trailing
/// long at the end of the file, so the directory can be appended last.
pub const VERSION_APPEND_ONLY: i32 = 1;

/// Current terms format.
pub const VERSION_CURRENT: i32 = VERSION_APPEND_ONLY;

/// Extension of terms index file
pub const TERMS_INDEX_EXTENSION: &str = "tip";
pub const TERMS_INDEX_CODEC_NAME: &str = "BLOCK_TREE_TERMS_INDEX";

/// Number of low bits of a block code reserved for flags.
pub const OUTPUT_FLAGS_NUM_BITS: usize = 2;
pub const OUTPUT_FLAGS_MASK: i64 = 0x3;
/// The block holds at least one term (not only sub-blocks).
pub const OUTPUT_FLAG_HAS_TERMS: i64 = 0x1;
/// The block is split into a chain of floor blocks; floor data follows the code.
pub const OUTPUT_FLAG_IS_FLOOR: i64 = 0x2;

/// Packs a block file pointer and its flags into the code stored in the
/// terms index and in the field directory.
pub fn encode_output(fp: i64, has_terms: bool, is_floor: bool) -> i64 {
    debug_assert!(fp < (1i64 << 62));
    let mut code = fp << OUTPUT_FLAGS_NUM_BITS;
    if has_terms {
        code |= OUTPUT_FLAG_HAS_TERMS;
    }
    if is_floor {
        code |= OUTPUT_FLAG_IS_FLOOR;
    }
    code
}

/// Holds all state required for `PostingsReaderBase` to produce a
/// `PostingIterator` without re-seeking the term dict.
///
/// The postings format keeps its own part of the state in `postings`.
#[derive(Clone, Debug, Default)]
pub struct BlockTermState<S> {
    /// Term ordinal, i.e. its position in the full list of
    /// sorted terms.
    pub ord: i64,
    /// how many docs have this term
    pub doc_freq: i32,

    /// total number of occurrences of this term, -1 when the field
    /// omits term frequencies
    pub total_term_freq: i64,

    /// the term's ord in the current block
    pub term_block_ord: i32,

    /// fp into the terms dict primary file (_X.tim) that holds this term
    pub block_file_pointer: i64,

    pub postings: S,
}

impl<S> BlockTermState<S> {
    pub fn new(postings: S) -> BlockTermState<S> {
        BlockTermState {
            ord: 0,
            doc_freq: 0,
            total_term_freq: -1,
            term_block_ord: 0,
            block_file_pointer: 0,
            postings,
        }
    }

    pub fn ord(&self) -> i64 {
        self.ord
    }

    pub fn doc_freq(&self) -> i32 {
        self.doc_freq
    }

    pub fn total_term_freq(&self) -> i64 {
        self.total_term_freq
    }

    pub fn term_block_ord(&self) -> i32 {
        self.term_block_ord
    }

    pub fn block_file_pointer(&self) -> i64 {
        self.block_file_pointer
    }
}

impl<S: Clone> BlockTermState<S> {
    pub fn copy_from(&mut self, other: &BlockTermState<S>) {
        self.ord = other.ord;
        self.doc_freq = other.doc_freq;
        self.total_term_freq = other.total_term_freq;
        self.term_block_ord = other.term_block_ord;
        self.block_file_pointer = other.block_file_pointer;
        self.postings.clone_from(&other.postings);
    }
}

impl<S: Clone + Send + Sync> TermState for BlockTermState<S> {}
