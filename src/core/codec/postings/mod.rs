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

pub mod blocktree;

mod posting_iterator;

pub use self::posting_iterator::*;

#[cfg(test)]
pub(crate) mod mock_postings;

use crate::core::codec::field_infos::FieldInfo;
use crate::core::codec::postings::blocktree::BlockTermState;
use crate::core::codec::segment_infos::SegmentReadState;
use crate::core::store::directory::Directory;
use crate::core::store::io::{DataInput, IndexInput};
use crate::core::util::BitsRef;
use crate::error::Result;

use std::fmt::Debug;

/// The core terms dictionaries (like `BlockTreeTermsReader`) produce a
/// `BlockTermState` for every term they visit. This trait is the postings
/// side of that contract: it decodes the per-term metadata blob into the
/// postings-specific part of the state, and produces a `PostingIterator`
/// from a decoded state.
///
/// One implementation exists per postings format; the terms dictionary is
/// generic over it.
pub trait PostingsReaderBase: Send + Sync {
    /// Postings-specific part of a term's state.
    type TermState: Clone + Default + Debug + Send + Sync;

    type Postings: PostingIterator;

    /// Performs any initialization, such as reading and verifying the
    /// postings header, from the terms dictionary input.
    fn init<D: Directory>(
        &mut self,
        terms_in: &mut dyn IndexInput,
        state: &SegmentReadState<'_, D>,
    ) -> Result<()>;

    /// Returns a newly created empty term state.
    fn new_term_state(&self) -> BlockTermState<Self::TermState> {
        BlockTermState::new(Self::TermState::default())
    }

    /// Decodes the metadata of one term from `bytes` into `state`. When
    /// `absolute` is false the encoded values are deltas against the term
    /// previously decoded into `state`.
    fn decode_term(
        &self,
        bytes: &mut dyn DataInput,
        field_info: &FieldInfo,
        state: &mut BlockTermState<Self::TermState>,
        absolute: bool,
    ) -> Result<()>;

    /// Must fully consume state, since after this call that state may be
    /// reused.
    fn postings(
        &self,
        field_info: &FieldInfo,
        state: &BlockTermState<Self::TermState>,
        live_docs: Option<BitsRef>,
        flags: u16,
    ) -> Result<Self::Postings>;

    /// Checks consistency of the postings files, as far as the format allows.
    fn check_integrity(&self) -> Result<()> {
        Ok(())
    }

    /// Releases the files held by this reader.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
