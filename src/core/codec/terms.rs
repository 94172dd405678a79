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

use crate::core::codec::postings::{PostingIterator, PostingIteratorFlags};
use crate::core::util::BitsRef;

use crate::error::ErrorKind::{IllegalArgument, UnsupportedOperation};
use crate::error::Result;

use std::sync::Arc;

/// Encapsulates all required internal state to position the associated
/// `TermIterator` without re-seeking.
pub trait TermState: Send + Sync + Clone {}

/// for `TermIterator`s that don't support `TermState`.
impl TermState for () {}

/// Access to the terms in a specific field. See `Fields`.
pub trait Terms {
    type Iterator: TermIterator;

    /// Returns an iterator that will step through all terms, positioned
    /// before the first one.
    fn iterator(&self) -> Result<Self::Iterator>;

    /// Returns the number of terms for this field, or -1 if this
    /// measure isn't stored by the codec.
    fn size(&self) -> Result<i64>;

    /// Returns the sum of `TermIterator::total_term_freq` for all terms in
    /// this field, or -1 if the field omits term frequencies.
    fn sum_total_term_freq(&self) -> Result<i64>;

    /// Returns the sum of `TermIterator::doc_freq` for all terms in this field.
    fn sum_doc_freq(&self) -> Result<i64>;

    /// Returns the number of documents that have at least one term for this field.
    fn doc_count(&self) -> Result<i32>;

    fn has_freqs(&self) -> Result<bool>;

    fn has_offsets(&self) -> Result<bool>;

    fn has_positions(&self) -> Result<bool>;

    fn has_payloads(&self) -> Result<bool>;

    /// Returns the smallest term (in lexicographic order) in the field, or
    /// `None` when there are no terms.
    fn min(&self) -> Result<Option<Vec<u8>>> {
        self.iterator()?.next()
    }

    /// Returns the largest term (in lexicographic order) in the field, or
    /// `None` when there are no terms.
    ///
    /// The default implementation binary searches each byte of the result
    /// with `seek_ceil`, so it works without ordinal support.
    fn max(&self) -> Result<Option<Vec<u8>>> {
        let mut iterator = self.iterator()?;
        if iterator.next()?.is_none() {
            return Ok(None);
        }

        let mut scratch = vec![0u8];

        // iterates over digits:
        loop {
            let mut low = 0u32;
            let mut high = 256u32;

            // binary search the current digit for the highest value that
            // still has a term at or after it
            while high - low > 1 {
                let mid = (low + high) / 2;
                let last = scratch.len() - 1;
                scratch[last] = mid as u8;
                if iterator.seek_ceil(&scratch)? == SeekStatus::End {
                    high = mid;
                } else {
                    low = mid;
                }
            }

            let last = scratch.len() - 1;
            scratch[last] = low as u8;
            if iterator.seek_ceil(&scratch)? == SeekStatus::End {
                // even the 0 digit is past every term, so the prefix itself
                // is the largest term
                scratch.pop();
                return Ok(Some(scratch));
            }
            // the largest term extends `scratch`, move on to the next digit
            scratch.push(0);
        }
    }

    fn stats(&self) -> Result<String> {
        Ok(format!(
            "size={:?}, doc_count={:?}, sum_total_term_freq={:?}, sum_doc_freq={:?}",
            self.size()?,
            self.doc_count()?,
            self.sum_total_term_freq()?,
            self.sum_doc_freq()?
        ))
    }
}

impl<T: Terms> Terms for Arc<T> {
    type Iterator = T::Iterator;
    fn iterator(&self) -> Result<Self::Iterator> {
        (**self).iterator()
    }

    fn size(&self) -> Result<i64> {
        (**self).size()
    }

    fn sum_total_term_freq(&self) -> Result<i64> {
        (**self).sum_total_term_freq()
    }

    fn sum_doc_freq(&self) -> Result<i64> {
        (**self).sum_doc_freq()
    }

    fn doc_count(&self) -> Result<i32> {
        (**self).doc_count()
    }

    fn has_freqs(&self) -> Result<bool> {
        (**self).has_freqs()
    }

    fn has_offsets(&self) -> Result<bool> {
        (**self).has_offsets()
    }

    fn has_positions(&self) -> Result<bool> {
        (**self).has_positions()
    }

    fn has_payloads(&self) -> Result<bool> {
        (**self).has_payloads()
    }

    fn min(&self) -> Result<Option<Vec<u8>>> {
        (**self).min()
    }

    fn max(&self) -> Result<Option<Vec<u8>>> {
        (**self).max()
    }

    fn stats(&self) -> Result<String> {
        (**self).stats()
    }
}

/// Represents returned result from `TermIterator::seek_ceil`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SeekStatus {
    /// The term was not found, and the end of iteration was hit.
    End,
    /// The precise term was found.
    Found,
    /// A different term was found after the requested term
    NotFound,
}

/// Iterator over the terms of one field, in unsigned byte order.
pub trait TermIterator {
    type Postings: PostingIterator;
    type TermState: TermState;

    /// Increments the iteration to the next term and returns it, or `None`
    /// once the end of the iterator is reached. Calling it again after that
    /// keeps returning `None`.
    fn next(&mut self) -> Result<Option<Vec<u8>>>;

    /// Attempts to seek to the exact term, returning true if the term is
    /// found. If this returns false, the iterator is unpositioned.
    fn seek_exact(&mut self, text: &[u8]) -> Result<bool> {
        Ok(match self.seek_ceil(text)? {
            SeekStatus::Found => true,
            _ => false,
        })
    }

    /// Seeks to the specified term, if it exists, or to the next (ceiling)
    /// term. The target term may be before or after the current term. If
    /// this returns `SeekStatus::End`, the iterator is unpositioned.
    fn seek_ceil(&mut self, text: &[u8]) -> Result<SeekStatus>;

    /// Seeks to the specified term by ordinal, as previously returned by `ord`.
    fn seek_exact_ord(&mut self, ord: i64) -> Result<()>;

    /// Positions the iterator on `text` using a state previously obtained
    /// from `term_state`, without re-seeking the term dictionary where the
    /// implementation allows it.
    fn seek_exact_state(&mut self, text: &[u8], _state: &Self::TermState) -> Result<()> {
        if self.seek_exact(text)? {
            Ok(())
        } else {
            bail!(IllegalArgument(format!("Term {:?} does not exist", text)))
        }
    }

    /// Returns current term. Do not call this when the iterator is unpositioned.
    fn term(&self) -> Result<&[u8]>;

    /// Returns ordinal position for current term. This is an optional method.
    fn ord(&self) -> Result<i64>;

    /// Returns the number of documents containing the current term.
    fn doc_freq(&mut self) -> Result<i32>;

    /// Returns the total number of occurrences of this term across all
    /// documents, or -1 if the field omits term frequencies.
    fn total_term_freq(&mut self) -> Result<i64>;

    /// Get the `PostingIterator` for the current term with frequencies.
    fn postings(&mut self) -> Result<Self::Postings> {
        self.postings_with_flags(PostingIteratorFlags::FREQS)
    }

    fn postings_with_flags(&mut self, flags: u16) -> Result<Self::Postings> {
        self.postings_with_live_docs(None, flags)
    }

    /// Get the `PostingIterator` for the current term, skipping documents
    /// not set in `live_docs`.
    fn postings_with_live_docs(
        &mut self,
        live_docs: Option<BitsRef>,
        flags: u16,
    ) -> Result<Self::Postings>;

    /// Expert: returns the iterator's internal state, to position an iterator
    /// later without re-seeking the term dictionary.
    fn term_state(&mut self) -> Result<Self::TermState> {
        bail!(UnsupportedOperation(
            "TermIterator::term_state unsupported".into()
        ))
    }
}
