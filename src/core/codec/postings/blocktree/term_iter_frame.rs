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

use crate::core::codec::field_infos::{FieldInfo, IndexOptions};
use crate::core::codec::postings::blocktree::BlockTermState;
use crate::core::codec::postings::PostingsReaderBase;
use crate::core::codec::SeekStatus;
use crate::core::store::io::{ByteArrayDataInput, DataInput, IndexInput};
use crate::core::util::fst::{Arc as FSTArc, ByteSequenceOutput};
use crate::core::util::UnsignedShift;

use crate::error::ErrorKind::CorruptIndex;
use crate::error::Result;

use std::cmp::Ordering;

/// Bytes of the term an iterator is positioned on.
///
/// `bytes` only grows; the current term is its first `len` bytes.
#[derive(Debug, Default)]
pub(crate) struct TermBuffer {
    pub bytes: Vec<u8>,
    pub len: usize,
    // true when the bytes are a term, false on a sub-block entry
    pub exists: bool,
}

impl TermBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn set_len(&mut self, len: usize) {
        self.grow(len);
        self.len = len;
    }

    pub fn grow(&mut self, len: usize) {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
    }

    pub fn copy_from(&mut self, bytes: &[u8]) {
        self.set_len(bytes.len());
        self.bytes[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// How a scan of one block for a target ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScanResult {
    Seek(SeekStatus),
    /// Stopped on a sub-block entry whose bytes are a prefix of the target;
    /// the target can only be inside the block at `last_sub_fp`.
    SubBlock,
}

/// One block of the terms dictionary, decoded by a `SegmentTermIterator`.
///
/// Frames are pooled by depth in the iterator's stack and reloaded in place,
/// so the byte buffers only ever grow.
pub(crate) struct SegmentTermsIterFrame<S> {
    pub ord: usize,
    pub has_terms: bool,
    pub has_terms_orig: bool,
    pub is_floor: bool,
    pub arc: Option<FSTArc<ByteSequenceOutput>>,
    // File pointer where this block was loaded from
    pub fp: i64,
    pub fp_orig: i64,
    pub fp_end: i64,
    pub suffixes_reader: ByteArrayDataInput<Vec<u8>>,
    pub stats_reader: ByteArrayDataInput<Vec<u8>>,
    floor_data_reader: ByteArrayDataInput<Vec<u8>>,
    // Length of prefix shared by all terms in this block
    pub prefix: usize,
    // Number of entries (term or sub-block) in this block
    pub ent_count: i32,
    // Which term we will next read, or -1 if the block isn't loaded yet
    pub next_ent: i32,
    // True if this block is either not a floor block,
    // or, it's the last sub-block of a floor block
    pub is_last_in_floor: bool,
    // True if all entries are terms
    pub is_leaf_block: bool,
    pub last_sub_fp: i64,
    next_floor_label: i32,
    num_follow_floor_blocks: i32,
    // Next term to decode metadata; metadata is decoded lazily, only once
    // a term is selected and its stats or postings are asked for
    pub metadata_upto: i32,
    pub state: BlockTermState<S>,
    bytes_reader: ByteArrayDataInput<Vec<u8>>,
    start_byte_pos: usize,
    suffix: usize,
    sub_code: i64,
}

impl<S: Clone + Default> SegmentTermsIterFrame<S> {
    pub fn new(ord: usize) -> Self {
        SegmentTermsIterFrame {
            ord,
            has_terms: false,
            has_terms_orig: false,
            is_floor: false,
            arc: None,
            fp: 0,
            fp_orig: 0,
            fp_end: 0,
            suffixes_reader: ByteArrayDataInput::with_capacity(128),
            stats_reader: ByteArrayDataInput::with_capacity(64),
            floor_data_reader: ByteArrayDataInput::with_capacity(32),
            prefix: 0,
            ent_count: 0,
            next_ent: -1,
            is_last_in_floor: false,
            is_leaf_block: false,
            last_sub_fp: -1,
            next_floor_label: 0,
            num_follow_floor_blocks: 0,
            metadata_upto: 0,
            state: BlockTermState::new(S::default()),
            bytes_reader: ByteArrayDataInput::with_capacity(32),
            start_byte_pos: 0,
            suffix: 0,
            sub_code: 0,
        }
    }

    /// Takes the floor data trailing a block code: the number of following
    /// floor blocks, then per block its lead label and file pointer delta.
    pub fn set_floor_data(&mut self, floor_data: &[u8]) -> Result<()> {
        if floor_data.is_empty() {
            bail!(CorruptIndex("floor block code has no floor data".into()));
        }
        self.floor_data_reader.reload_slice(floor_data);
        self.read_floor_header()
    }

    fn read_floor_header(&mut self) -> Result<()> {
        self.num_follow_floor_blocks = self.floor_data_reader.read_vint()?;
        if self.num_follow_floor_blocks <= 0 {
            bail!(CorruptIndex(format!(
                "invalid floor block count: {}",
                self.num_follow_floor_blocks
            )));
        }
        self.next_floor_label = i32::from(self.floor_data_reader.read_byte()?);
        Ok(())
    }

    pub fn term_block_ord(&self) -> i32 {
        if self.is_leaf_block {
            self.next_ent
        } else {
            self.state.term_block_ord
        }
    }

    pub fn load_next_floor_block(&mut self, input: &mut dyn IndexInput) -> Result<()> {
        debug_assert!(!self.is_last_in_floor);
        self.fp = self.fp_end;
        self.next_ent = -1;
        self.load_block(input)
    }

    // Does initial decode of next block of terms; this
    // doesn't actually decode the docFreq, totalTermFreq,
    // postings details (frq/prx offset, etc.) metadata;
    // it just loads them as bytes blobs which are then
    // decoded on-demand if the metadata is ever requested
    // for any term in this block.
    pub fn load_block(&mut self, input: &mut dyn IndexInput) -> Result<()> {
        if self.next_ent != -1 {
            // Already loaded
            return Ok(());
        }
        input.seek(self.fp)?;
        let code = input.read_vint()?;
        self.ent_count = code.unsigned_shift(1);
        if self.ent_count <= 0 {
            bail!(CorruptIndex(format!(
                "empty block at fp={} (resource={})",
                self.fp,
                input.name()
            )));
        }
        self.is_last_in_floor = (code & 1) != 0;
        debug_assert!(self.arc.is_none() || self.is_floor || self.is_last_in_floor);

        // term suffixes:
        let code = input.read_vint()?;
        self.is_leaf_block = (code & 1) != 0;
        let num_bytes = region_len(input, code.unsigned_shift(1))?;
        self.suffixes_reader.reload(input, num_bytes)?;

        // stats
        let num_bytes = input.read_vint()?;
        let num_bytes = region_len(input, num_bytes)?;
        self.stats_reader.reload(input, num_bytes)?;
        self.metadata_upto = 0;

        self.state.term_block_ord = 0;
        self.next_ent = 0;
        self.last_sub_fp = -1;

        // metadata
        let num_bytes = input.read_vint()?;
        let num_bytes = region_len(input, num_bytes)?;
        self.bytes_reader.reload(input, num_bytes)?;

        // Sub-blocks of a single floor block are always
        // written one after another
        self.fp_end = input.file_pointer();
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.fp = self.fp_orig;
        self.next_ent = -1;
        self.has_terms = self.has_terms_orig;
        if self.is_floor {
            self.floor_data_reader.rewind();
            self.read_floor_header()?;
        }
        Ok(())
    }

    /// Decodes the next entry into `term`; returns true if it's a sub-block.
    pub fn next(&mut self, term: &mut TermBuffer, input: &mut dyn IndexInput) -> Result<bool> {
        if self.is_leaf_block {
            self.next_leaf(term)?;
            Ok(false)
        } else {
            self.next_non_leaf(term, input)
        }
    }

    fn next_leaf(&mut self, term: &mut TermBuffer) -> Result<()> {
        debug_assert!(self.next_ent != -1 && self.next_ent < self.ent_count);
        self.next_ent += 1;
        let len = self.suffixes_reader.read_vint()?;
        self.suffix = self.suffix_len(len)?;
        self.start_byte_pos = self.suffixes_reader.position();
        term.set_len(self.prefix + self.suffix);
        self.suffixes_reader
            .read_bytes(&mut term.bytes, self.prefix, self.suffix)?;
        term.exists = true;
        Ok(())
    }

    fn next_non_leaf(&mut self, term: &mut TermBuffer, input: &mut dyn IndexInput) -> Result<bool> {
        loop {
            if self.next_ent == self.ent_count {
                self.load_next_floor_block(input)?;
                if self.is_leaf_block {
                    self.next_leaf(term)?;
                    return Ok(false);
                } else {
                    continue;
                }
            }

            debug_assert!(self.next_ent != -1 && self.next_ent < self.ent_count);
            self.next_ent += 1;
            let code = self.suffixes_reader.read_vint()?;
            self.suffix = self.suffix_len(code.unsigned_shift(1))?;
            self.start_byte_pos = self.suffixes_reader.position();
            term.set_len(self.prefix + self.suffix);
            self.suffixes_reader
                .read_bytes(&mut term.bytes, self.prefix, self.suffix)?;
            if (code & 1) == 0 {
                // A normal term
                term.exists = true;
                self.sub_code = 0;
                self.state.term_block_ord += 1;
                return Ok(false);
            } else {
                // A sub-block; make sub-FP absolute:
                term.exists = false;
                self.sub_code = self.suffixes_reader.read_vlong()?;
                self.last_sub_fp = self.fp - self.sub_code;
                return Ok(true);
            }
        }
    }

    /// Moves to the floor block that may hold `target`, reading the floor
    /// data only as far as needed.
    pub fn scan_to_floor_frame(&mut self, target: &[u8]) -> Result<()> {
        if !self.is_floor || target.len() <= self.prefix {
            return Ok(());
        }

        let target_label = i32::from(target[self.prefix]);
        if target_label < self.next_floor_label {
            return Ok(());
        }

        debug_assert!(self.num_follow_floor_blocks > 0);
        let mut new_fp;
        loop {
            let code = self.floor_data_reader.read_vlong()?;
            new_fp = self.fp_orig + code.unsigned_shift(1);
            self.has_terms = (code & 1) != 0;
            self.is_last_in_floor = self.num_follow_floor_blocks == 1;
            self.num_follow_floor_blocks -= 1;
            if self.is_last_in_floor {
                self.next_floor_label = 256;
                break;
            } else {
                self.next_floor_label = i32::from(self.floor_data_reader.read_byte()?);
                if target_label < self.next_floor_label {
                    break;
                }
            }
        }

        if new_fp != self.fp {
            self.next_ent = -1;
            self.fp = new_fp;
        }
        Ok(())
    }

    /// Catches up on metadata decode up to the current term.
    pub fn decode_metadata<P>(&mut self, postings: &P, field_info: &FieldInfo) -> Result<()>
    where
        P: PostingsReaderBase<TermState = S>,
    {
        let limit = self.term_block_ord();
        let mut absolute = self.metadata_upto == 0;
        debug_assert!(limit > 0);

        while self.metadata_upto < limit {
            // stats
            self.state.doc_freq = self.stats_reader.read_vint()?;
            if field_info.index_options != IndexOptions::Docs {
                self.state.total_term_freq =
                    i64::from(self.state.doc_freq) + self.stats_reader.read_vlong()?;
            } else {
                self.state.total_term_freq = -1;
            }

            // metadata
            postings.decode_term(&mut self.bytes_reader, field_info, &mut self.state, absolute)?;
            self.state.block_file_pointer = self.fp;
            self.metadata_upto += 1;
            absolute = false;
        }
        self.state.term_block_ord = self.metadata_upto;
        Ok(())
    }

    fn prefix_matches(&self, target: &[u8], term: &TermBuffer) -> bool {
        target.len() >= self.prefix && target[..self.prefix] == term.bytes[..self.prefix]
    }

    // Scans to sub-block that has this target fp; only
    // called by next(); NOTE: does not set
    // start_byte_pos/suffix as a side effect
    pub fn scan_to_sub_block(&mut self, sub_fp: i64) -> Result<()> {
        debug_assert!(!self.is_leaf_block);
        if self.last_sub_fp == sub_fp {
            return Ok(());
        }

        debug_assert!(sub_fp < self.fp);
        let target_sub_code = self.fp - sub_fp;
        while self.next_ent < self.ent_count {
            self.next_ent += 1;
            let code = self.suffixes_reader.read_vint()?;
            let len = self.suffix_len(code.unsigned_shift(1))?;
            self.suffixes_reader.skip_bytes(len)?;
            if (code & 1) != 0 {
                let sub_code = self.suffixes_reader.read_vlong()?;
                if target_sub_code == sub_code {
                    self.last_sub_fp = sub_fp;
                    return Ok(());
                }
            } else {
                self.state.term_block_ord += 1;
            }
        }
        bail!(CorruptIndex(format!(
            "block at fp={} has no sub-block at fp={}",
            self.fp, sub_fp
        )))
    }

    // NOTE: sets start_byte_pos/suffix as a side effect
    pub fn scan_to_term(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
    ) -> Result<ScanResult> {
        if self.is_leaf_block {
            self.scan_to_term_leaf(target, exact_only, term)
        } else {
            self.scan_to_term_non_leaf(target, exact_only, term)
        }
    }

    // Target's prefix matches this block's prefix; we
    // scan the entries check if the suffix matches.
    fn scan_to_term_leaf(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
    ) -> Result<ScanResult> {
        debug_assert!(self.next_ent != -1);
        term.exists = true;
        self.sub_code = 0;

        if self.next_ent == self.ent_count {
            if exact_only {
                self.fill_term(term);
            }
            return Ok(ScanResult::Seek(SeekStatus::End));
        }

        debug_assert!(self.prefix_matches(target, term));

        // Loop over each entry (term or sub-block) in this block:
        while self.next_ent < self.ent_count {
            self.next_ent += 1;
            let len = self.suffixes_reader.read_vint()?;
            self.suffix = self.suffix_len(len)?;
            self.start_byte_pos = self.suffixes_reader.position();
            self.suffixes_reader.skip_bytes(self.suffix)?;

            match self.compare_to(target) {
                // Current entry is still before the target; keep scanning
                Ordering::Less => continue,
                Ordering::Greater => {
                    // Done!  Current entry is after target
                    self.fill_term(term);
                    return Ok(ScanResult::Seek(SeekStatus::NotFound));
                }
                Ordering::Equal => {
                    self.fill_term(term);
                    return Ok(ScanResult::Seek(SeekStatus::Found));
                }
            }
        }

        // The index may point us at this block even though the target is
        // after its last term (but before the first term of the next block).
        if exact_only {
            self.fill_term(term);
        }
        Ok(ScanResult::Seek(SeekStatus::End))
    }

    // Target's prefix matches this block's prefix; we
    // scan the entries check if the suffix matches.
    fn scan_to_term_non_leaf(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
    ) -> Result<ScanResult> {
        debug_assert_ne!(self.next_ent, -1);

        if self.next_ent == self.ent_count {
            if exact_only {
                self.fill_term(term);
                term.exists = self.sub_code == 0;
            }
            return Ok(ScanResult::Seek(SeekStatus::End));
        }

        debug_assert!(self.prefix_matches(target, term));

        // Loop over each entry (term or sub-block) in this block:
        while self.next_ent < self.ent_count {
            self.next_ent += 1;
            let code = self.suffixes_reader.read_vint()?;
            self.suffix = self.suffix_len(code.unsigned_shift(1))?;
            self.start_byte_pos = self.suffixes_reader.position();
            self.suffixes_reader.skip_bytes(self.suffix)?;
            term.exists = (code & 1) == 0;
            if term.exists {
                self.state.term_block_ord += 1;
                self.sub_code = 0;
            } else {
                self.sub_code = self.suffixes_reader.read_vlong()?;
                self.last_sub_fp = self.fp - self.sub_code;
            }

            match self.compare_to(target) {
                Ordering::Less => {
                    let is_prefix = target
                        .get(self.prefix..)
                        .map_or(false, |rest| rest.starts_with(self.suffix_bytes()));
                    if !term.exists && is_prefix {
                        // the sub-block's prefix is a prefix of the target
                        self.fill_term(term);
                        return Ok(ScanResult::SubBlock);
                    }
                }
                Ordering::Greater => {
                    // Done!  Current entry is after target; when it is a
                    // sub-block the caller descends to its first term
                    self.fill_term(term);
                    return Ok(ScanResult::Seek(SeekStatus::NotFound));
                }
                Ordering::Equal => {
                    self.fill_term(term);
                    if term.exists {
                        return Ok(ScanResult::Seek(SeekStatus::Found));
                    }
                    // the term equal to a sub-block prefix lives in that
                    // sub-block, with an empty suffix
                    return Ok(ScanResult::SubBlock);
                }
            }
        }

        if exact_only {
            self.fill_term(term);
        }
        Ok(ScanResult::Seek(SeekStatus::End))
    }

    fn suffix_bytes(&self) -> &[u8] {
        &self.suffixes_reader.data()[self.start_byte_pos..self.start_byte_pos + self.suffix]
    }

    // Compares prefix + current suffix against the target, unsigned.
    fn compare_to(&self, target: &[u8]) -> Ordering {
        let rest = target.get(self.prefix..).unwrap_or(&[]);
        self.suffix_bytes().cmp(rest)
    }

    fn suffix_len(&self, len: i32) -> Result<usize> {
        let remaining = self.suffixes_reader.length() - self.suffixes_reader.position();
        if len < 0 || len as usize > remaining {
            bail!(CorruptIndex(format!(
                "invalid suffix length {} in block at fp={}",
                len, self.fp
            )));
        }
        Ok(len as usize)
    }

    fn fill_term(&self, term: &mut TermBuffer) {
        let term_length = self.prefix + self.suffix;
        term.set_len(term_length);
        term.bytes[self.prefix..term_length].copy_from_slice(self.suffix_bytes());
    }
}

// Length of a block region, which can't run past the end of the file.
fn region_len(input: &dyn IndexInput, len: i32) -> Result<usize> {
    let remaining = input.len() as i64 - input.file_pointer();
    if len < 0 || i64::from(len) > remaining {
        bail!(CorruptIndex(format!(
            "invalid block region length {} at fp={} (resource={})",
            len,
            input.file_pointer(),
            input.name()
        )));
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::directory::{Directory, RAMDirectory};
    use crate::core::store::io::DataOutput;
    use crate::core::store::IO_CONTEXT_READ;

    // leaf block "ab" + {"c", "d", "e"}
    fn leaf_block() -> Vec<u8> {
        let mut out = Vec::new();
        out.write_vint(3 << 1 | 1).unwrap();
        let mut suffixes = Vec::new();
        for s in &[b"c", b"d", b"e"] {
            suffixes.write_vint(1).unwrap();
            suffixes.extend_from_slice(&s[..]);
        }
        out.write_vint((suffixes.len() as i32) << 1 | 1).unwrap();
        out.extend_from_slice(&suffixes);
        let stats = vec![1u8, 2, 3];
        out.write_vint(stats.len() as i32).unwrap();
        out.extend_from_slice(&stats);
        out.write_vint(0).unwrap();
        out
    }

    fn open(bytes: Vec<u8>) -> Box<dyn IndexInput> {
        let dir = RAMDirectory::new();
        dir.write_file("blocks", bytes).unwrap();
        dir.open_input("blocks", &IO_CONTEXT_READ).unwrap()
    }

    #[test]
    fn test_load_and_scan_leaf_block() {
        let mut input = open(leaf_block());
        let mut frame: SegmentTermsIterFrame<()> = SegmentTermsIterFrame::new(1);
        frame.prefix = 2;
        frame.load_block(input.as_mut()).unwrap();
        assert_eq!(frame.ent_count, 3);
        assert!(frame.is_leaf_block);
        assert!(frame.is_last_in_floor);
        assert_eq!(frame.fp_end, input.len() as i64);

        let mut term = TermBuffer::default();
        term.copy_from(b"ab");
        let res = frame.scan_to_term(b"abd", true, &mut term).unwrap();
        assert_eq!(res, ScanResult::Seek(SeekStatus::Found));
        assert_eq!(term.as_slice(), b"abd");
        assert_eq!(frame.term_block_ord(), 2);

        frame.rewind().unwrap();
        frame.load_block(input.as_mut()).unwrap();
        let res = frame.scan_to_term(b"abcc", false, &mut term).unwrap();
        assert_eq!(res, ScanResult::Seek(SeekStatus::NotFound));
        assert_eq!(term.as_slice(), b"abd");

        frame.rewind().unwrap();
        frame.load_block(input.as_mut()).unwrap();
        let res = frame.scan_to_term(b"abz", false, &mut term).unwrap();
        assert_eq!(res, ScanResult::Seek(SeekStatus::End));
    }

    #[test]
    fn test_next_walks_entries() {
        let mut input = open(leaf_block());
        let mut frame: SegmentTermsIterFrame<()> = SegmentTermsIterFrame::new(1);
        frame.load_block(input.as_mut()).unwrap();
        let mut term = TermBuffer::default();
        let mut seen = vec![];
        while frame.next_ent < frame.ent_count {
            assert!(!frame.next(&mut term, input.as_mut()).unwrap());
            assert!(term.exists);
            seen.push(term.as_slice().to_vec());
        }
        assert_eq!(seen, vec![b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn test_floor_data() {
        let mut frame: SegmentTermsIterFrame<()> = SegmentTermsIterFrame::new(1);
        frame.fp_orig = 100;
        frame.fp = 100;
        frame.is_floor = true;
        frame.prefix = 1;

        // two following blocks: 'm' at +10 with terms, 't' at +20 without
        let mut floor = Vec::new();
        floor.write_vint(2).unwrap();
        floor.write_byte(b'm').unwrap();
        floor.write_vlong(10 << 1 | 1).unwrap();
        floor.write_byte(b't').unwrap();
        floor.write_vlong(20 << 1).unwrap();
        frame.set_floor_data(&floor).unwrap();

        frame.scan_to_floor_frame(b"xa").unwrap();
        assert_eq!(frame.fp, 100);

        frame.scan_to_floor_frame(b"xp").unwrap();
        assert_eq!(frame.fp, 110);
        assert!(frame.has_terms);
        assert!(!frame.is_last_in_floor);

        frame.rewind().unwrap();
        frame.scan_to_floor_frame(b"xz").unwrap();
        assert_eq!(frame.fp, 120);
        assert!(!frame.has_terms);
        assert!(frame.is_last_in_floor);

        assert!(frame.set_floor_data(&[]).is_err());
    }

    #[test]
    fn test_corrupt_region_length() {
        let mut bytes = Vec::new();
        bytes.write_vint(1 << 1 | 1).unwrap();
        bytes.write_vint(100 << 1 | 1).unwrap();
        bytes.push(0);
        let mut input = open(bytes);
        let mut frame: SegmentTermsIterFrame<()> = SegmentTermsIterFrame::new(1);
        assert!(frame.load_block(input.as_mut()).is_err());
    }
}
