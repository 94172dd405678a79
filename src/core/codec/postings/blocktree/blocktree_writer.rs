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

//! Block tree writer used to build dictionaries for the reader tests.
//!
//! It follows the segmenting of the full writer: terms are pushed on a
//! pending stack, and whenever enough entries share a prefix that prefix is
//! closed into a block (or a chain of floor blocks when there are more than
//! `max_items_in_block`). Postings metadata comes from `MockPostingsWriter`.

use crate::core::codec::codec_util;
use crate::core::codec::field_infos::{FieldInfo, IndexOptions};
use crate::core::codec::postings::blocktree::{
    encode_output, TERMS_CODEC_NAME, TERMS_EXTENSION, TERMS_INDEX_CODEC_NAME,
    TERMS_INDEX_EXTENSION, VERSION_APPEND_ONLY, VERSION_CURRENT,
};
use crate::core::codec::postings::mock_postings::MockPostingsWriter;
use crate::core::codec::segment_infos::segment_file_name;
use crate::core::store::directory::Directory;
use crate::core::store::io::DataOutput;
use crate::core::store::IOContext;
use crate::core::util::fst::{ByteSequenceOutput, ByteSequenceOutputFactory, FstBuilder};
use crate::core::util::DocId;
use crate::error::ErrorKind::{IllegalArgument, IllegalState};
use crate::error::Result;

use byteorder::{BigEndian, ByteOrder};

use std::cmp::min;
use std::collections::BTreeSet;
use std::mem;

/// Suggested default value for the `min_items_in_block` parameter.
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 25;

/// Suggested default value for the `max_items_in_block` parameter.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 48;

/// A term to write, with the docs it occurs in. Each occurrence has a
/// frequency of 2 unless `total_term_freq` is changed.
#[derive(Clone, Debug)]
pub struct TermData {
    pub term: Vec<u8>,
    pub docs: Vec<DocId>,
    pub total_term_freq: i64,
}

impl TermData {
    pub fn new(term: &[u8], docs: &[DocId]) -> TermData {
        TermData {
            term: term.to_vec(),
            docs: docs.to_vec(),
            total_term_freq: 2 * docs.len() as i64,
        }
    }
}

/// One entry of the field directory. Tests may tamper with these before
/// `finish`.
#[derive(Clone, Debug)]
pub struct FieldMetaData {
    pub number: u32,
    pub has_freqs: bool,
    pub num_terms: i64,
    pub root_code: Vec<u8>,
    pub sum_total_term_freq: i64,
    pub sum_doc_freq: i64,
    pub doc_count: i32,
    pub index_start_fp: i64,
}

pub struct BlockTreeTermsWriter {
    version: i32,
    min_items_in_block: usize,
    max_items_in_block: usize,
    terms_out: Vec<u8>,
    index_out: Vec<u8>,
    postings_writer: MockPostingsWriter,
    pub fields: Vec<FieldMetaData>,
    /// Written instead of the real field count when set.
    pub num_fields_override: Option<i32>,
}

impl BlockTreeTermsWriter {
    pub fn new(
        version: i32,
        min_items_in_block: usize,
        max_items_in_block: usize,
    ) -> Result<BlockTreeTermsWriter> {
        Self::validate_settings(min_items_in_block, max_items_in_block)?;

        let postings_writer = MockPostingsWriter::default();
        let mut terms_out = Vec::new();
        codec_util::write_header(&mut terms_out, TERMS_CODEC_NAME, version)?;
        if version < VERSION_APPEND_ONLY {
            // patched with the directory offset by finish
            terms_out.write_long(0)?;
        }
        postings_writer.write_header(&mut terms_out)?;

        let mut index_out = Vec::new();
        codec_util::write_header(&mut index_out, TERMS_INDEX_CODEC_NAME, version)?;
        if version < VERSION_APPEND_ONLY {
            index_out.write_long(0)?;
        }

        Ok(BlockTreeTermsWriter {
            version,
            min_items_in_block,
            max_items_in_block,
            terms_out,
            index_out,
            postings_writer,
            fields: Vec::new(),
            num_fields_override: None,
        })
    }

    pub fn with_defaults() -> Result<BlockTreeTermsWriter> {
        Self::new(VERSION_CURRENT, DEFAULT_MIN_BLOCK_SIZE, DEFAULT_MAX_BLOCK_SIZE)
    }

    fn validate_settings(min_items_in_block: usize, max_items_in_block: usize) -> Result<()> {
        if min_items_in_block <= 1 {
            bail!(IllegalArgument(format!(
                "min_items_in_block must be >= 2; got {}",
                min_items_in_block
            )));
        }
        if min_items_in_block > max_items_in_block {
            bail!(IllegalArgument(format!(
                "min_items_in_block '{}' >= max_items_in_block '{}'",
                min_items_in_block, max_items_in_block
            )));
        }
        if 2 * (min_items_in_block - 1) > max_items_in_block {
            bail!(IllegalArgument(format!(
                "2 * (min_items_in_block '{}' - 1) >= max_items_in_block '{}'",
                min_items_in_block, max_items_in_block
            )));
        }
        Ok(())
    }

    /// Writes the blocks of one field; `terms` must be sorted and unique.
    pub fn add_field(&mut self, field_info: &FieldInfo, terms: &[TermData]) -> Result<()> {
        let mut writer = TermsWriter::new(field_info, self);
        for term in terms {
            writer.write(term)?;
        }
        writer.finish()
    }

    /// Appends the field directories and returns the `.tim` and `.tip` bytes.
    pub fn finish(mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let dir_start = self.terms_out.len() as i64;
        let index_dir_start = self.index_out.len() as i64;

        let num_fields = self
            .num_fields_override
            .unwrap_or(self.fields.len() as i32);
        self.terms_out.write_vint(num_fields)?;
        for field in &self.fields {
            let out = &mut self.terms_out;
            out.write_vint(field.number as i32)?;
            out.write_vlong(field.num_terms)?;
            out.write_vint(field.root_code.len() as i32)?;
            out.write_bytes(&field.root_code, 0, field.root_code.len())?;
            if field.has_freqs {
                out.write_vlong(field.sum_total_term_freq)?;
            }
            out.write_vlong(field.sum_doc_freq)?;
            out.write_vint(field.doc_count)?;
            self.index_out.write_vlong(field.index_start_fp)?;
        }

        if self.version >= VERSION_APPEND_ONLY {
            self.terms_out.write_long(dir_start)?;
            self.index_out.write_long(index_dir_start)?;
        } else {
            let pos = codec_util::header_length(TERMS_CODEC_NAME);
            BigEndian::write_i64(&mut self.terms_out[pos..pos + 8], dir_start);
            let pos = codec_util::header_length(TERMS_INDEX_CODEC_NAME);
            BigEndian::write_i64(&mut self.index_out[pos..pos + 8], index_dir_start);
        }
        Ok((self.terms_out, self.index_out))
    }

    /// Finishes and writes `{segment}_{suffix}.tim` and `.tip` to `dir`.
    pub fn write_to<D: Directory>(self, dir: &D, segment: &str, suffix: &str) -> Result<()> {
        let (terms, index) = self.finish()?;
        write_file(dir, &segment_file_name(segment, suffix, TERMS_EXTENSION), &terms)?;
        write_file(dir, &segment_file_name(segment, suffix, TERMS_INDEX_EXTENSION), &index)
    }
}

fn write_file<D: Directory>(dir: &D, name: &str, bytes: &[u8]) -> Result<()> {
    let mut out = dir.create_output(name, &IOContext::Flush)?;
    out.write_bytes(bytes, 0, bytes.len())
}

struct TermsWriter<'a> {
    block_tree_writer: &'a mut BlockTreeTermsWriter,
    field_number: u32,
    has_freqs: bool,
    num_terms: i64,
    sum_total_term_freq: i64,
    sum_doc_freq: i64,
    docs_seen: BTreeSet<DocId>,

    // Records index into pending where the current prefix at that
    // length "started"; for example, if current term starts with 't',
    // prefix_starts[0] is the index into pending for the first
    // term/sub-block starting with 't'.
    prefix_starts: Vec<usize>,
    last_term: Vec<u8>,

    // Pending stack of terms and blocks.  As terms arrive (in sorted order)
    // we append to this stack, and once the top of the stack has enough
    // terms starting with a common prefix, we write a new block with
    // those terms and replace those terms in the stack with a new block:
    pending: Vec<PendingEntry>,
}

impl<'a> TermsWriter<'a> {
    fn new(field_info: &FieldInfo, block_tree_writer: &'a mut BlockTreeTermsWriter) -> Self {
        TermsWriter {
            block_tree_writer,
            field_number: field_info.number,
            has_freqs: field_info.index_options != IndexOptions::Docs,
            num_terms: 0,
            sum_total_term_freq: 0,
            sum_doc_freq: 0,
            docs_seen: BTreeSet::new(),
            prefix_starts: Vec::with_capacity(8),
            last_term: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn write(&mut self, term: &TermData) -> Result<()> {
        if self.num_terms > 0 && term.term <= self.last_term {
            bail!(IllegalArgument(format!(
                "terms out of order: {:?} after {:?}",
                term.term, self.last_term
            )));
        }
        self.push_term(&term.term)?;
        self.pending.push(PendingEntry::Term(PendingTerm {
            term_bytes: term.term.clone(),
            docs: term.docs.clone(),
            total_term_freq: term.total_term_freq,
        }));

        self.num_terms += 1;
        self.sum_doc_freq += term.docs.len() as i64;
        self.sum_total_term_freq += term.total_term_freq;
        self.docs_seen.extend(term.docs.iter().cloned());
        Ok(())
    }

    // Pushes the new term to the top of the stack, and writes new blocks.
    fn push_term(&mut self, text: &[u8]) -> Result<()> {
        let limit = min(self.last_term.len(), text.len());

        // Find common prefix between last term and current term:
        let mut pos = 0;
        while pos < limit && self.last_term[pos] == text[pos] {
            pos += 1;
        }

        // Close the "abandoned" suffix now:
        for idx in (pos..self.last_term.len()).rev() {
            // How many items on top of the stack share the current suffix
            // we are closing:
            let prefix_top_size = self.pending.len() - self.prefix_starts[idx];
            if prefix_top_size >= self.block_tree_writer.min_items_in_block {
                self.write_blocks(idx + 1, prefix_top_size)?;
                self.prefix_starts[idx] = self.prefix_starts[idx].wrapping_sub(prefix_top_size - 1);
            }
        }

        if self.prefix_starts.len() < text.len() {
            self.prefix_starts.resize(text.len(), 0);
        }

        // Init new tail:
        let pending_len = self.pending.len();
        for start in &mut self.prefix_starts[pos..text.len()] {
            *start = pending_len;
        }

        self.last_term.clear();
        self.last_term.extend_from_slice(text);
        Ok(())
    }

    // Writes the top count entries in pending, using prevTerm to compute the
    // prefix.
    fn write_blocks(&mut self, prefix_length: usize, count: usize) -> Result<()> {
        debug_assert!(prefix_length > 0 || count == self.pending.len());

        let mut last_suffix_lead_label = -1;

        // True if we saw at least one term in this block (we record if a block
        // only points to sub-blocks in the terms index so we can avoid seeking
        // to it when we are looking for a term):
        let mut has_terms = false;
        let mut has_sub_blocks = false;

        let start = self.pending.len() - count;
        let end = self.pending.len();
        let mut next_block_start = start;
        let mut next_floor_lead_label = -1;
        let mut new_blocks = Vec::new();

        for i in start..end {
            let (is_term_entry, suffix_lead_label) = match self.pending[i] {
                PendingEntry::Term(ref term) => {
                    if term.term_bytes.len() == prefix_length {
                        // Suffix is 0, i.e. prefix 'foo' and term is
                        // 'foo' so the term has empty string suffix
                        // in this block
                        debug_assert_eq!(last_suffix_lead_label, -1);
                        (true, -1)
                    } else {
                        (true, i32::from(term.term_bytes[prefix_length]))
                    }
                }
                PendingEntry::Block(ref block) => {
                    debug_assert!(block.prefix.len() > prefix_length);
                    (false, i32::from(block.prefix[prefix_length]))
                }
            };

            if suffix_lead_label != last_suffix_lead_label {
                let items_in_block = i - next_block_start;
                if items_in_block >= self.block_tree_writer.min_items_in_block
                    && end - next_block_start > self.block_tree_writer.max_items_in_block
                {
                    // The count is too large for one block, so we must break
                    // it into "floor" blocks, where we record the leading
                    // label of the suffix of the first term in each floor
                    // block, so at search time we can jump to the right floor
                    // block. We just use a naive greedy segmenter here: make
                    // a new floor block as soon as we have at least
                    // min_items_in_block.
                    let is_floor = items_in_block < count;
                    new_blocks.push(self.write_block(
                        prefix_length,
                        is_floor,
                        next_floor_lead_label,
                        next_block_start,
                        i,
                        has_terms,
                        has_sub_blocks,
                    )?);

                    has_terms = false;
                    has_sub_blocks = false;
                    next_floor_lead_label = suffix_lead_label;
                    next_block_start = i;
                }
                last_suffix_lead_label = suffix_lead_label;
            }

            if is_term_entry {
                has_terms = true;
            } else {
                has_sub_blocks = true;
            }
        }

        // Write last block, if any:
        if next_block_start < end {
            let items_in_block = end - next_block_start;
            let is_floor = items_in_block < count;
            new_blocks.push(self.write_block(
                prefix_length,
                is_floor,
                next_floor_lead_label,
                next_block_start,
                end,
                has_terms,
                has_sub_blocks,
            )?);
        }

        debug_assert!(!new_blocks.is_empty());
        let mut first_block = new_blocks.remove(0);
        debug_assert!(first_block.is_floor || new_blocks.is_empty());
        first_block.compile_index(&mut new_blocks)?;

        // Remove slice from the top of the pending stack, that we just wrote:
        self.pending.truncate(start);
        // Append new block
        self.pending.push(PendingEntry::Block(first_block));
        Ok(())
    }

    /// Writes the specified slice (start is inclusive, end is exclusive)
    /// from pending stack as a new block.  If is_floor is true, there
    /// were too many (more than max_items_in_block) entries sharing the
    /// same prefix, and so we broke it into multiple floor blocks where
    /// we record the starting label of the suffix of each floor block.
    #[allow(clippy::too_many_arguments)]
    fn write_block(
        &mut self,
        prefix_length: usize,
        is_floor: bool,
        floor_lead_label: i32,
        start: usize,
        end: usize,
        has_terms: bool,
        has_sub_blocks: bool,
    ) -> Result<PendingBlock> {
        debug_assert!(end > start);

        let start_fp = self.block_tree_writer.terms_out.len() as i64;
        let has_floor_lead_label = is_floor && floor_lead_label != -1;

        let mut prefix = self.last_term[..prefix_length].to_vec();
        if has_floor_lead_label {
            prefix.push(floor_lead_label as u8);
        }

        // Write block header:
        let num_entries = (end - start) as i32;
        let mut code = num_entries << 1;
        if end == self.pending.len() {
            // Last block:
            code |= 1;
        }

        let is_leaf_block = !has_sub_blocks;
        let mut suffix_writer = Vec::new();
        let mut stats_writer = Vec::new();
        let mut meta_writer = Vec::new();
        let mut sub_indices = Vec::new();
        let mut absolute = true;

        for entry in &mut self.pending[start..end] {
            match entry {
                PendingEntry::Term(term) => {
                    let suffix = term.term_bytes.len() - prefix_length;
                    if is_leaf_block {
                        suffix_writer.write_vint(suffix as i32)?;
                    } else {
                        // For non-leaf block we borrow 1 bit to record
                        // if entry is term or sub-block
                        suffix_writer.write_vint((suffix << 1) as i32)?;
                    }
                    suffix_writer.write_bytes(&term.term_bytes, prefix_length, suffix)?;

                    // Write term stats, to separate byte[] blob:
                    let doc_freq = term.docs.len() as i32;
                    stats_writer.write_vint(doc_freq)?;
                    if self.has_freqs {
                        stats_writer.write_vlong(term.total_term_freq - i64::from(doc_freq))?;
                    }

                    // Write term meta data
                    self.block_tree_writer.postings_writer.encode_term(
                        &mut meta_writer,
                        &term.docs,
                        absolute,
                    )?;
                    absolute = false;
                }
                PendingEntry::Block(block) => {
                    debug_assert!(!is_leaf_block);
                    let suffix = block.prefix.len() - prefix_length;
                    debug_assert!(suffix > 0);

                    // For non-leaf block we borrow 1 bit to record
                    // if entry is term or sub-block
                    suffix_writer.write_vint(((suffix << 1) | 1) as i32)?;
                    suffix_writer.write_bytes(&block.prefix, prefix_length, suffix)?;
                    debug_assert!(block.fp < start_fp);
                    suffix_writer.write_vlong(start_fp - block.fp)?;
                    sub_indices.push(mem::replace(&mut block.index, Vec::new()));
                }
            }
        }

        let out = &mut self.block_tree_writer.terms_out;
        out.write_vint(code)?;

        // Write suffixes byte[] blob to terms dict output:
        let suffix_code = (suffix_writer.len() << 1) as i32 | if is_leaf_block { 1 } else { 0 };
        out.write_vint(suffix_code)?;
        out.write_bytes(&suffix_writer, 0, suffix_writer.len())?;

        // Write term stats byte[] blob
        out.write_vint(stats_writer.len() as i32)?;
        out.write_bytes(&stats_writer, 0, stats_writer.len())?;

        // Write term meta data byte[] blob
        out.write_vint(meta_writer.len() as i32)?;
        out.write_bytes(&meta_writer, 0, meta_writer.len())?;

        Ok(PendingBlock {
            prefix,
            fp: start_fp,
            has_terms,
            is_floor,
            floor_lead_byte: floor_lead_label,
            sub_indices,
            index: Vec::new(),
        })
    }

    // Finishes all terms in this field
    fn finish(mut self) -> Result<()> {
        if self.num_terms == 0 {
            // empty fields get no directory entry
            return Ok(());
        }

        // Add empty term to force closing of all final blocks:
        self.push_term(&[])?;
        self.push_term(&[])?;
        let count = self.pending.len();
        self.write_blocks(0, count)?;

        // We better have one final "root" block:
        let root = match self.pending.pop() {
            Some(PendingEntry::Block(block)) if self.pending.is_empty() => block,
            _ => bail!(IllegalState("expected a single root block".into())),
        };
        debug_assert!(root.prefix.is_empty());

        // Write FST to index
        let mut builder = FstBuilder::new(ByteSequenceOutputFactory::new());
        for (input, output) in &root.index {
            builder.add(input, ByteSequenceOutput::new(output.clone()))?;
        }
        let fst = match builder.finish()? {
            Some(fst) => fst,
            None => bail!(IllegalState("terms index is empty".into())),
        };
        let index_start_fp = self.block_tree_writer.index_out.len() as i64;
        fst.save(&mut self.block_tree_writer.index_out)?;

        let meta = FieldMetaData {
            number: self.field_number,
            has_freqs: self.has_freqs,
            num_terms: self.num_terms,
            root_code: root.index[0].1.clone(),
            sum_total_term_freq: if self.has_freqs {
                self.sum_total_term_freq
            } else {
                -1
            },
            sum_doc_freq: self.sum_doc_freq,
            doc_count: self.docs_seen.len() as i32,
            index_start_fp,
        };
        self.block_tree_writer.fields.push(meta);
        Ok(())
    }
}

enum PendingEntry {
    Term(PendingTerm),
    Block(PendingBlock),
}

struct PendingTerm {
    term_bytes: Vec<u8>,
    docs: Vec<DocId>,
    total_term_freq: i64,
}

// (prefix, block code) pairs of the terms index
type IndexEntries = Vec<(Vec<u8>, Vec<u8>)>;

struct PendingBlock {
    prefix: Vec<u8>,
    fp: i64,
    has_terms: bool,
    is_floor: bool,
    floor_lead_byte: i32,
    sub_indices: Vec<IndexEntries>,
    index: IndexEntries,
}

impl PendingBlock {
    // Collects the index entries of this block and everything below it; the
    // first entry maps the prefix to the block code and floor data.
    fn compile_index(&mut self, floor_blocks: &mut [PendingBlock]) -> Result<()> {
        debug_assert!(self.is_floor || floor_blocks.is_empty());

        let mut code = Vec::new();
        code.write_vlong(encode_output(self.fp, self.has_terms, self.is_floor))?;
        if self.is_floor {
            code.write_vint(floor_blocks.len() as i32)?;
            for sub in floor_blocks.iter() {
                debug_assert_ne!(sub.floor_lead_byte, -1);
                code.write_byte(sub.floor_lead_byte as u8)?;
                debug_assert!(sub.fp > self.fp);
                let has_terms = if sub.has_terms { 1 } else { 0 };
                code.write_vlong((sub.fp - self.fp) << 1 | has_terms)?;
            }
        }

        let mut index = vec![(self.prefix.clone(), code)];
        // Copy over index for all sub-blocks
        for sub_index in self.sub_indices.drain(..) {
            index.extend(sub_index);
        }
        for block in floor_blocks.iter_mut() {
            for sub_index in block.sub_indices.drain(..) {
                index.extend(sub_index);
            }
        }
        self.index = index;
        Ok(())
    }
}
