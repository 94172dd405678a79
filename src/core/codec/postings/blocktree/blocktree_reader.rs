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
use crate::core::codec::postings::blocktree::term_iter_frame::{
    ScanResult, SegmentTermsIterFrame, TermBuffer,
};
use crate::core::codec::postings::blocktree::{
    BlockTermState, OUTPUT_FLAGS_NUM_BITS, OUTPUT_FLAG_HAS_TERMS, OUTPUT_FLAG_IS_FLOOR,
    TERMS_CODEC_NAME, TERMS_EXTENSION, TERMS_INDEX_CODEC_NAME, TERMS_INDEX_EXTENSION,
    VERSION_APPEND_ONLY, VERSION_CURRENT, VERSION_START,
};
use crate::core::codec::postings::PostingsReaderBase;
use crate::core::codec::segment_infos::SegmentReadState;
use crate::core::codec::{codec_util, Fields, SeekStatus, TermIterator, Terms};
use crate::core::store::directory::Directory;
use crate::core::store::io::{DataInput, IndexInput};
use crate::core::util::fst::{
    Arc as FSTArc, ByteSequenceOutput, ByteSequenceOutputFactory, OutputFactory, FST,
};
use crate::core::util::{BitsRef, UnsignedShift};

use crate::error::ErrorKind::{CorruptIndex, IllegalArgument, IllegalState, UnsupportedOperation};
use crate::error::Result;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type TermsIndex = FST<ByteSequenceOutputFactory>;

/// Whether `BlockTreeTermsReader::open` loads the terms index (`.tip`).
///
/// Without the index every seek starts at the root block of the field and
/// walks down through the sub-blocks, which is slower but needs no memory
/// for the FSTs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexLoadMode {
    Load,
    Skip,
}

/// A block-based terms index and dictionary that assigns
/// terms to variable length blocks according to how they
/// share prefixes. The terms index is a prefix trie
/// whose leaves are term blocks. The advantage of this
/// approach is that seekExact is often able to
/// determine a term cannot exist without doing any IO, and
/// intersection with Automata is very fast. Note that this
/// terms dictionary has it's own fixed terms index (ie, it
/// does not support a pluggable terms index
/// implementation).
///
/// NOTE: this terms dictionary supports
/// min/maxItemsPerBlock during indexing to control how
/// much memory the terms index uses.
///
/// The data structure used by this implementation is very
/// similar to a burst trie
/// (http://citeseer.ist.psu.edu/viewdoc/summary?doi=10.1.1.18.3499),
/// but with added logic to break up too-large blocks of all
/// terms sharing a given prefix into smaller ones.
///
/// Use `check_index` with the `-verbose`
/// option to see summary statistics on the blocks in the
/// dictionary.
pub struct BlockTreeTermsReader<P: PostingsReaderBase> {
    // Open input to the main terms dict file (_X.tim); None once closed
    terms_in: Option<Arc<dyn IndexInput>>,
    postings_reader: Arc<P>,
    fields: BTreeMap<String, Arc<FieldReader<P>>>,
    segment: Arc<String>,
    version: i32,
    index_loaded: bool,
}

// What a successful open read from the files, before the shared handles
// are handed to the field readers.
struct LoadedDictionary {
    terms_in: Box<dyn IndexInput>,
    version: i32,
    fields: BTreeMap<String, FieldEntry>,
}

struct FieldEntry {
    field_info: Arc<FieldInfo>,
    num_terms: i64,
    root_code: Vec<u8>,
    root_block_fp: i64,
    sum_total_term_freq: i64,
    sum_doc_freq: i64,
    doc_count: i32,
    index_start_fp: i64,
    index: Option<Arc<TermsIndex>>,
}

impl<P: PostingsReaderBase> BlockTreeTermsReader<P> {
    /// Opens the terms dictionary of the segment described by `state`.
    ///
    /// On failure every input opened so far is released and the postings
    /// reader is closed before the error is returned.
    pub fn open<D: Directory>(
        state: &SegmentReadState<'_, D>,
        mut postings_reader: P,
        mode: IndexLoadMode,
    ) -> Result<BlockTreeTermsReader<P>> {
        let segment = Arc::new(state.segment_info.name.clone());
        let loaded = match Self::load(state, &mut postings_reader, mode) {
            Ok(loaded) => loaded,
            Err(e) => {
                // inputs opened by load are already dropped
                if let Err(close_err) = postings_reader.close() {
                    warn!(
                        "failed to close postings reader of segment {} after open error: {}",
                        segment, close_err
                    );
                }
                return Err(e);
            }
        };

        let terms_in: Arc<dyn IndexInput> = Arc::from(loaded.terms_in);
        let postings_reader = Arc::new(postings_reader);
        let fields: BTreeMap<String, Arc<FieldReader<P>>> = loaded
            .fields
            .into_iter()
            .map(|(name, entry)| {
                let reader = FieldReader::new(
                    entry,
                    Arc::clone(&terms_in),
                    Arc::clone(&postings_reader),
                    Arc::clone(&segment),
                );
                (name, Arc::new(reader))
            })
            .collect();

        let index_loaded = mode == IndexLoadMode::Load;
        debug!(
            "opened block tree terms dict of segment {}: version={}, fields={}, index_loaded={}",
            segment,
            loaded.version,
            fields.len(),
            index_loaded
        );
        Ok(BlockTreeTermsReader {
            terms_in: Some(terms_in),
            postings_reader,
            fields,
            segment,
            version: loaded.version,
            index_loaded,
        })
    }

    fn load<D: Directory>(
        state: &SegmentReadState<'_, D>,
        postings_reader: &mut P,
        mode: IndexLoadMode,
    ) -> Result<LoadedDictionary> {
        let terms_name = state.file_name(TERMS_EXTENSION);
        let mut terms_in = state.directory.open_input(&terms_name, state.context)?;
        let (version, terms_dir_offset) = read_header(terms_in.as_mut(), TERMS_CODEC_NAME)?;

        let mut index_in = None;
        let mut index_dir_offset = 0;
        if mode == IndexLoadMode::Load {
            let index_name = state.file_name(TERMS_INDEX_EXTENSION);
            let mut input = state.directory.open_input(&index_name, state.context)?;
            let (index_version, dir_offset) = read_header(input.as_mut(), TERMS_INDEX_CODEC_NAME)?;
            if index_version != version {
                bail!(CorruptIndex(format!(
                    "mismatched version files: {}={}, {}={}",
                    terms_in.name(),
                    version,
                    input.name(),
                    index_version
                )));
            }
            index_dir_offset = dir_offset;
            index_in = Some(input);
        }

        // Have PostingsReader init itself
        postings_reader.init(terms_in.as_mut(), state)?;

        // Read per-field details
        seek_dir(terms_in.as_mut(), version, terms_dir_offset)?;
        if let Some(ref mut input) = index_in {
            seek_dir(input.as_mut(), version, index_dir_offset)?;
        }

        let num_fields = terms_in.read_vint()?;
        if num_fields < 0 {
            bail!(CorruptIndex(format!(
                "invalid num_fields: {} (resource={})",
                num_fields,
                terms_in.name()
            )));
        }

        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let field = terms_in.read_vint()?;
            let num_terms = terms_in.read_vlong()?;
            if num_terms <= 0 {
                bail!(CorruptIndex(format!(
                    "illegal num_terms for field number: {} (resource={})",
                    field,
                    terms_in.name()
                )));
            }
            let num_bytes = terms_in.read_vint()?;
            let remaining = terms_in.len() as i64 - terms_in.file_pointer();
            if num_bytes <= 0 || i64::from(num_bytes) > remaining {
                bail!(CorruptIndex(format!(
                    "invalid root code length {} for field number: {} (resource={})",
                    num_bytes,
                    field,
                    terms_in.name()
                )));
            }
            let mut root_code = vec![0u8; num_bytes as usize];
            terms_in.read_bytes(&mut root_code, 0, num_bytes as usize)?;
            let root_block_fp = {
                let mut code_reader: &[u8] = &root_code;
                code_reader.read_vlong()?.unsigned_shift(OUTPUT_FLAGS_NUM_BITS)
            };

            let field_info = match state.field_infos.by_number.get(&(field as u32)) {
                Some(info) if field >= 0 => Arc::clone(info),
                _ => bail!(CorruptIndex(format!(
                    "invalid field number: {} (resource={})",
                    field,
                    terms_in.name()
                ))),
            };
            let sum_total_term_freq = if field_info.index_options == IndexOptions::Docs {
                -1
            } else {
                terms_in.read_vlong()?
            };
            let sum_doc_freq = terms_in.read_vlong()?;
            let doc_count = terms_in.read_vint()?;
            let max_doc = state.segment_info.max_doc;
            if doc_count < 0 || doc_count > max_doc {
                // #docs with field must be <= #docs
                bail!(CorruptIndex(format!(
                    "invalid doc_count: {} max_doc: {} for field {} (resource={})",
                    doc_count,
                    max_doc,
                    field_info.name,
                    terms_in.name()
                )));
            }
            if sum_doc_freq < i64::from(doc_count) {
                // #postings must be >= #docs with field
                bail!(CorruptIndex(format!(
                    "invalid sum_doc_freq: {} doc_count: {} for field {} (resource={})",
                    sum_doc_freq,
                    doc_count,
                    field_info.name,
                    terms_in.name()
                )));
            }
            if sum_total_term_freq != -1 && sum_total_term_freq < sum_doc_freq {
                // #positions must be >= #postings
                bail!(CorruptIndex(format!(
                    "invalid sum_total_term_freq: {} sum_doc_freq: {} for field {} (resource={})",
                    sum_total_term_freq,
                    sum_doc_freq,
                    field_info.name,
                    terms_in.name()
                )));
            }
            let index_start_fp = match index_in {
                Some(ref mut input) => input.read_vlong()?,
                None => 0,
            };
            if fields.contains_key(&field_info.name) {
                bail!(CorruptIndex(format!(
                    "duplicate field: {} (resource={})",
                    field_info.name,
                    terms_in.name()
                )));
            }

            let index = match index_in {
                Some(ref input) => Some(Arc::new(load_index(&**input, index_start_fp)?)),
                None => None,
            };
            fields.insert(
                field_info.name.clone(),
                FieldEntry {
                    field_info,
                    num_terms,
                    root_code,
                    root_block_fp,
                    sum_total_term_freq,
                    sum_doc_freq,
                    doc_count,
                    index_start_fp,
                    index,
                },
            );
        }

        // the FSTs are in memory now, only the terms dict stays open
        drop(index_in);

        Ok(LoadedDictionary {
            terms_in,
            version,
            fields,
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Whether the terms index was loaded at open.
    pub fn is_index_loaded(&self) -> bool {
        self.index_loaded
    }

    pub fn is_closed(&self) -> bool {
        self.terms_in.is_none()
    }

    pub fn postings_reader(&self) -> &P {
        &self.postings_reader
    }

    /// Releases the terms dict input and closes the postings reader.
    ///
    /// Calling it again is a no-op. Field readers handed out before closing
    /// must not be used afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.terms_in.is_none() {
            return Ok(());
        }
        self.fields.clear();
        self.terms_in = None;
        debug!("closed block tree terms dict of segment {}", self.segment);
        self.postings_reader.close()
    }

    pub fn check_integrity(&self) -> Result<()> {
        if self.is_closed() {
            bail!(IllegalState(format!(
                "terms dict of segment {} is closed",
                self.segment
            )));
        }
        // term dictionary: this format version carries no checksum footer;
        // postings
        self.postings_reader.check_integrity()
    }
}

impl<P: PostingsReaderBase> Fields for BlockTreeTermsReader<P> {
    type Terms = Arc<FieldReader<P>>;

    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn terms(&self, field: &str) -> Result<Option<Self::Terms>> {
        Ok(self.fields.get(field).map(Arc::clone))
    }

    fn size(&self) -> usize {
        self.fields.len()
    }
}

impl<P: PostingsReaderBase> Drop for BlockTreeTermsReader<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("drop BlockTreeTermsReader failed by '{:?}'", e);
        }
    }
}

// Checks the codec header and returns the version, plus the directory offset
// when the format keeps it right after the header.
fn read_header(input: &mut dyn IndexInput, codec: &str) -> Result<(i32, i64)> {
    let version = codec_util::check_header(input, codec, VERSION_START, VERSION_CURRENT)?;
    let dir_offset = if version < VERSION_APPEND_ONLY {
        input.read_long()?
    } else {
        0
    };
    Ok((version, dir_offset))
}

// Seek input to the directory offset: append-only files keep it in the last
// 8 bytes, older ones in the header.
fn seek_dir(input: &mut dyn IndexInput, version: i32, header_offset: i64) -> Result<()> {
    let dir_offset = if version >= VERSION_APPEND_ONLY {
        let len = input.len() as i64;
        if len < 8 {
            bail!(CorruptIndex(format!(
                "file too short for a directory offset: {} bytes (resource={})",
                len,
                input.name()
            )));
        }
        input.seek(len - 8)?;
        input.read_long()?
    } else {
        header_offset
    };
    if dir_offset < 0 || dir_offset > input.len() as i64 {
        bail!(CorruptIndex(format!(
            "invalid directory offset: {} (resource={})",
            dir_offset,
            input.name()
        )));
    }
    input.seek(dir_offset)
}

fn load_index(index_in: &dyn IndexInput, index_start_fp: i64) -> Result<TermsIndex> {
    if index_start_fp < 0 || index_start_fp >= index_in.len() as i64 {
        bail!(CorruptIndex(format!(
            "invalid index start fp: {} (resource={})",
            index_start_fp,
            index_in.name()
        )));
    }
    let mut clone = index_in.clone_input()?;
    clone.seek(index_start_fp)?;
    FST::from_input(clone.as_mut(), ByteSequenceOutputFactory::new())
}

/// BlockTree's implementation of `Terms`: the dictionary of one field.
pub struct FieldReader<P: PostingsReaderBase> {
    field_info: Arc<FieldInfo>,
    num_terms: i64,
    sum_total_term_freq: i64,
    sum_doc_freq: i64,
    doc_count: i32,
    index_start_fp: i64,
    root_block_fp: i64,
    root_code: Vec<u8>,
    index: Option<Arc<TermsIndex>>,
    terms_in: Arc<dyn IndexInput>,
    postings_reader: Arc<P>,
    segment: Arc<String>,
}

impl<P: PostingsReaderBase> FieldReader<P> {
    fn new(
        entry: FieldEntry,
        terms_in: Arc<dyn IndexInput>,
        postings_reader: Arc<P>,
        segment: Arc<String>,
    ) -> FieldReader<P> {
        debug_assert!(entry.num_terms > 0);
        FieldReader {
            field_info: entry.field_info,
            num_terms: entry.num_terms,
            sum_total_term_freq: entry.sum_total_term_freq,
            sum_doc_freq: entry.sum_doc_freq,
            doc_count: entry.doc_count,
            index_start_fp: entry.index_start_fp,
            root_block_fp: entry.root_block_fp,
            root_code: entry.root_code,
            index: entry.index,
            terms_in,
            postings_reader,
            segment,
        }
    }

    pub fn field_info(&self) -> &FieldInfo {
        &self.field_info
    }

    /// The code of the root block: its file pointer and flags, followed by
    /// floor data when the root block is a floor block.
    pub fn root_code(&self) -> &[u8] {
        &self.root_code
    }

    pub fn root_block_fp(&self) -> i64 {
        self.root_block_fp
    }

    pub fn index_start_fp(&self) -> i64 {
        self.index_start_fp
    }

    pub fn index(&self) -> Option<&TermsIndex> {
        self.index.as_ref().map(|index| index.as_ref())
    }

    /// Returns an iterator positioned before the first term, recycling the
    /// frame stack and buffers of `reuse` when given.
    pub fn iterator_reuse(
        &self,
        reuse: Option<SegmentTermIterator<P>>,
    ) -> SegmentTermIterator<P> {
        match reuse {
            Some(mut iter) => {
                iter.reset(self);
                iter
            }
            None => SegmentTermIterator::new(self),
        }
    }

    /// Walks every block of this field and returns statistics about them.
    pub fn compute_stats(&self) -> Result<Stats> {
        SegmentTermIterator::new(self).compute_block_stats()
    }
}

impl<P: PostingsReaderBase> Terms for FieldReader<P> {
    type Iterator = SegmentTermIterator<P>;

    fn iterator(&self) -> Result<Self::Iterator> {
        Ok(self.iterator_reuse(None))
    }

    fn size(&self) -> Result<i64> {
        Ok(self.num_terms)
    }

    fn sum_total_term_freq(&self) -> Result<i64> {
        Ok(self.sum_total_term_freq)
    }

    fn sum_doc_freq(&self) -> Result<i64> {
        Ok(self.sum_doc_freq)
    }

    fn doc_count(&self) -> Result<i32> {
        Ok(self.doc_count)
    }

    fn has_freqs(&self) -> Result<bool> {
        Ok(self.field_info.index_options.has_freqs())
    }

    fn has_offsets(&self) -> Result<bool> {
        Ok(self.field_info.index_options.has_offsets())
    }

    fn has_positions(&self) -> Result<bool> {
        Ok(self.field_info.index_options.has_positions())
    }

    fn has_payloads(&self) -> Result<bool> {
        Ok(self.field_info.has_store_payloads)
    }

    fn stats(&self) -> Result<String> {
        Ok(self.compute_stats()?.to_string())
    }
}

/// BlockTree statistics for a single field returned by
/// `FieldReader::compute_stats`.
#[derive(Debug, Serialize)]
pub struct Stats {
    /// Byte size of the index.
    index_num_bytes: i64,

    /// Total number of terms in the field.
    total_term_count: i64,

    /// Total number of bytes (sum of term lengths) across all terms in the field.
    total_term_bytes: i64,

    /// The number of normal (non-floor) blocks in the terms file.
    non_floor_block_count: i32,

    /// The number of floor blocks (meta-blocks larger than the
    /// allowed max items per block) in the terms file.
    floor_block_count: i32,

    /// The number of sub-blocks within the floor blocks.
    floor_sub_block_count: i32,

    /// The number of "internal" blocks (that have both
    /// terms and sub-blocks).
    mixed_block_count: i32,

    /// The number of "leaf" blocks (blocks that have only
    /// terms).
    terms_only_block_count: i32,

    /// The number of "internal" blocks that do not contain
    /// terms (have only sub-blocks).
    sub_blocks_only_block_count: i32,

    /// Total number of blocks.
    total_block_count: i32,

    /// Number of blocks at each prefix depth.
    block_count_by_prefix_len: Vec<i32>,
    #[serde(skip)]
    start_block_count: i32,
    #[serde(skip)]
    end_block_count: i32,

    /// Total number of bytes used to store term suffixes.
    total_block_suffix_bytes: i64,

    /// Total number of bytes used to store term stats (not
    /// including what the `PostingsReaderBase` stores).
    total_block_stats_bytes: i64,

    /// Total bytes stored by the `PostingsReaderBase`,
    /// plus the other few vInts stored in the frame.
    total_block_other_bytes: i64,

    segment: String,
    field: String,
}

impl Stats {
    pub fn new(segment: &str, field: &str) -> Stats {
        Stats {
            index_num_bytes: 0,
            total_term_count: 0,
            total_term_bytes: 0,
            non_floor_block_count: 0,
            floor_block_count: 0,
            floor_sub_block_count: 0,
            mixed_block_count: 0,
            terms_only_block_count: 0,
            sub_blocks_only_block_count: 0,
            total_block_count: 0,
            block_count_by_prefix_len: vec![0; 10],
            start_block_count: 0,
            end_block_count: 0,
            total_block_suffix_bytes: 0,
            total_block_stats_bytes: 0,
            total_block_other_bytes: 0,
            segment: String::from(segment),
            field: String::from(field),
        }
    }

    fn start_block<S: Clone + Default>(&mut self, frame: &SegmentTermsIterFrame<S>, is_floor: bool) {
        self.total_block_count += 1;
        if is_floor {
            if frame.fp == frame.fp_orig {
                self.floor_block_count += 1;
            }
            self.floor_sub_block_count += 1;
        } else {
            self.non_floor_block_count += 1;
        }
        if self.block_count_by_prefix_len.len() <= frame.prefix {
            self.block_count_by_prefix_len.resize(frame.prefix + 1, 0);
        }
        self.block_count_by_prefix_len[frame.prefix] += 1;
        self.start_block_count += 1;
        self.total_block_suffix_bytes += frame.suffixes_reader.length() as i64;
        self.total_block_stats_bytes += frame.stats_reader.length() as i64;
    }

    fn end_block<S: Clone + Default>(&mut self, frame: &SegmentTermsIterFrame<S>) -> Result<()> {
        let term_count = if frame.is_leaf_block {
            frame.ent_count
        } else {
            frame.state.term_block_ord
        };
        let sub_block_count = frame.ent_count - term_count;
        self.total_term_count += i64::from(term_count);
        match (term_count, sub_block_count) {
            (0, x) if x > 0 => self.sub_blocks_only_block_count += 1,
            (x, 0) if x > 0 => self.terms_only_block_count += 1,
            (x, y) if x > 0 && y > 0 => self.mixed_block_count += 1,
            (_, _) => bail!(IllegalState(
                "term_count and sub_block_count both be 0".into()
            )),
        }
        self.end_block_count += 1;
        let other_bytes = frame.fp_end
            - frame.fp
            - frame.suffixes_reader.length() as i64
            - frame.stats_reader.length() as i64;
        debug_assert!(other_bytes > 0);
        self.total_block_other_bytes += other_bytes;
        Ok(())
    }

    fn term(&mut self, term: &[u8]) {
        self.total_term_bytes += term.len() as i64
    }

    fn finish(&self) {
        debug_assert_eq!(
            self.start_block_count, self.end_block_count,
            "start_block_count={} end_block_count={}",
            self.start_block_count, self.end_block_count
        );
        debug_assert_eq!(
            self.total_block_count,
            self.floor_sub_block_count + self.non_floor_block_count
        );
        debug_assert_eq!(
            self.total_block_count,
            self.mixed_block_count + self.terms_only_block_count + self.sub_blocks_only_block_count
        );
    }

    pub fn index_num_bytes(&self) -> i64 {
        self.index_num_bytes
    }

    pub fn total_term_count(&self) -> i64 {
        self.total_term_count
    }

    pub fn total_term_bytes(&self) -> i64 {
        self.total_term_bytes
    }

    pub fn non_floor_block_count(&self) -> i32 {
        self.non_floor_block_count
    }

    pub fn floor_block_count(&self) -> i32 {
        self.floor_block_count
    }

    pub fn floor_sub_block_count(&self) -> i32 {
        self.floor_sub_block_count
    }

    pub fn mixed_block_count(&self) -> i32 {
        self.mixed_block_count
    }

    pub fn terms_only_block_count(&self) -> i32 {
        self.terms_only_block_count
    }

    pub fn sub_blocks_only_block_count(&self) -> i32 {
        self.sub_blocks_only_block_count
    }

    pub fn total_block_count(&self) -> i32 {
        self.total_block_count
    }

    pub fn block_count_by_prefix_len(&self) -> &[i32] {
        &self.block_count_by_prefix_len
    }

    pub fn total_block_suffix_bytes(&self) -> i64 {
        self.total_block_suffix_bytes
    }

    pub fn total_block_stats_bytes(&self) -> i64 {
        self.total_block_stats_bytes
    }

    pub fn total_block_other_bytes(&self) -> i64 {
        self.total_block_other_bytes
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn per_block(total: i64, blocks: i32) -> f64 {
    if blocks == 0 {
        0.0
    } else {
        total as f64 / f64::from(blocks)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "  segment={} field={}", self.segment, self.field)?;
        writeln!(f, "  index FST:")?;
        writeln!(f, "    {} bytes", self.index_num_bytes)?;
        writeln!(f, "  terms:")?;
        writeln!(f, "    {} terms", self.total_term_count)?;
        let bytes_per_term = if self.total_term_count == 0 {
            0.0
        } else {
            self.total_term_bytes as f64 / self.total_term_count as f64
        };
        writeln!(
            f,
            "    {} bytes ({:.1} bytes/term)",
            self.total_term_bytes, bytes_per_term
        )?;
        writeln!(f, "  blocks:")?;
        writeln!(f, "    {} blocks", self.total_block_count)?;
        writeln!(f, "    {} terms-only blocks", self.terms_only_block_count)?;
        writeln!(f, "    {} sub-block-only blocks", self.sub_blocks_only_block_count)?;
        writeln!(f, "    {} mixed blocks", self.mixed_block_count)?;
        writeln!(f, "    {} floor blocks", self.floor_block_count)?;
        writeln!(f, "    {} non-floor blocks", self.non_floor_block_count)?;
        writeln!(f, "    {} floor sub-blocks", self.floor_sub_block_count)?;
        writeln!(
            f,
            "    {} term suffix bytes ({:.1} suffix-bytes/block)",
            self.total_block_suffix_bytes,
            per_block(self.total_block_suffix_bytes, self.total_block_count)
        )?;
        writeln!(
            f,
            "    {} term stats bytes ({:.1} stats-bytes/block)",
            self.total_block_stats_bytes,
            per_block(self.total_block_stats_bytes, self.total_block_count)
        )?;
        writeln!(
            f,
            "    {} other bytes ({:.1} other-bytes/block)",
            self.total_block_other_bytes,
            per_block(self.total_block_other_bytes, self.total_block_count)
        )?;
        if self.total_block_count != 0 {
            writeln!(f, "    by prefix length:")?;
            for (prefix, count) in self.block_count_by_prefix_len.iter().enumerate() {
                if *count != 0 {
                    writeln!(f, "      {:2}: {}", prefix, count)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    Unpositioned,
    OnTerm,
    // the last seek_exact missed; term() is meaningless until repositioned
    Invalid,
    Exhausted,
}

// How far a seek walked the terms index.
enum IndexWalk {
    // the iterator already sits on the target term
    Positioned,
    // number of target bytes consumed by the index
    Walked(usize),
}

fn input_of(input: &mut Option<Box<dyn IndexInput>>) -> Result<&mut dyn IndexInput> {
    match input {
        Some(input) => Ok(input.as_mut()),
        None => bail!(IllegalState("terms input is not initialized".into())),
    }
}

/// Iterates through terms in this field.
///
/// Blocks are decoded lazily into a stack of frames, one per depth of the
/// block tree, which are reused across seeks. Stack slot 0 is reserved for
/// the state handed to `seek_exact_state`; the root block lives at 1.
pub struct SegmentTermIterator<P: PostingsReaderBase> {
    field_info: Arc<FieldInfo>,
    postings_reader: Arc<P>,
    index: Option<Arc<TermsIndex>>,
    root_code: Vec<u8>,
    segment: Arc<String>,
    terms_in: Arc<dyn IndexInput>,
    // Lazy init:
    input: Option<Box<dyn IndexInput>>,

    stack: Vec<SegmentTermsIterFrame<P::TermState>>,
    current_frame_ord: usize,
    term: TermBuffer,
    position: Position,

    // What prefix of the current term was present in the index when we
    // last seeked:
    valid_index_prefix: usize,

    // assert only:
    target_before_current_length: usize,

    arcs: Vec<FSTArc<ByteSequenceOutput>>,
}

impl<P: PostingsReaderBase> SegmentTermIterator<P> {
    fn new(field: &FieldReader<P>) -> SegmentTermIterator<P> {
        let mut iter = SegmentTermIterator {
            field_info: Arc::clone(&field.field_info),
            postings_reader: Arc::clone(&field.postings_reader),
            index: None,
            root_code: Vec::new(),
            segment: Arc::clone(&field.segment),
            terms_in: Arc::clone(&field.terms_in),
            input: None,
            stack: vec![SegmentTermsIterFrame::new(0)],
            current_frame_ord: 0,
            term: TermBuffer::default(),
            position: Position::Unpositioned,
            valid_index_prefix: 0,
            target_before_current_length: 0,
            arcs: Vec::with_capacity(16),
        };
        iter.bind(field);
        iter
    }

    // Points this iterator at `field`, before its first term.
    fn bind(&mut self, field: &FieldReader<P>) {
        self.field_info = Arc::clone(&field.field_info);
        self.index = field.index.as_ref().map(Arc::clone);
        self.root_code.clear();
        self.root_code.extend_from_slice(&field.root_code);
        self.segment = Arc::clone(&field.segment);

        // Used to hold seek by TermState, or cached seek
        // state from the last seek
        self.current_frame_ord = 0;
        self.term.clear();
        self.term.exists = false;
        self.position = Position::Unpositioned;
        self.valid_index_prefix = 0;
        self.target_before_current_length = 0;

        // Init w/ root block; don't use index since it may
        // not (and need not) have been loaded
        self.arcs.clear();
        let root_arc = match self.index {
            Some(ref index) => index.root_arc(),
            None => FSTArc::empty(),
        };
        self.arcs.push(root_arc);
    }

    fn reset(&mut self, field: &FieldReader<P>) {
        if !Arc::ptr_eq(&self.terms_in, &field.terms_in) {
            self.terms_in = Arc::clone(&field.terms_in);
            self.input = None;
        }
        self.postings_reader = Arc::clone(&field.postings_reader);
        for frame in &mut self.stack {
            frame.next_ent = -1;
            frame.fp_orig = -1;
            frame.arc = None;
        }
        self.bind(field);
    }

    fn init_index_input(&mut self) -> Result<()> {
        if self.input.is_none() {
            self.input = Some(self.terms_in.clone_input()?);
        }
        Ok(())
    }

    fn get_frame(&mut self, ord: usize) -> usize {
        while ord >= self.stack.len() {
            let next = self.stack.len();
            self.stack.push(SegmentTermsIterFrame::new(next));
        }
        debug_assert_eq!(self.stack[ord].ord, ord);
        ord
    }

    fn set_arc(&mut self, ord: usize, arc: FSTArc<ByteSequenceOutput>) {
        if ord >= self.arcs.len() {
            self.arcs.resize(ord + 1, FSTArc::empty());
        }
        self.arcs[ord] = arc;
    }

    // Pushes a frame we seek'd to
    fn push_frame_by_data(
        &mut self,
        arc: Option<FSTArc<ByteSequenceOutput>>,
        frame_data: &[u8],
        length: usize,
    ) -> Result<usize> {
        let mut code_reader = frame_data;
        let code = code_reader.read_vlong()?;
        let fp_seek = code.unsigned_shift(OUTPUT_FLAGS_NUM_BITS);
        let ord = self.get_frame(1 + self.current_frame_ord);
        {
            let frame = &mut self.stack[ord];
            frame.has_terms = (code & OUTPUT_FLAG_HAS_TERMS) != 0;
            frame.has_terms_orig = frame.has_terms;
            frame.is_floor = (code & OUTPUT_FLAG_IS_FLOOR) != 0;
            if frame.is_floor {
                frame.set_floor_data(code_reader)?;
            }
        }
        self.push_frame_by_fp(arc, fp_seek, length)
    }

    // Pushes a sub-block frame reached through its parent's entry, whose
    // floor data is unknown: a floor chain is then walked block by block.
    fn push_sub_block(&mut self, fp: i64, length: usize) -> Result<usize> {
        let ord = self.get_frame(1 + self.current_frame_ord);
        {
            let frame = &mut self.stack[ord];
            if frame.fp_orig != fp || frame.next_ent == -1 {
                frame.is_floor = false;
                frame.has_terms = true;
                frame.has_terms_orig = true;
            }
        }
        self.push_frame_by_fp(None, fp, length)
    }

    // Pushes next'd frame or seek'd frame; we later
    // lazy-load the frame only when needed
    fn push_frame_by_fp(
        &mut self,
        arc: Option<FSTArc<ByteSequenceOutput>>,
        fp: i64,
        length: usize,
    ) -> Result<usize> {
        let ord = self.get_frame(1 + self.current_frame_ord);
        let target_before_current_length = self.target_before_current_length;
        let frame = &mut self.stack[ord];
        frame.arc = arc;
        if frame.fp_orig == fp && frame.next_ent != -1 {
            if frame.ord > target_before_current_length {
                frame.rewind()?;
            }
            debug_assert_eq!(length, frame.prefix);
        } else {
            frame.next_ent = -1;
            frame.prefix = length;
            frame.state.term_block_ord = 0;
            frame.fp = fp;
            frame.fp_orig = fp;
            frame.last_sub_fp = -1;
        }
        Ok(ord)
    }

    // Loads the current frame's block unless already loaded.
    fn load_current(&mut self) -> Result<()> {
        let input = input_of(&mut self.input)?;
        self.stack[self.current_frame_ord].load_block(input)
    }

    // Starts over from the root block, as a walk without the index does.
    fn push_root(&mut self) -> Result<()> {
        self.current_frame_ord = 0;
        self.target_before_current_length = 0;
        self.valid_index_prefix = 0;
        let root_code = std::mem::replace(&mut self.root_code, Vec::new());
        let res = self.push_frame_by_data(None, &root_code, 0);
        self.root_code = root_code;
        self.current_frame_ord = res?;
        Ok(())
    }

    // Walks the terms index along `target`, reusing the frames of the last
    // seek for the prefix both terms share. Leaves the deepest block whose
    // prefix is a prefix of the target as the current frame.
    fn walk_index(&mut self, index: &TermsIndex, target: &[u8], exact: bool) -> Result<IndexWalk> {
        let outputs = index.outputs();
        let mut fst_reader = index.bytes_reader();

        let mut arc_idx = 0;
        let mut output;
        let mut target_upto;

        self.target_before_current_length = self.current_frame_ord;

        if self.current_frame_ord != 0 {
            // We are already seek'd; find the common
            // prefix of new seek term vs current term and
            // re-use the corresponding seek state.  For
            // example, if app first seeks to foobar, then
            // seeks to foobaz, we can re-use the seek state
            // for the first 5 bytes.
            output = self.arcs[0]
                .output
                .clone()
                .unwrap_or_else(|| outputs.empty());
            target_upto = 0;
            let mut last_frame_idx = 1;
            debug_assert!(self.valid_index_prefix <= self.term.len);

            let target_limit = target.len().min(self.valid_index_prefix);
            let mut cmp = Ordering::Equal;

            // First compare up to valid seek frames:
            while target_upto < target_limit {
                cmp = self.term.bytes[target_upto].cmp(&target[target_upto]);
                if cmp != Ordering::Equal {
                    break;
                }
                arc_idx = target_upto + 1;
                let arc = &self.arcs[arc_idx];
                debug_assert_eq!(arc.label, i32::from(target[target_upto]));
                if let Some(ref out) = arc.output {
                    if !out.is_empty() {
                        output = outputs.add(&output, out);
                    }
                }
                if arc.is_final() {
                    last_frame_idx += 1;
                }
                target_upto += 1;
            }

            if cmp == Ordering::Equal {
                // Second compare the rest of the term, but
                // don't save arc/output/frame; we only do this
                // to find out if the target term is before,
                // equal or after the current term
                let target_upto_mid = target_upto;
                let target_limit2 = target.len().min(self.term.len);
                while target_upto < target_limit2 {
                    cmp = self.term.bytes[target_upto].cmp(&target[target_upto]);
                    if cmp != Ordering::Equal {
                        break;
                    }
                    target_upto += 1;
                }
                if cmp == Ordering::Equal {
                    cmp = self.term.len.cmp(&target.len());
                }
                target_upto = target_upto_mid;
            }

            match cmp {
                Ordering::Less => {
                    // Common case: target term is after current
                    // term, ie, app is seeking multiple terms
                    // in sorted order
                    self.current_frame_ord = last_frame_idx;
                }
                Ordering::Greater => {
                    // Uncommon case: target term
                    // is before current term; this means we can
                    // keep the current_frame_ord but we must rewind it
                    // (so we scan from the start)
                    self.target_before_current_length = if exact { last_frame_idx } else { 1 };
                    self.current_frame_ord = last_frame_idx;
                    self.stack[last_frame_idx].rewind()?;
                }
                Ordering::Equal => {
                    // Target is exactly the same as current term
                    if self.term.exists {
                        return Ok(IndexWalk::Positioned);
                    }
                }
            }
        } else {
            self.target_before_current_length = 0;
            let root = index.root_arc();

            // Empty string prefix must have an output (block) in the index!
            if !root.is_final() {
                bail!(CorruptIndex(format!(
                    "terms index of field {} has no root block",
                    self.field_info.name
                )));
            }
            output = root.output.clone().unwrap_or_else(|| outputs.empty());
            target_upto = 0;
            let frame_data = match root.next_final_output {
                Some(ref final_output) => outputs.add(&output, final_output),
                None => output.clone(),
            };
            self.arcs[0] = root.clone();
            self.current_frame_ord = self.push_frame_by_data(Some(root), frame_data.inner(), 0)?;
        }

        // We are done sharing the common prefix with the incoming target and
        // where we are currently seek'd; now continue walking the index:
        while target_upto < target.len() {
            let target_label = i32::from(target[target_upto]);
            let next_arc =
                index.find_target_arc(target_label, &self.arcs[arc_idx], &mut fst_reader)?;
            let next_arc = match next_arc {
                Some(arc) => arc,
                // Index is exhausted
                None => return Ok(IndexWalk::Walked(target_upto)),
            };

            // Follow this arc
            self.term.bytes[target_upto] = target[target_upto];
            if let Some(ref out) = next_arc.output {
                if !out.is_empty() {
                    output = outputs.add(&output, out);
                }
            }
            target_upto += 1;

            if next_arc.is_final() {
                let frame_data = match next_arc.next_final_output {
                    Some(ref final_output) => outputs.add(&output, final_output),
                    None => output.clone(),
                };
                self.current_frame_ord = self.push_frame_by_data(
                    Some(next_arc.clone()),
                    frame_data.inner(),
                    target_upto,
                )?;
            }
            self.set_arc(target_upto, next_arc);
            arc_idx = target_upto;
        }
        Ok(IndexWalk::Walked(target_upto))
    }

    // Scans the current frame for the target; sub-blocks whose prefix is a
    // prefix of the target are descended into.
    fn scan_current(&mut self, target: &[u8], exact_only: bool) -> Result<SeekStatus> {
        loop {
            let ord = self.current_frame_ord;
            let result = self.stack[ord].scan_to_term(target, exact_only, &mut self.term)?;
            match result {
                ScanResult::SubBlock => {
                    let fp = self.stack[ord].last_sub_fp;
                    let length = self.term.len;
                    self.current_frame_ord = self.push_sub_block(fp, length)?;
                    self.load_current()?;
                }
                ScanResult::Seek(SeekStatus::End)
                    if !self.stack[ord].is_floor && !self.stack[ord].is_last_in_floor =>
                {
                    // a floor chain entered by file pointer: try the next block
                    let input = input_of(&mut self.input)?;
                    self.stack[ord].load_next_floor_block(input)?;
                }
                ScanResult::Seek(SeekStatus::NotFound) if !exact_only && !self.term.exists => {
                    // We are on a sub-block, and caller wants
                    // us to position to the next term after
                    // the target, so we must recurse into the
                    // sub-frame(s):
                    self.descend_to_first_term()?;
                    return Ok(SeekStatus::NotFound);
                }
                ScanResult::Seek(status) => return Ok(status),
            }
        }
    }

    fn descend_to_first_term(&mut self) -> Result<()> {
        loop {
            let fp = self.stack[self.current_frame_ord].last_sub_fp;
            let length = self.term.len;
            self.current_frame_ord = self.push_sub_block(fp, length)?;
            let input = input_of(&mut self.input)?;
            let frame = &mut self.stack[self.current_frame_ord];
            frame.load_block(input)?;
            if !frame.next(&mut self.term, input)? {
                return Ok(());
            }
        }
    }

    fn seek_exact_internal(&mut self, target: &[u8]) -> Result<bool> {
        self.init_index_input()?;
        self.term.grow(target.len());

        let index = match self.index {
            Some(ref index) => Arc::clone(index),
            None => {
                self.push_root()?;
                self.stack[self.current_frame_ord].scan_to_floor_frame(target)?;
                self.load_current()?;
                return Ok(self.scan_current(target, true)? == SeekStatus::Found);
            }
        };

        let target_upto = match self.walk_index(&index, target, true)? {
            IndexWalk::Positioned => return Ok(true),
            IndexWalk::Walked(upto) => upto,
        };

        let ord = self.current_frame_ord;
        self.valid_index_prefix = self.stack[ord].prefix;
        self.stack[ord].scan_to_floor_frame(target)?;

        // Target term is entirely contained in the index:
        if !self.stack[ord].has_terms {
            self.term.exists = false;
            let length = (target_upto + 1).min(target.len());
            self.term.copy_from(&target[..length]);
            return Ok(false);
        }

        self.load_current()?;
        Ok(self.scan_current(target, true)? == SeekStatus::Found)
    }

    fn seek_ceil_internal(&mut self, target: &[u8]) -> Result<SeekStatus> {
        self.init_index_input()?;
        self.term.grow(target.len());

        let status = match self.index {
            Some(ref index) => {
                let index = Arc::clone(index);
                if let IndexWalk::Positioned = self.walk_index(&index, target, false)? {
                    return Ok(SeekStatus::Found);
                }
                let ord = self.current_frame_ord;
                self.valid_index_prefix = self.stack[ord].prefix;
                self.stack[ord].scan_to_floor_frame(target)?;
                self.load_current()?;
                self.scan_current(target, false)?
            }
            None => {
                self.push_root()?;
                self.stack[self.current_frame_ord].scan_to_floor_frame(target)?;
                self.load_current()?;
                self.scan_current(target, false)?
            }
        };

        if status == SeekStatus::End {
            self.term.copy_from(target);
            self.term.exists = false;
            if self.next_term()? {
                Ok(SeekStatus::NotFound)
            } else {
                Ok(SeekStatus::End)
            }
        } else {
            Ok(status)
        }
    }

    // Decodes only the term bytes of the next term.  If caller then asks for
    // metadata, ie docFreq, totalTermFreq or pulls a PostingIterator, we then
    // (lazily) decode all metadata up to the current term.
    fn next_term(&mut self) -> Result<bool> {
        self.init_index_input()?;

        if self.position == Position::Unpositioned {
            // fresh iterator, seek to first term
            self.push_root()?;
            self.load_current()?;
        }

        self.target_before_current_length = self.current_frame_ord;

        debug_assert!(self.term.exists || self.current_frame_ord != 0);
        if self.current_frame_ord == 0 {
            // If seek was previously called and the term was
            // cached, or seek(TermState) was called, usually
            // caller is just going to pull a D/&PEnum or get
            // docFreq, etc.  But, if they then call next(),
            // this method catches up all internal state so next()
            // works properly:
            let term = self.term.as_slice().to_vec();
            if !self.seek_exact_internal(&term)? {
                bail!(IllegalState(format!(
                    "term {:?} to resume from is not in field {}",
                    term, self.field_info.name
                )));
            }
        }

        // Pop finished blocks
        let mut ord = self.current_frame_ord;
        while self.stack[ord].next_ent == self.stack[ord].ent_count {
            if !self.stack[ord].is_last_in_floor {
                // Advance to next floor block
                let input = input_of(&mut self.input)?;
                self.stack[ord].load_next_floor_block(input)?;
                break;
            }
            if ord == 1 {
                self.term.clear();
                self.term.exists = false;
                self.valid_index_prefix = 0;
                self.stack[1].rewind()?;
                self.position = Position::Exhausted;
                return Ok(false);
            }
            let last_fp = self.stack[ord].fp_orig;
            ord -= 1;
            self.current_frame_ord = ord;
            let frame = &mut self.stack[ord];
            if frame.next_ent == -1 || frame.last_sub_fp != last_fp {
                // We popped into a frame that's not loaded
                // yet or not scan'd to the right entry
                frame.scan_to_floor_frame(self.term.as_slice())?;
                let input = input_of(&mut self.input)?;
                frame.load_block(input)?;
                frame.scan_to_sub_block(last_fp)?;
            }

            // Note that the seek state (last seek) has been
            // invalidated beyond this depth
            self.valid_index_prefix = self.valid_index_prefix.min(frame.prefix);
        }

        loop {
            let ord = self.current_frame_ord;
            let input = input_of(&mut self.input)?;
            if self.stack[ord].next(&mut self.term, input)? {
                // Push to new block; this is a "next" frame, even if it's
                // floor'd we must pretend it isn't so we don't try to scan
                // to the right floor frame
                let fp = self.stack[ord].last_sub_fp;
                let length = self.term.len;
                self.current_frame_ord = self.push_sub_block(fp, length)?;
                self.load_current()?;
            } else {
                self.position = Position::OnTerm;
                return Ok(true);
            }
        }
    }

    // Puts the iterator back into a state a new seek can start from after an
    // operation failed half way.
    fn invalidate<T>(&mut self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            self.current_frame_ord = 0;
            self.valid_index_prefix = 0;
            self.term.exists = false;
            self.position = Position::Invalid;
        }
        res
    }

    fn check_on_term(&self) -> Result<()> {
        match self.position {
            Position::OnTerm => Ok(()),
            Position::Unpositioned => bail!(IllegalState(
                "iterator is not positioned; call next() or seek first".into()
            )),
            Position::Invalid => bail!(IllegalState(
                "iterator is not positioned on a term after a failed seek".into()
            )),
            Position::Exhausted => bail!(IllegalState("iterator is exhausted".into())),
        }
    }

    // Decodes the metadata of the current frame up to the current term.
    fn decode_metadata(&mut self) -> Result<&BlockTermState<P::TermState>> {
        self.check_on_term()?;
        let frame = &mut self.stack[self.current_frame_ord];
        frame.decode_metadata(self.postings_reader.as_ref(), &self.field_info)?;
        Ok(&frame.state)
    }

    fn compute_block_stats(&mut self) -> Result<Stats> {
        let mut stats = Stats::new(&self.segment, &self.field_info.name);
        if let Some(ref index) = self.index {
            stats.index_num_bytes = index.size_in_bytes() as i64;
        }
        self.init_index_input()?;

        self.push_root()?;
        self.load_current()?;
        {
            let frame = &self.stack[self.current_frame_ord];
            stats.start_block(frame, !frame.is_last_in_floor);
        }

        'all_terms: loop {
            // Pop finished blocks
            while self.stack[self.current_frame_ord].next_ent
                == self.stack[self.current_frame_ord].ent_count
            {
                stats.end_block(&self.stack[self.current_frame_ord])?;
                if !self.stack[self.current_frame_ord].is_last_in_floor {
                    let input = input_of(&mut self.input)?;
                    self.stack[self.current_frame_ord].load_next_floor_block(input)?;
                    stats.start_block(&self.stack[self.current_frame_ord], true);
                    break;
                }
                if self.current_frame_ord == 1 {
                    break 'all_terms;
                }
                let last_fp = self.stack[self.current_frame_ord].fp_orig;
                self.current_frame_ord -= 1;
                debug_assert_eq!(last_fp, self.stack[self.current_frame_ord].last_sub_fp);
            }

            loop {
                let ord = self.current_frame_ord;
                let input = input_of(&mut self.input)?;
                if self.stack[ord].next(&mut self.term, input)? {
                    let fp = self.stack[ord].last_sub_fp;
                    let length = self.term.len;
                    self.current_frame_ord = self.push_sub_block(fp, length)?;
                    self.load_current()?;
                    let frame = &self.stack[self.current_frame_ord];
                    stats.start_block(frame, !frame.is_last_in_floor);
                } else {
                    stats.term(self.term.as_slice());
                    break;
                }
            }
        }
        stats.finish();

        // Put root frame back:
        self.current_frame_ord = 0;
        self.stack[1].rewind()?;
        self.valid_index_prefix = 0;
        self.term.clear();
        self.term.exists = false;
        self.position = Position::Unpositioned;
        Ok(stats)
    }
}

impl<P: PostingsReaderBase> TermIterator for SegmentTermIterator<P> {
    type Postings = P::Postings;
    type TermState = BlockTermState<P::TermState>;

    fn next(&mut self) -> Result<Option<Vec<u8>>> {
        match self.position {
            Position::Exhausted => return Ok(None),
            Position::Invalid => bail!(IllegalState(
                "next() called after a failed seek; seek to a term first".into()
            )),
            Position::Unpositioned | Position::OnTerm => {}
        }
        let res = self.next_term();
        if self.invalidate(res)? {
            Ok(Some(self.term.as_slice().to_vec()))
        } else {
            Ok(None)
        }
    }

    fn seek_exact(&mut self, text: &[u8]) -> Result<bool> {
        self.position = Position::Invalid;
        let res = self.seek_exact_internal(text);
        let found = self.invalidate(res)?;
        if found {
            self.position = Position::OnTerm;
        }
        Ok(found)
    }

    fn seek_ceil(&mut self, text: &[u8]) -> Result<SeekStatus> {
        self.position = Position::Invalid;
        let res = self.seek_ceil_internal(text);
        let status = self.invalidate(res)?;
        self.position = match status {
            SeekStatus::End => Position::Exhausted,
            SeekStatus::Found | SeekStatus::NotFound => Position::OnTerm,
        };
        Ok(status)
    }

    fn seek_exact_ord(&mut self, _ord: i64) -> Result<()> {
        bail!(UnsupportedOperation(
            "block tree terms dict does not support seek by ord".into()
        ))
    }

    fn seek_exact_state(&mut self, text: &[u8], state: &Self::TermState) -> Result<()> {
        if state.term_block_ord <= 0 {
            bail!(IllegalArgument(format!(
                "term state for {:?} was not taken from a positioned iterator",
                text
            )));
        }
        if self.position != Position::OnTerm || !self.term.exists || text != self.term.as_slice()
        {
            self.current_frame_ord = 0;
            let frame = &mut self.stack[0];
            frame.state.copy_from(state);
            frame.metadata_upto = frame.term_block_ord();
            debug_assert!(frame.metadata_upto > 0);
            self.term.copy_from(text);
            self.term.exists = true;
            self.valid_index_prefix = 0;
        }
        self.position = Position::OnTerm;
        Ok(())
    }

    fn term(&self) -> Result<&[u8]> {
        self.check_on_term()?;
        Ok(self.term.as_slice())
    }

    fn ord(&self) -> Result<i64> {
        bail!(UnsupportedOperation(
            "block tree terms dict does not support ord".into()
        ))
    }

    fn doc_freq(&mut self) -> Result<i32> {
        Ok(self.decode_metadata()?.doc_freq)
    }

    fn total_term_freq(&mut self) -> Result<i64> {
        Ok(self.decode_metadata()?.total_term_freq)
    }

    fn postings_with_live_docs(
        &mut self,
        live_docs: Option<BitsRef>,
        flags: u16,
    ) -> Result<Self::Postings> {
        self.decode_metadata()?;
        let state = &self.stack[self.current_frame_ord].state;
        self.postings_reader
            .postings(&self.field_info, state, live_docs, flags)
    }

    fn term_state(&mut self) -> Result<Self::TermState> {
        Ok(self.decode_metadata()?.clone())
    }
}
