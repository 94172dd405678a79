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

use crate::core::codec::codec_util::{check_header, write_header};
use crate::core::store::io::{DataInput, DataOutput, IndexInput};
use crate::core::util::fst::{BytesReader, DirectionalBytesReader, Output, OutputFactory};
use crate::error::{ErrorKind, Result};

pub(crate) const BIT_FINAL_ARC: u8 = 1;
pub(crate) const BIT_LAST_ARC: u8 = 1 << 1;
pub(crate) const BIT_TARGET_NEXT: u8 = 1 << 2;
pub(crate) const BIT_STOP_NODE: u8 = 1 << 3;
pub(crate) const BIT_ARC_HAS_OUTPUT: u8 = 1 << 4;
pub(crate) const BIT_ARC_HAS_FINAL_OUTPUT: u8 = 1 << 5;

/// We use this as a marker (because this one flag is
/// illegal by itself ...):
pub(crate) const ARCS_AS_FIXED_ARRAY: u8 = BIT_ARC_HAS_FINAL_OUTPUT;

pub(crate) const FIXED_ARRAY_SHALLOW_DISTANCE: usize = 3;
pub(crate) const FIXED_ARRAY_NUM_ARCS_SHALLOW: usize = 5;
pub(crate) const FIXED_ARRAY_NUM_ARCS_DEEP: usize = 10;
const FILE_FORMAT_NAME: &str = "FST";

const VERSION_PACKED: i32 = 3;
const VERSION_VINT_TARGET: i32 = 4;
const VERSION_NO_NODE_ARC_COUNTS: i32 = 5;
// packed fsts are no longer readable
const VERSION_PACKED_REMOVED: i32 = 6;
const VERSION_CURRENT: i32 = VERSION_PACKED_REMOVED;

pub(crate) const FINAL_END_NODE: CompiledAddress = -1;
pub(crate) const NON_FINAL_END_NODE: CompiledAddress = 0;

const ROOT_ARC_CACHE_SIZE: usize = 128;

pub const END_LABEL: Label = -1;

fn flag(flags: u8, bit: u8) -> bool {
    (flags & bit) != 0
}

pub type Label = i32;
pub type CompiledAddress = i64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputType {
    Byte1,
    Byte2,
    Byte4,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Arc<T: Output> {
    pub flags: u8,
    pub label: Label,
    pub output: Option<T>,
    pub next_final_output: Option<T>,
    pub next_arc: Option<CompiledAddress>,
    /// To node
    pub target: CompiledAddress,
    /// Where the first arc in the array starts; only valid if bytes_per_arc != 0.
    pub arc_start_position: usize,

    /// Non-zero if this arc is part of an array, which means all
    /// arcs for the node are encoded with a fixed number of bytes so
    /// that we can random access by index.
    pub bytes_per_arc: usize,

    /// Where we are in the array; only valid if bytes_per_arc != 0.
    pub arc_index: usize,

    /// How many arcs in the array; only valid if bytes_per_arc != 0.
    pub num_arcs: usize,
}

impl<T: Output> Arc<T> {
    pub fn empty() -> Arc<T> {
        Arc {
            flags: 0u8,
            label: 0,
            output: None,
            next_final_output: None,
            next_arc: None,
            target: 0,
            arc_start_position: 0,
            bytes_per_arc: 0,
            arc_index: 0,
            num_arcs: 0,
        }
    }

    pub fn is_last(&self) -> bool {
        flag(self.flags, BIT_LAST_ARC)
    }

    pub fn is_final(&self) -> bool {
        flag(self.flags, BIT_FINAL_ARC)
    }
}

impl<T: Output> Default for Arc<T> {
    fn default() -> Self {
        Arc::empty()
    }
}

/// Represents an finite state machine (FST), using a compact byte[] format.
///
/// The FST is read-only once built; readers share it freely and walk it
/// through a `DirectionalBytesReader` obtained from `bytes_reader`.
pub struct FST<F: OutputFactory> {
    input_type: InputType,
    // if non-none, this FST accepts the empty string and
    // produces this output
    empty_output: Option<F::Value>,
    pub(crate) bytes: Vec<u8>,
    start_node: CompiledAddress,
    version: i32,
    output_factory: F,
    cached_root_arcs: Vec<Option<Arc<F::Value>>>,
}

impl<F: OutputFactory> FST<F> {
    pub(crate) fn new(input_type: InputType, output_factory: F) -> Self {
        FST {
            input_type,
            empty_output: None,
            // pad so no node is written at address 0
            bytes: vec![0u8],
            start_node: -1,
            version: VERSION_CURRENT,
            output_factory,
            cached_root_arcs: Vec::with_capacity(0),
        }
    }

    /// Load a previously saved FST.
    pub fn from_input<I: IndexInput + ?Sized>(data_in: &mut I, output_factory: F) -> Result<Self> {
        // Only reads most recent format; we don't have
        // back-compat promise for FSTs (they are experimental):
        let version = check_header(data_in, FILE_FORMAT_NAME, VERSION_PACKED, VERSION_CURRENT)?;

        if version < VERSION_PACKED_REMOVED && data_in.read_byte()? == 1 {
            bail!(ErrorKind::CorruptIndex(
                "Cannot read packed FSTs anymore".into()
            ));
        }

        let empty_output = if data_in.read_byte()? == 1 {
            // Accepts empty string
            let num_bytes = data_in.read_vint()?;
            if num_bytes < 0 {
                bail!(ErrorKind::CorruptIndex(format!(
                    "invalid empty output length: {}",
                    num_bytes
                )));
            }
            let mut bytes = vec![0u8; num_bytes as usize];
            data_in.read_bytes(&mut bytes, 0, num_bytes as usize)?;
            // saved in reverse order
            bytes.reverse();
            let mut slice: &[u8] = &bytes;
            Some(output_factory.read_final_output(&mut slice)?)
        } else {
            None
        };

        let input_type = match data_in.read_byte()? {
            0 => InputType::Byte1,
            1 => InputType::Byte2,
            2 => InputType::Byte4,
            x => bail!(ErrorKind::CorruptIndex(format!(
                "invalid input type: {}",
                x
            ))),
        };
        let start_node = data_in.read_vlong()? as CompiledAddress;
        if version < VERSION_NO_NODE_ARC_COUNTS {
            data_in.read_vlong()?;
            data_in.read_vlong()?;
            data_in.read_vlong()?;
        }

        let num_bytes = data_in.read_vlong()?;
        let remaining = data_in.len() as i64 - data_in.file_pointer();
        if num_bytes > remaining || start_node >= num_bytes.max(1) {
            bail!(ErrorKind::CorruptIndex(format!(
                "invalid fst: num_bytes={}, start_node={}, remaining={} (resource={})",
                num_bytes,
                start_node,
                remaining,
                data_in.name()
            )));
        }
        let len = num_bytes as usize;
        let mut bytes = vec![0u8; len];
        data_in.read_bytes(&mut bytes, 0, len)?;

        let mut fst = FST {
            input_type,
            empty_output,
            bytes,
            start_node,
            version,
            output_factory,
            cached_root_arcs: Vec::with_capacity(0),
        };
        fst.cache_root_arcs()?;
        Ok(fst)
    }

    pub fn outputs(&self) -> &F {
        &self.output_factory
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn empty_output(&self) -> Option<&F::Value> {
        self.empty_output.as_ref()
    }

    pub(crate) fn set_empty_output(&mut self, v: F::Value) {
        self.empty_output = Some(v);
    }

    pub fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Looks up the output for this input, or None if the input is not accepted.
    pub fn get(&self, bytes: &[u8]) -> Result<Option<F::Value>> {
        let mut arc = self.root_arc();
        let mut output = self.output_factory.empty();
        let mut bytes_reader = self.bytes_reader();

        for &b in bytes {
            match self.find_target_arc(Label::from(b), &arc, &mut bytes_reader)? {
                Some(a) => {
                    arc = a;
                    if let Some(ref out) = arc.output {
                        if !out.is_empty() {
                            output.concat(out);
                        }
                    }
                }
                None => return Ok(None),
            }
        }

        if arc.is_final() {
            if let Some(ref out) = arc.next_final_output {
                if !out.is_empty() {
                    output.concat(out);
                }
            }
            Ok(Some(output))
        } else {
            Ok(None)
        }
    }

    pub fn bytes_reader(&self) -> DirectionalBytesReader<'_> {
        DirectionalBytesReader::new(&self.bytes, true)
    }

    /// Fills virtual 'start' arc, ie, an empty incoming arc to
    /// the FST's start node
    pub fn root_arc(&self) -> Arc<F::Value> {
        let mut arc = Arc::empty();

        if let Some(ref default_output) = self.empty_output {
            arc.flags = BIT_FINAL_ARC | BIT_LAST_ARC;
            arc.next_final_output = Some(default_output.clone());
            if !default_output.is_empty() {
                arc.flags |= BIT_ARC_HAS_FINAL_OUTPUT;
            }
        } else {
            arc.flags = BIT_LAST_ARC;
            arc.next_final_output = Some(self.output_factory.empty());
        }
        arc.output = Some(self.output_factory.empty());

        // If there are no nodes, ie, the FST only accepts the
        // empty string, then start_node is 0.
        arc.target = self.start_node;

        arc
    }

    pub fn find_target_arc(
        &self,
        label: Label,
        incoming_arc: &Arc<F::Value>,
        bytes_reader: &mut dyn BytesReader,
    ) -> Result<Option<Arc<F::Value>>> {
        self.find_target_arc_with_cache(label, incoming_arc, bytes_reader, true)
    }

    /// Finds an arc leaving the incoming arc's target node with the given
    /// label, or None if there is no such arc.
    pub fn find_target_arc_with_cache(
        &self,
        label: Label,
        incoming_arc: &Arc<F::Value>,
        bytes_reader: &mut dyn BytesReader,
        use_root_arc_cache: bool,
    ) -> Result<Option<Arc<F::Value>>> {
        if label == END_LABEL {
            if incoming_arc.is_final() {
                let mut target_arc = incoming_arc.clone();
                if !self.target_has_arcs(incoming_arc.target) {
                    target_arc.flags = BIT_LAST_ARC;
                } else {
                    target_arc.flags = 0u8;
                    // next_arc is a node (not an address!) in this case:
                    target_arc.next_arc = Some(incoming_arc.target);
                }
                target_arc.output = incoming_arc.next_final_output.clone();
                target_arc.label = END_LABEL;
                return Ok(Some(target_arc));
            } else {
                return Ok(None);
            }
        }

        if use_root_arc_cache
            && !self.cached_root_arcs.is_empty()
            && incoming_arc.target == self.start_node
            && label >= 0
            && (label as usize) < self.cached_root_arcs.len()
        {
            return Ok(self.cached_root_arcs[label as usize].clone());
        }

        if !self.target_has_arcs(incoming_arc.target) {
            return Ok(None);
        }

        bytes_reader.set_position(incoming_arc.target as usize);

        let mut arc = Arc::empty();
        if bytes_reader.read_byte()? == ARCS_AS_FIXED_ARRAY {
            // Arcs are full array, do binary search.
            self.read_array_header(&mut arc, bytes_reader)?;
            let mut low = 0usize;
            let mut high = arc.num_arcs;
            while low < high {
                let mid = (low + high) >> 1;
                bytes_reader.set_position(arc.arc_start_position);
                bytes_reader.skip_bytes(arc.bytes_per_arc * mid + 1)?;
                let current_label = self.read_label(bytes_reader)?;
                if current_label < label {
                    low = mid + 1;
                } else if current_label > label {
                    high = mid;
                } else {
                    arc.arc_index = mid;
                    self.read_next_real_arc(&mut arc, bytes_reader)?;
                    return Ok(Some(arc));
                }
            }
            return Ok(None);
        }

        // Do linear scan
        let mut arc = self.read_first_real_arc(incoming_arc.target, bytes_reader)?;
        loop {
            if arc.label == label {
                return Ok(Some(arc));
            } else if arc.label > label || arc.is_last() {
                return Ok(None);
            } else {
                self.read_next_real_arc(&mut arc, bytes_reader)?;
            }
        }
    }

    pub fn target_has_arcs(&self, target: CompiledAddress) -> bool {
        target > 0
    }

    fn read_array_header(
        &self,
        arc: &mut Arc<F::Value>,
        bytes_reader: &mut dyn BytesReader,
    ) -> Result<()> {
        let num_arcs = bytes_reader.read_vint()?;
        let bytes_per_arc = if self.version >= VERSION_VINT_TARGET {
            bytes_reader.read_vint()?
        } else {
            bytes_reader.read_int()?
        };
        if num_arcs <= 0 || bytes_per_arc <= 0 {
            bail!(ErrorKind::CorruptIndex(format!(
                "invalid fixed arc array: num_arcs={}, bytes_per_arc={}",
                num_arcs, bytes_per_arc
            )));
        }
        arc.num_arcs = num_arcs as usize;
        arc.bytes_per_arc = bytes_per_arc as usize;
        arc.arc_start_position = bytes_reader.position();
        arc.arc_index = 0;
        Ok(())
    }

    fn read_label(&self, reader: &mut dyn BytesReader) -> Result<Label> {
        match self.input_type {
            InputType::Byte1 => reader.read_byte().map(Label::from),
            InputType::Byte2 => reader.read_short().map(|v| Label::from(v as u16)),
            InputType::Byte4 => reader.read_vint(),
        }
    }

    pub(crate) fn write_label<T: DataOutput + ?Sized>(&self, out: &mut T, v: Label) -> Result<()> {
        match self.input_type {
            InputType::Byte1 if v >= 0 && v <= 255 => out.write_byte(v as u8),
            InputType::Byte2 if v >= 0 && v <= 65535 => out.write_short(v as u16 as i16),
            InputType::Byte4 if v >= 0 => out.write_vint(v),
            _ => bail!(ErrorKind::IllegalArgument(format!(
                "label {} out of range for {:?}",
                v, self.input_type
            ))),
        }
    }

    pub fn read_first_real_arc(
        &self,
        node: CompiledAddress,
        bytes_reader: &mut dyn BytesReader,
    ) -> Result<Arc<F::Value>> {
        bytes_reader.set_position(node as usize);

        let mut arc = Arc::empty();
        if bytes_reader.read_byte()? == ARCS_AS_FIXED_ARRAY {
            self.read_array_header(&mut arc, bytes_reader)?;
        } else {
            arc.next_arc = Some(node);
        }
        self.read_next_real_arc(&mut arc, bytes_reader)?;
        Ok(arc)
    }

    /// Follow the `follow` arc and read the first arc of its target;
    /// this changes the provided `arc` (2nd arg) in-place and returns
    /// it.
    pub fn read_first_target_arc(
        &self,
        follow: &Arc<F::Value>,
        input: &mut dyn BytesReader,
    ) -> Result<Arc<F::Value>> {
        if follow.is_final() {
            let mut arc = Arc::empty();
            arc.flags = BIT_FINAL_ARC;
            arc.label = END_LABEL;
            arc.target = FINAL_END_NODE;
            arc.output = follow.next_final_output.clone();
            if !self.target_has_arcs(follow.target) {
                arc.flags |= BIT_LAST_ARC;
            } else {
                arc.next_arc = Some(follow.target);
            };
            Ok(arc)
        } else {
            self.read_first_real_arc(follow.target, input)
        }
    }

    /// In-place read; returns the arc.
    pub fn read_next_arc(
        &self,
        arc: &mut Arc<F::Value>,
        bytes_reader: &mut dyn BytesReader,
    ) -> Result<()> {
        if arc.label == END_LABEL {
            // This was a fake inserted "final" arc
            match arc.next_arc {
                Some(node) if node > 0 => {
                    *arc = self.read_first_real_arc(node, bytes_reader)?;
                }
                _ => bail!(ErrorKind::IllegalArgument(
                    "cannot read_next_arc when arc.is_last()".into()
                )),
            }
        } else {
            self.read_next_real_arc(arc, bytes_reader)?;
        }
        Ok(())
    }

    /// Never returns None, but you should never call this if
    /// arc.is_last() is true.
    pub fn read_next_real_arc(
        &self,
        arc: &mut Arc<F::Value>,
        bytes_reader: &mut dyn BytesReader,
    ) -> Result<()> {
        if arc.bytes_per_arc > 0 {
            if arc.arc_index >= arc.num_arcs {
                bail!(ErrorKind::IllegalState(
                    "read past the last arc of a fixed array".into()
                ));
            }
            bytes_reader.set_position(arc.arc_start_position);
            bytes_reader.skip_bytes(arc.arc_index * arc.bytes_per_arc)?;
            arc.arc_index += 1;
        } else {
            match arc.next_arc {
                Some(address) => bytes_reader.set_position(address as usize),
                None => bail!(ErrorKind::IllegalState("arc has no successor".into())),
            }
        }

        arc.flags = bytes_reader.read_byte()?;
        arc.label = self.read_label(bytes_reader)?;
        arc.output = if flag(arc.flags, BIT_ARC_HAS_OUTPUT) {
            Some(self.output_factory.read(bytes_reader)?)
        } else {
            None
        };
        arc.next_final_output = if flag(arc.flags, BIT_ARC_HAS_FINAL_OUTPUT) {
            Some(self.output_factory.read_final_output(bytes_reader)?)
        } else {
            None
        };
        if flag(arc.flags, BIT_STOP_NODE) {
            arc.target = FINAL_END_NODE;
            arc.next_arc = Some(bytes_reader.position() as CompiledAddress);
        } else if flag(arc.flags, BIT_TARGET_NEXT) {
            arc.next_arc = Some(bytes_reader.position() as CompiledAddress);
            if !flag(arc.flags, BIT_LAST_ARC) {
                if arc.bytes_per_arc > 0 {
                    bytes_reader.set_position(arc.arc_start_position);
                    bytes_reader.skip_bytes(arc.bytes_per_arc * arc.num_arcs)?;
                } else {
                    self.seek_to_next_node(bytes_reader)?;
                }
            }
            arc.target = bytes_reader.position() as CompiledAddress;
        } else {
            arc.target = self.read_unpacked_node(bytes_reader)?;
            arc.next_arc = Some(bytes_reader.position() as CompiledAddress);
        }
        Ok(())
    }

    fn seek_to_next_node(&self, bytes_reader: &mut dyn BytesReader) -> Result<()> {
        loop {
            let flags = bytes_reader.read_byte()?;
            self.read_label(bytes_reader)?;

            if flag(flags, BIT_ARC_HAS_OUTPUT) {
                self.output_factory.skip_output(bytes_reader)?;
            }
            if flag(flags, BIT_ARC_HAS_FINAL_OUTPUT) {
                self.output_factory.skip_final_output(bytes_reader)?;
            }
            if !flag(flags, BIT_STOP_NODE) && !flag(flags, BIT_TARGET_NEXT) {
                self.read_unpacked_node(bytes_reader)?;
            }

            if flag(flags, BIT_LAST_ARC) {
                return Ok(());
            }
        }
    }

    fn read_unpacked_node(&self, bytes_reader: &mut dyn BytesReader) -> Result<CompiledAddress> {
        let address = if self.version < VERSION_VINT_TARGET {
            CompiledAddress::from(bytes_reader.read_int()?)
        } else {
            bytes_reader.read_vlong()?
        };
        if address as usize >= self.bytes.len() {
            bail!(ErrorKind::CorruptIndex(format!(
                "arc target {} out of bounds ({} fst bytes)",
                address,
                self.bytes.len()
            )));
        }
        Ok(address)
    }

    pub(crate) fn finish(&mut self, new_start_node: CompiledAddress) -> Result<()> {
        if self.start_node != -1 {
            bail!(ErrorKind::IllegalState("already finished".into()));
        }
        self.start_node = if new_start_node == FINAL_END_NODE {
            0
        } else {
            new_start_node
        };
        self.cache_root_arcs()
    }

    // caches the root node's arcs for the first 128 labels
    fn cache_root_arcs(&mut self) -> Result<()> {
        let root = self.root_arc();
        if !self.target_has_arcs(root.target) {
            return Ok(());
        }
        let mut arcs = vec![None; ROOT_ARC_CACHE_SIZE];
        let mut count = 0;
        {
            let mut input = self.bytes_reader();
            let mut arc = self.read_first_real_arc(root.target, &mut input)?;
            loop {
                if arc.label < 0 || arc.label as usize >= ROOT_ARC_CACHE_SIZE {
                    break;
                }
                let is_last = arc.is_last();
                arcs[arc.label as usize] = Some(arc.clone());
                count += 1;
                if is_last {
                    break;
                }
                self.read_next_real_arc(&mut arc, &mut input)?;
            }
        }

        if count >= FIXED_ARRAY_NUM_ARCS_SHALLOW {
            self.cached_root_arcs = arcs;
        }
        Ok(())
    }

    pub fn save<T: DataOutput + ?Sized>(&self, out: &mut T) -> Result<()> {
        if self.start_node == -1 {
            bail!(ErrorKind::IllegalState("call finish first!".into()));
        }
        write_header(out, FILE_FORMAT_NAME, VERSION_CURRENT)?;
        if let Some(ref empty_output) = self.empty_output {
            // Accepts empty string
            out.write_byte(1)?;

            // Serialize empty-string output
            let mut empty_output_bytes: Vec<u8> = Vec::new();
            self.output_factory
                .write_final_output(empty_output, &mut empty_output_bytes)?;

            // reverse
            empty_output_bytes.reverse();
            out.write_vint(empty_output_bytes.len() as i32)?;
            out.write_bytes(&empty_output_bytes, 0, empty_output_bytes.len())?;
        } else {
            out.write_byte(0)?;
        }
        let t = match self.input_type {
            InputType::Byte1 => 0,
            InputType::Byte2 => 1,
            InputType::Byte4 => 2,
        };
        out.write_byte(t)?;
        out.write_vlong(self.start_node)?;
        out.write_vlong(self.bytes.len() as i64)?;
        out.write_bytes(&self.bytes, 0, self.bytes.len())
    }
}
