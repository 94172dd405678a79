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

use std::cmp::{max, min};
use std::fmt;

use crate::core::store::io::DataOutput;
use crate::core::util::fst::fst_reader::{
    CompiledAddress, InputType, Label, ARCS_AS_FIXED_ARRAY, BIT_ARC_HAS_FINAL_OUTPUT,
    BIT_ARC_HAS_OUTPUT, BIT_FINAL_ARC, BIT_LAST_ARC, BIT_STOP_NODE, BIT_TARGET_NEXT,
    FINAL_END_NODE, FIXED_ARRAY_NUM_ARCS_DEEP, FIXED_ARRAY_NUM_ARCS_SHALLOW,
    FIXED_ARRAY_SHALLOW_DISTANCE, NON_FINAL_END_NODE,
};
use crate::core::util::fst::{OutputFactory, FST};
use crate::error::{ErrorKind, Result};

/// Builds an FST mapping byte strings to outputs from pre-sorted inputs.
///
/// Nodes are frozen as soon as no later input can reach them and are
/// appended to the FST's byte array right away. Suffixes are not shared,
/// so the result is a trie with outputs pushed as close to the root as
/// they can go.
pub struct FstBuilder<F: OutputFactory> {
    fst: FST<F>,
    no_output: F::Value,
    last_input: Vec<u8>,
    started: bool,
    // current "frontier"
    frontier: Vec<UnCompiledNode<F>>,
    // Used for the BIT_TARGET_NEXT optimization (whereby
    // instead of storing the address of the target node for
    // a given arc, we mark a single bit noting that the next
    // node in the bytes is the target node):
    last_frozen_node: CompiledAddress,
    allow_array_arcs: bool,
    arc_count: u64,
    node_count: u64,
}

impl<F: OutputFactory> FstBuilder<F> {
    pub fn new(outputs: F) -> Self {
        Self::build(outputs, true)
    }

    pub fn build(outputs: F, allow_array_arcs: bool) -> Self {
        let no_output = outputs.empty();
        let fst = FST::new(InputType::Byte1, outputs);
        let frontier = (0..10)
            .map(|depth| UnCompiledNode::new(depth, &no_output))
            .collect();

        FstBuilder {
            fst,
            no_output,
            last_input: Vec::new(),
            started: false,
            frontier,
            last_frozen_node: 0,
            allow_array_arcs,
            arc_count: 0,
            node_count: 0,
        }
    }

    pub fn term_count(&self) -> i64 {
        self.frontier[0].input_count
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn arc_count(&self) -> u64 {
        self.arc_count
    }

    /// Add the next input/output pair. Inputs must be added in strictly
    /// increasing byte order.
    pub fn add(&mut self, input: &[u8], output: F::Value) -> Result<()> {
        if self.started && input <= self.last_input.as_slice() {
            bail!(ErrorKind::IllegalArgument(format!(
                "inputs are added out of order: {:?} after {:?}",
                input, self.last_input
            )));
        }
        self.started = true;

        while self.frontier.len() < input.len() + 1 {
            let depth = self.frontier.len();
            self.frontier
                .push(UnCompiledNode::new(depth, &self.no_output));
        }

        if input.is_empty() {
            // empty input: only allowed as first input.  we have
            // to special case this because the packed FST
            // format cannot represent the empty input since
            // 'finalness' is stored on the incoming arc, not on
            // the node
            self.frontier[0].input_count += 1;
            self.frontier[0].is_final = true;
            self.fst.set_empty_output(output);
            return Ok(());
        }

        // compare shared prefix length
        let mut pos = 0;
        let pos_stop = min(self.last_input.len(), input.len());
        loop {
            self.frontier[pos].input_count += 1;
            if pos >= pos_stop || self.last_input[pos] != input[pos] {
                break;
            }
            pos += 1;
        }
        let prefix_len_plus1 = pos + 1;

        // minimize/compile states from previous input's
        // orphan'd suffix
        self.freeze_tail(prefix_len_plus1)?;

        // init tail states for current input
        for i in prefix_len_plus1..=input.len() {
            let no_output = self.no_output.clone();
            self.frontier[i - 1].add_arc(Label::from(input[i - 1]), Node::UnCompiled(i), no_output);
            self.frontier[i].input_count += 1;
        }

        let last_idx = input.len();
        self.frontier[last_idx].is_final = true;
        self.frontier[last_idx].output = self.no_output.clone();

        // push conflicting outputs forward, only as far as needed
        let mut output = output;
        for i in 1..prefix_len_plus1 {
            let label = Label::from(input[i - 1]);
            let last_output = self.frontier[i - 1].last_output(label).clone();

            let common_output_prefix = if last_output != self.no_output {
                let common = self.fst.outputs().common(&output, &last_output);
                let word_suffix = self.fst.outputs().subtract(&last_output, &common);
                self.prepend_output(i, &word_suffix);
                common
            } else {
                self.no_output.clone()
            };
            output = self.fst.outputs().subtract(&output, &common_output_prefix);
            if last_output != self.no_output {
                self.frontier[i - 1].set_last_output(label, common_output_prefix);
            }
        }

        // this new arc is private to this new input; set its
        // arc output to the leftover output:
        self.frontier[prefix_len_plus1 - 1]
            .set_last_output(Label::from(input[prefix_len_plus1 - 1]), output);

        self.last_input.clear();
        self.last_input.extend_from_slice(input);
        Ok(())
    }

    /// Returns final FST. NOTE: this will return None if nothing is accepted by the fst
    pub fn finish(mut self) -> Result<Option<FST<F>>> {
        // minimize nodes in the last word's suffix
        self.freeze_tail(0)?;

        if self.frontier[0].arcs.is_empty() && self.fst.empty_output().is_none() {
            return Ok(None);
        }

        let node = self.compile_node(0)?;
        self.fst.finish(node)?;
        Ok(Some(self.fst))
    }

    fn freeze_tail(&mut self, prefix_len_plus1: usize) -> Result<()> {
        let down_to = max(1, prefix_len_plus1);
        if self.last_input.len() < down_to {
            return Ok(());
        }
        for idx in (down_to..=self.last_input.len()).rev() {
            let next_final_output = self.frontier[idx].output.clone();
            // We "fake" the node as being final if it has no
            // outgoing arcs; in theory we could leave it
            // as non-final (the FST can represent this), but
            // readers have trouble w/ non-final dead-end states:
            let is_final = self.frontier[idx].is_final || self.frontier[idx].arcs.is_empty();

            let node = self.compile_node(idx)?;
            let label = Label::from(self.last_input[idx - 1]);
            self.frontier[idx - 1].replace_last(
                label,
                Node::Compiled(node),
                next_final_output,
                is_final,
            );
        }
        Ok(())
    }

    fn compile_node(&mut self, node_index: usize) -> Result<CompiledAddress> {
        let bytes_pos_start = self.fst.bytes.len();
        let node = self.add_node(node_index)?;
        if self.fst.bytes.len() != bytes_pos_start {
            // fst added a new node
            self.last_frozen_node = node;
        }
        let no_output = self.no_output.clone();
        self.frontier[node_index].clear(no_output);
        Ok(node)
    }

    fn prepend_output(&mut self, node_index: usize, output_prefix: &F::Value) {
        let outputs = self.fst.outputs();
        let node = &mut self.frontier[node_index];
        for arc in &mut node.arcs {
            arc.output = outputs.add(output_prefix, &arc.output);
        }
        if node.is_final {
            node.output = outputs.add(output_prefix, &node.output);
        }
    }

    /// Nodes will be expanded if their depth (distance from the root node) is
    /// <= `FIXED_ARRAY_SHALLOW_DISTANCE` and their number of arcs is >=
    /// `FIXED_ARRAY_NUM_ARCS_SHALLOW`, or if they have at least
    /// `FIXED_ARRAY_NUM_ARCS_DEEP` arcs.
    ///
    /// Fixed array consumes more RAM but enables binary search on the arcs
    /// (instead of a linear scan) on lookup by arc label.
    fn should_expand(&self, node: &UnCompiledNode<F>) -> bool {
        self.allow_array_arcs
            && ((node.depth <= FIXED_ARRAY_SHALLOW_DISTANCE
                && node.arcs.len() >= FIXED_ARRAY_NUM_ARCS_SHALLOW)
                || node.arcs.len() >= FIXED_ARRAY_NUM_ARCS_DEEP)
    }

    // serializes new node by appending its bytes to the end
    // of the current bytes
    fn add_node(&mut self, node_index: usize) -> Result<CompiledAddress> {
        let node = &self.frontier[node_index];
        if node.arcs.is_empty() {
            return Ok(if node.is_final {
                FINAL_END_NODE
            } else {
                NON_FINAL_END_NODE
            });
        }

        let do_fixed_array = self.should_expand(node);
        let last_arc = node.arcs.len() - 1;
        let mut encoded_arcs: Vec<Vec<u8>> = Vec::with_capacity(node.arcs.len());
        for (idx, arc) in node.arcs.iter().enumerate() {
            let target = match arc.target {
                Node::Compiled(address) => address,
                Node::UnCompiled(_) => bail!(ErrorKind::IllegalState(
                    "arc target must be frozen before its source node".into()
                )),
            };
            let mut flags = 0u8;
            if idx == last_arc {
                flags |= BIT_LAST_ARC;
            }
            if self.last_frozen_node == target && !do_fixed_array {
                flags |= BIT_TARGET_NEXT;
            }
            if arc.is_final {
                flags |= BIT_FINAL_ARC;
                if arc.next_final_output != self.no_output {
                    flags |= BIT_ARC_HAS_FINAL_OUTPUT;
                }
            } else {
                debug_assert_eq!(arc.next_final_output, self.no_output);
            }
            let target_has_arcs = target > 0;
            if !target_has_arcs {
                flags |= BIT_STOP_NODE;
            }
            if arc.output != self.no_output {
                flags |= BIT_ARC_HAS_OUTPUT;
            }

            let mut bytes = Vec::new();
            bytes.write_byte(flags)?;
            self.fst.write_label(&mut bytes, arc.label)?;
            if arc.output != self.no_output {
                self.fst.outputs().write(&arc.output, &mut bytes)?;
            }
            if arc.next_final_output != self.no_output {
                self.fst
                    .outputs()
                    .write_final_output(&arc.next_final_output, &mut bytes)?;
            }
            if target_has_arcs && (flags & BIT_TARGET_NEXT) == 0 {
                bytes.write_vlong(target)?;
            }
            encoded_arcs.push(bytes);
        }

        let mut node_bytes = Vec::new();
        if do_fixed_array {
            // expand all arcs to take up a fixed byte size
            let max_bytes_per_arc = encoded_arcs.iter().map(Vec::len).max().unwrap_or(0);
            node_bytes.write_byte(ARCS_AS_FIXED_ARRAY)?;
            node_bytes.write_vint(encoded_arcs.len() as i32)?;
            node_bytes.write_vint(max_bytes_per_arc as i32)?;
            for bytes in &encoded_arcs {
                node_bytes.extend_from_slice(bytes);
                let padded = node_bytes.len() + max_bytes_per_arc - bytes.len();
                node_bytes.resize(padded, 0);
            }
        } else {
            for bytes in &encoded_arcs {
                node_bytes.extend_from_slice(bytes);
            }
        }
        // nodes are read backwards from their last byte
        node_bytes.reverse();

        self.arc_count += encoded_arcs.len() as u64;
        self.node_count += 1;
        self.fst.bytes.extend_from_slice(&node_bytes);
        Ok((self.fst.bytes.len() - 1) as CompiledAddress)
    }
}

pub struct BuilderArc<F: OutputFactory> {
    pub label: Label,
    pub target: Node,
    pub is_final: bool,
    pub output: F::Value,
    pub next_final_output: F::Value,
}

impl<F: OutputFactory> fmt::Debug for BuilderArc<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BuilderArc(label: {}, is_final: {}, output: {:?}, next_final_output: {:?}, target: \
             {:?})",
            self.label, self.is_final, self.output, self.next_final_output, self.target
        )
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    Compiled(CompiledAddress),
    // index in builder.frontier
    UnCompiled(usize),
}

/// Holds a pending (seen but not yet serialized) node.
struct UnCompiledNode<F: OutputFactory> {
    arcs: Vec<BuilderArc<F>>,
    output: F::Value,
    is_final: bool,
    input_count: i64,
    // This node's depth, starting from the automaton root
    depth: usize,
}

impl<F: OutputFactory> UnCompiledNode<F> {
    fn new(depth: usize, no_output: &F::Value) -> Self {
        UnCompiledNode {
            arcs: Vec::with_capacity(1),
            output: no_output.clone(),
            is_final: false,
            input_count: 0,
            depth,
        }
    }

    fn clear(&mut self, no_output: F::Value) {
        self.arcs.clear();
        self.is_final = false;
        self.output = no_output;
        self.input_count = 0;
    }

    fn last_output(&self, label_to_match: Label) -> &F::Value {
        let arc = &self.arcs[self.arcs.len() - 1];
        debug_assert_eq!(arc.label, label_to_match);
        &arc.output
    }

    fn set_last_output(&mut self, label_to_match: Label, new_output: F::Value) {
        let idx = self.arcs.len() - 1;
        debug_assert_eq!(self.arcs[idx].label, label_to_match);
        self.arcs[idx].output = new_output;
    }

    fn add_arc(&mut self, label: Label, target: Node, no_output: F::Value) {
        debug_assert!(label >= 0);
        debug_assert!(self.arcs.is_empty() || label > self.arcs[self.arcs.len() - 1].label);
        self.arcs.push(BuilderArc {
            label,
            target,
            is_final: false,
            output: no_output.clone(),
            next_final_output: no_output,
        });
    }

    fn replace_last(
        &mut self,
        label_to_match: Label,
        target: Node,
        next_final_output: F::Value,
        is_final: bool,
    ) {
        let idx = self.arcs.len() - 1;
        let arc = &mut self.arcs[idx];
        debug_assert_eq!(arc.label, label_to_match);
        arc.target = target;
        arc.next_final_output = next_final_output;
        arc.is_final = is_final;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::util::fst::{ByteSequenceOutput, ByteSequenceOutputFactory};
    use rand::{thread_rng, Rng};
    use std::collections::BTreeMap;

    #[test]
    fn test_rejects_unsorted_input() {
        let mut builder = FstBuilder::new(ByteSequenceOutputFactory::new());
        builder.add(b"b", ByteSequenceOutput::empty()).unwrap();
        assert!(builder.add(b"a", ByteSequenceOutput::empty()).is_err());
        assert!(builder.add(b"b", ByteSequenceOutput::empty()).is_err());
        assert!(builder.add(b"ba", ByteSequenceOutput::empty()).is_ok());
        assert_eq!(builder.term_count(), 2);
    }

    #[test]
    fn test_nothing_accepted() {
        let builder = FstBuilder::new(ByteSequenceOutputFactory::new());
        assert!(builder.finish().unwrap().is_none());
    }

    #[test]
    fn test_shared_outputs_are_pushed_forward() {
        let mut builder = FstBuilder::new(ByteSequenceOutputFactory::new());
        builder
            .add(b"stop", ByteSequenceOutput::new(vec![1, 2, 3]))
            .unwrap();
        builder
            .add(b"stops", ByteSequenceOutput::new(vec![1, 2, 4]))
            .unwrap();
        builder
            .add(b"sz", ByteSequenceOutput::new(vec![1, 5]))
            .unwrap();
        let fst = builder.finish().unwrap().unwrap();

        assert_eq!(fst.get(b"stop").unwrap().unwrap().inner(), &[1, 2, 3]);
        assert_eq!(fst.get(b"stops").unwrap().unwrap().inner(), &[1, 2, 4]);
        assert_eq!(fst.get(b"sz").unwrap().unwrap().inner(), &[1, 5]);
        assert!(fst.get(b"st").unwrap().is_none());

        // the shared prefix lives on the first arc
        let root = fst.root_arc();
        let mut reader = fst.bytes_reader();
        let s = fst
            .find_target_arc(i32::from(b's'), &root, &mut reader)
            .unwrap()
            .unwrap();
        assert_eq!(s.output.unwrap().inner(), &[1]);
    }

    #[test]
    fn test_random_terms() {
        let mut rng = thread_rng();
        let mut expected = BTreeMap::new();
        for _ in 0..500 {
            let len = rng.gen_range(1, 8);
            let term: Vec<u8> = (0..len).map(|_| rng.gen_range(0u8, 6)).collect();
            let out_len = rng.gen_range(0, 4);
            let output: Vec<u8> = (0..out_len).map(|_| rng.gen()).collect();
            expected.insert(term, output);
        }

        let mut builder = FstBuilder::new(ByteSequenceOutputFactory::new());
        for (term, output) in &expected {
            builder
                .add(term, ByteSequenceOutput::new(output.clone()))
                .unwrap();
        }
        assert_eq!(builder.term_count(), expected.len() as i64);
        let fst = builder.finish().unwrap().unwrap();

        for (term, output) in &expected {
            assert_eq!(fst.get(term).unwrap().unwrap().inner(), output.as_slice());
            let mut longer = term.clone();
            longer.push(200);
            assert!(fst.get(&longer).unwrap().is_none());
        }
    }
}
