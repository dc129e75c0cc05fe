use super::{Code, Label};
use std::collections::BTreeSet;

/// Straight-line run of instructions: control only enters at the first instruction and only
/// leaves after the last one (or through an exception)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// First instruction in the block
    pub start: Label,

    /// One past the last instruction in the block
    pub end: Label,
}

impl BasicBlock {
    /// Split the code into basic blocks, in code order
    ///
    /// Blocks start at the first instruction, at every jump target and exception handler, after
    /// every instruction that jumps or doesn't fall through, and at the boundaries of protected
    /// ranges (so that a block is either entirely covered by a handler or not at all).
    pub fn partition(code: &Code) -> Vec<BasicBlock> {
        let len = code.instructions.len();
        let mut starts: BTreeSet<Label> = BTreeSet::new();
        starts.insert(Label(0));

        for (idx, insn) in code.instructions.iter().enumerate() {
            let targets = insn.jump_targets();
            if !targets.is_empty() || !insn.falls_through() {
                starts.insert(Label(idx + 1));
            }
            starts.extend(targets);
        }
        for handler in &code.exception_table {
            starts.insert(handler.start);
            starts.insert(handler.end);
            starts.insert(handler.handler);
        }
        starts.retain(|label| label.0 < len);

        let starts: Vec<Label> = starts.into_iter().collect();
        starts
            .iter()
            .enumerate()
            .map(|(idx, start)| BasicBlock {
                start: *start,
                end: starts.get(idx + 1).copied().unwrap_or(Label(len)),
            })
            .collect()
    }

    /// Labels of the instructions in the block
    pub fn labels(&self) -> impl Iterator<Item = Label> {
        (self.start.0..self.end.0).map(Label)
    }
}
