//! Stack map frame computation
//!
//! ### Why frames have to be recomputed
//!
//! Rewriting an `ldc` can push its constant index past 255, at which point it has to be encoded
//! as the one byte longer `ldc_w`. Everything after it moves, and the `StackMapTable` attribute
//! (which is keyed by bytecode offsets, and whose uninitialized types point at offsets of `new`
//! instructions) goes stale. Rather than patch the old table, frames are derived again from
//! the instructions.
//!
//! ### Constructing verification frames
//!
//! This is the usual fixpoint iterative process: the method is split into [`BasicBlock`]s, each
//! block is interpreted starting from its input frame, and the output frame is merged into the
//! input frames of the blocks it can jump or fall through to (including exception handlers).
//! Reference types meet at their closest common superclass, which is where the
//! [`ClassHierarchy`] comes in. Blocks get revisited until nothing changes.
//!
//! Classes missing from the hierarchy can hide that superclass. The [`TypeMerger`] then falls
//! back on the method's previous `StackMapTable`, and failing that bounds exception types by
//! `java/lang/Throwable` (handlers must see a `Throwable`, so `java/lang/Object` would not
//! verify).
//!
//! Two simplifications keep this tractable:
//!
//!   - methods with `jsr`/`ret` subroutines are rejected (they are only allowed in class files
//!     that don't need frames anyway)
//!   - every instruction must be reachable, since the verifier still wants frames for dead code
//!     and there would be no types to give it
//!
//! [`BasicBlock`]: crate::jvm::code::BasicBlock
//! [`ClassHierarchy`]: crate::jvm::class_graph::ClassHierarchy

mod frame;
mod merge;
mod recompute;
mod types;

pub use frame::*;
pub use merge::*;
pub use recompute::*;
pub use types::*;
