//! Bytecode representation
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](Code), the bytecode is arguably
//! the most important part of the class file - it contains the actual executable instructions.
//! The code array is decoded into a flat list of [`Instruction`]s, where every branch target is a
//! [`Label`] (the position of the target instruction in that list) instead of a byte offset.
//!
//! ### Layout
//!
//! Byte offsets are never stored on instructions. They are derived by laying the instructions out
//! one after another ([`Code::layout`]), which is the point at which an `ldc` whose constant index
//! outgrew a byte turns into an `ldc_w`, and switch padding gets recomputed. The exception table
//! and the debug tables that refer to offsets all hold labels too, so they follow automatically.
//!
//! For stack map frame computation, the instruction list is further split up into
//! [`BasicBlock`]s.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod basic_block;
mod code;
mod instruction;
pub mod opcodes;

pub use basic_block::*;
pub use code::*;
pub use instruction::*;
