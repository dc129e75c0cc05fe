//! Read, modify, and write JVM classes
//!
//! ### Example
//!
//! Rewriting the text of every `ldc "..."` in a class comes down to parsing the class, pointing
//! the instruction at a freshly interned constant, and serializing the class again:
//!
//! ```no_run
//! use jar_string_replacer::jvm::class_file::ClassFile;
//! use jar_string_replacer::jvm::code::Instruction;
//! use jar_string_replacer::jvm::*;
//!
//! # fn rewrite(bytes: &[u8]) -> Result<Vec<u8>, Error> {
//! let mut class = ClassFile::parse(bytes)?;
//! let constants = &mut class.constants;
//! for method in &mut class.methods {
//!     if let Some(code) = method.code_mut() {
//!         for insn in &mut code.instructions {
//!             if let Instruction::Ldc { index, .. } = insn {
//!                 if let Some(text) = constants.get_string(*index) {
//!                     let updated = text.replace("%%__USER__%%", "1111");
//!                     let utf8 = constants.intern_utf8(&updated)?;
//!                     *index = constants.intern_string(utf8)?.into();
//!                 }
//!             }
//!         }
//!     }
//! }
//! class.to_bytes()
//! # }
//! ```
//!
//! Changing an `ldc` may grow it into an `ldc_w`, which moves the code around and invalidates the
//! stack map frames of the method. See [`verifier`] for how those get recomputed.

mod access_flags;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantPool, ConstantPoolOverflow,
    NameAndTypeConstantIndex, StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
