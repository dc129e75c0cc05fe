//! Replacing placeholders in the string constants of classes
//!
//! The rules ([`Rules`]) are matched against the text of every string constant loaded by an
//! `ldc` or `ldc_w` instruction. When the text changes, a new constant is appended to the pool and
//! the instruction is pointed at it, leaving every other use of the old constant alone. Because
//! the new constant may land at an index too large for `ldc`, an edit can change the size of the
//! method's code. That is the case where stack map frames get recomputed (see
//! [`crate::jvm::verifier`]).
//!
//! Processing a whole archive happens in two passes over the entries:
//!
//!   1. parse every class, and record where it sits in the type hierarchy
//!   2. rewrite the classes that pass the filter, and serialize them again
//!
//! Both passes run on a pool of worker threads. Anything going wrong with a single class only
//! affects that class, which is copied over untouched and reported to the [`Observer`].

mod errors;
mod jar;
mod observer;
mod rewriter;
mod rules;
mod settings;

pub use errors::*;
pub use jar::*;
pub use observer::*;
pub use rewriter::*;
pub use rules::*;
pub use settings::*;
