//! Binary class file format
//!
//! Everything here maps more or less one-to-one onto the [class file structures][0]. Parsing is
//! lossless for everything that isn't decoded: attributes that the rest of the crate has no use
//! for are carried around as raw bytes and written back out unchanged.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod parse;
mod serialize;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use parse::*;
pub use serialize::*;
pub use version::*;
