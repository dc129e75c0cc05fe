pub mod archive;
pub mod jvm;
pub mod replace;
mod util;

pub use replace::Error;
