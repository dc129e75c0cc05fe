use super::{Constant, ConstantIndex, ConstantPoolOverflow};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Input does not start with the class file magic number
    ///
    /// This is not really a failure: such archive entries are passed through untouched.
    NotAClassFile,

    /// Input claims to be a class file but could not be decoded
    MalformedClassFile(String),

    ConstantPoolOverflow(ConstantPoolOverflow),

    /// Modified UTF-8 encoding of a constant would not fit in its `u16` length
    Utf8ConstantTooLong(usize),

    /// Stack map frames could not be derived for a method
    FrameComputationFailed {
        /// Method name and descriptor
        method: String,

        /// Bytecode offset (in the method as it was parsed) where analysis gave up
        offset: Option<u32>,

        kind: VerifierErrorKind,
    },

    /// A relocated branch no longer fits in its `i16` operand
    JumpOutOfRange { offset: u32, target: u32 },

    /// Method body grew past the 65535 bytes the JVM allows
    MethodCodeOverflow(usize),

    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotAClassFile => write!(f, "not a class file"),
            Error::MalformedClassFile(reason) => write!(f, "malformed class file: {}", reason),
            Error::ConstantPoolOverflow(overflow) => {
                write!(f, "constant pool overflow: {}", overflow)
            }
            Error::Utf8ConstantTooLong(len) => {
                write!(f, "UTF-8 constant of {} bytes exceeds 65535 bytes", len)
            }
            Error::FrameComputationFailed {
                method,
                offset: Some(offset),
                kind,
            } => write!(
                f,
                "cannot compute frames for {} at offset {}: {}",
                method, offset, kind
            ),
            Error::FrameComputationFailed {
                method,
                offset: None,
                kind,
            } => write!(f, "cannot compute frames for {}: {}", method, kind),
            Error::JumpOutOfRange { offset, target } => write!(
                f,
                "jump from offset {} to {} does not fit in 16 bits",
                offset, target
            ),
            Error::MethodCodeOverflow(len) => {
                write!(f, "method code of {} bytes exceeds 65535 bytes", len)
            }
            Error::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(overflow)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

#[derive(Debug)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    NotArrayType,
    InvalidIndex,
    InvalidType,
    MissingConstant(ConstantIndex),
    NotLoadableConstant(Constant),
    BadDescriptor(String),

    /// Two paths reach the same instruction with operand stacks of different heights
    StackHeightMismatch { expected: usize, found: usize },

    /// Code that no path reaches (frames for it would have to be invented)
    UnreachableCode,

    /// `jsr`/`ret` subroutines have no stack map frame representation
    Subroutine,

    /// Something other than `<init>` was done with an uninitialized object
    UninitializedMisuse,

    /// Control falls off the end of the method
    FallsOffEnd,
}

impl fmt::Display for VerifierErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierErrorKind::EmptyStack => write!(f, "operand stack underflow"),
            VerifierErrorKind::InvalidWidth(width) => {
                write!(f, "value of width {} where another was expected", width)
            }
            VerifierErrorKind::NotArrayType => write!(f, "expected an array type"),
            VerifierErrorKind::InvalidIndex => write!(f, "local variable index out of range"),
            VerifierErrorKind::InvalidType => write!(f, "unexpected value type"),
            VerifierErrorKind::MissingConstant(idx) => write!(f, "missing constant #{}", idx.0),
            VerifierErrorKind::NotLoadableConstant(constant) => {
                write!(f, "constant {:?} cannot be loaded", constant)
            }
            VerifierErrorKind::BadDescriptor(desc) => write!(f, "bad descriptor {:?}", desc),
            VerifierErrorKind::StackHeightMismatch { expected, found } => write!(
                f,
                "stack height {} does not match {} at merge point",
                found, expected
            ),
            VerifierErrorKind::UnreachableCode => write!(f, "unreachable code"),
            VerifierErrorKind::Subroutine => write!(f, "jsr/ret subroutines are not supported"),
            VerifierErrorKind::UninitializedMisuse => {
                write!(f, "uninitialized object used before its constructor call")
            }
            VerifierErrorKind::FallsOffEnd => write!(f, "execution falls off the end of the code"),
        }
    }
}
