use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::ErrorKind;

/// Counterpart of [`super::Serialize`]: decode a construct from a class file byte stream
///
/// Running out of input is never an I/O problem here (class files are always fully buffered), so
/// every read failure surfaces as [`Error::MalformedClassFile`].
pub trait Parse: Sized {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error>;
}

pub(crate) fn truncated(err: std::io::Error) -> Error {
    match err.kind() {
        ErrorKind::UnexpectedEof => Error::MalformedClassFile(String::from("unexpected end of input")),
        _ => Error::MalformedClassFile(err.to_string()),
    }
}

macro_rules! parse_primitive {
    ($typ:ty, $read:ident) => {
        impl Parse for $typ {
            fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                reader.$read::<BigEndian>().map_err(truncated)
            }
        }
    };
}

impl Parse for u8 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        reader.read_u8().map_err(truncated)
    }
}

impl Parse for i8 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        reader.read_i8().map_err(truncated)
    }
}

parse_primitive!(u16, read_u16);
parse_primitive!(u32, read_u32);
parse_primitive!(i16, read_i16);
parse_primitive!(i32, read_i32);
parse_primitive!(i64, read_i64);
parse_primitive!(f32, read_f32);
parse_primitive!(f64, read_f64);

/// Size in `u16` is the first thing deserialized
impl<A: Parse> Parse for Vec<A> {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u16::parse(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::parse(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
pub fn parse_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>, Error> {
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes).map_err(truncated)?;
    Ok(bytes)
}
