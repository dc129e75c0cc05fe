use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Encode a construct in class file format: big-endian, with `u8` tags and `u16` counts
pub trait Serialize: Sized {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

macro_rules! serialize_primitive {
    ($typ:ty, $write:ident) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }
    };
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

serialize_primitive!(u16, write_u16);
serialize_primitive!(u32, write_u32);
serialize_primitive!(i16, write_i16);
serialize_primitive!(i32, write_i32);
serialize_primitive!(i64, write_i64);
serialize_primitive!(f32, write_f32);
serialize_primitive!(f64, write_f64);

/// Prefixed by a `u16` count, so at most 65535 elements fit
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let count = u16::try_from(self.len()).map_err(|_| {
            let msg = format!("{} elements do not fit in a u16 count", self.len());
            Error::new(ErrorKind::InvalidInput, msg)
        })?;
        count.serialize(writer)?;
        self.iter().try_for_each(|elem| elem.serialize(writer))
    }
}

/// Raw bytes, without any length prefix
pub fn serialize_bytes<W: WriteBytesExt>(bytes: &[u8], writer: &mut W) -> Result<()> {
    writer.write_all(bytes)
}
