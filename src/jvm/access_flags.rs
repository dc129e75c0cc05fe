use super::class_file::{Parse, Serialize};
use super::Error;
use bitflags::bitflags;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

/// Flags are carried through bit for bit, including bits we have no name for
macro_rules! access_flags_binary_format {
    ($flags:ty) => {
        impl Serialize for $flags {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                self.bits().serialize(writer)
            }
        }

        impl Parse for $flags {
            fn parse<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
                u16::parse(reader).map(<$flags>::from_bits_retain)
            }
        }
    };
}

access_flags_binary_format!(ClassAccessFlags);
access_flags_binary_format!(MethodAccessFlags);
access_flags_binary_format!(FieldAccessFlags);

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unknown_bits_survive() {
        let mut cursor = Cursor::new(vec![0x00, 0x29]);
        let flags = ClassAccessFlags::parse(&mut cursor).unwrap();
        assert!(flags.contains(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER));

        let mut out = vec![];
        flags.serialize(&mut out).unwrap();
        assert_eq!(out, vec![0x00, 0x29]);
    }
}
