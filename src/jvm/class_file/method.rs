use crate::jvm::class_file::{Attribute, AttributeBody, Parse, Serialize};
use crate::jvm::code::Code;
use crate::jvm::{ConstantPool, Error, MethodAccessFlags, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn parse<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantPool,
    ) -> Result<Method, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            attributes: Attribute::parse_list(reader, constants, true)?,
        })
    }

    pub fn name<'a>(&self, constants: &'a ConstantPool) -> Result<&'a str, Error> {
        constants.get_utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, constants: &'a ConstantPool) -> Result<&'a str, Error> {
        constants.get_utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Method body (abstract and native methods have none)
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|attr| match &attr.body {
            AttributeBody::Code(code) => Some(code),
            AttributeBody::Opaque(_) => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.attributes.iter_mut().find_map(|attr| match &mut attr.body {
            AttributeBody::Code(code) => Some(code),
            AttributeBody::Opaque(_) => None,
        })
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
