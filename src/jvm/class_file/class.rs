use super::{Attribute, ConstantPool, Field, Method, Parse, Serialize, Version};
use crate::jvm::{ClassAccessFlags, ClassConstantIndex, Constant, ConstantIndex, Error};
use byteorder::WriteBytesExt;
use std::io::Cursor;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` (and `module-info`) have no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub const MAGIC: u32 = 0xCAFEBABE;

    /// Decode a class file
    ///
    /// Anything that does not start with the magic number is [`Error::NotAClassFile`], anything
    /// that does but then fails to decode is [`Error::MalformedClassFile`].
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        if bytes.len() < 4 || bytes[0..4] != ClassFile::MAGIC.to_be_bytes() {
            return Err(Error::NotAClassFile);
        }
        let mut reader = Cursor::new(bytes);
        reader.set_position(4);

        let version = Version::parse(&mut reader)?;
        let constants = ConstantPool::parse(&mut reader)?;
        let access_flags = ClassAccessFlags::parse(&mut reader)?;

        let this_class = ClassConstantIndex::parse(&mut reader)?;
        check_class(&constants, this_class, "this_class")?;
        let super_class = match ClassConstantIndex::parse(&mut reader)? {
            ClassConstantIndex(ConstantIndex(0)) => None,
            idx => {
                check_class(&constants, idx, "super_class")?;
                Some(idx)
            }
        };
        let interfaces = Vec::<ClassConstantIndex>::parse(&mut reader)?;
        for interface in &interfaces {
            check_class(&constants, *interface, "interface")?;
        }

        let field_count = u16::parse(&mut reader)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(Field::parse(&mut reader, &constants)?);
        }

        let method_count = u16::parse(&mut reader)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(Method::parse(&mut reader, &constants)?);
        }

        let attributes = Attribute::parse_list(&mut reader, &constants, false)?;

        if reader.position() as usize != bytes.len() {
            return Err(Error::MalformedClassFile(format!(
                "{} trailing bytes after class file",
                bytes.len() - reader.position() as usize
            )));
        }

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Encode the class file
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Binary name of the class
    pub fn name(&self) -> Result<&str, Error> {
        self.constants.get_class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<&str>, Error> {
        self.super_class
            .map(|idx| self.constants.get_class_name(idx))
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, Error> {
        self.interfaces
            .iter()
            .map(|idx| self.constants.get_class_name(*idx))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

fn check_class(
    constants: &ConstantPool,
    index: ClassConstantIndex,
    what: &str,
) -> Result<(), Error> {
    match constants.get(index) {
        Some(Constant::Class(_)) => Ok(()),
        _ => Err(Error::MalformedClassFile(format!(
            "{} #{} is not a class constant",
            what, (index.0).0
        ))),
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        ClassFile::MAGIC.serialize(writer)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    fn tiny_class() -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        // constant pool: #1 Utf8 "A", #2 Class #1, #3 Utf8 "java/lang/Object", #4 Class #3,
        // #5 Utf8 "m", #6 Utf8 "()V", #7 Utf8 "Code"
        bytes.extend([0, 8]);
        bytes.extend([1, 0, 1, b'A']);
        bytes.extend([7, 0, 1]);
        bytes.extend([1, 0, 16]);
        bytes.extend(b"java/lang/Object");
        bytes.extend([7, 0, 3]);
        bytes.extend([1, 0, 1, b'm']);
        bytes.extend([1, 0, 3, b'(', b')', b'V']);
        bytes.extend([1, 0, 4, b'C', b'o', b'd', b'e']);
        // flags, this, super, no interfaces, no fields
        bytes.extend([0, 0x21, 0, 2, 0, 4, 0, 0, 0, 0]);
        // one static method with a `return` body
        bytes.extend([0, 1, 0, 0x09, 0, 5, 0, 6, 0, 1]);
        bytes.extend([0, 7, 0, 0, 0, 13, 0, 0, 0, 1, 0, 0, 0, 1, RETURN, 0, 0, 0, 0]);
        // no class attributes
        bytes.extend([0, 0]);
        bytes
    }

    #[test]
    fn parse_and_reserialize() {
        let bytes = tiny_class();
        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.name().unwrap(), "A");
        assert_eq!(class.super_name().unwrap(), Some("java/lang/Object"));
        assert_eq!(class.methods.len(), 1);
        assert!(class.methods[0].code().is_some());
        assert_eq!(class.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn not_a_class_file() {
        assert!(matches!(
            ClassFile::parse(b"PK\x03\x04"),
            Err(Error::NotAClassFile)
        ));
        assert!(matches!(ClassFile::parse(b"CA"), Err(Error::NotAClassFile)));
    }

    #[test]
    fn malformed_class_file() {
        let mut bytes = tiny_class();
        bytes.truncate(bytes.len() - 5);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::MalformedClassFile(_))
        ));

        let mut bytes = tiny_class();
        bytes.push(0);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::MalformedClassFile(_))
        ));

        // `this_class` pointing at a UTF-8 constant
        let mut bytes = tiny_class();
        let this_offset = bytes.len() - 2 - 29 - 10 + 2;
        bytes[this_offset + 1] = 1;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::MalformedClassFile(_))
        ));
    }
}
