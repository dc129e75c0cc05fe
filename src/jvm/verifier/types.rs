use crate::jvm::class_file::{Parse, Serialize};
use crate::jvm::code::Label;
use crate::jvm::{BaseType, BinaryName, ClassConstantIndex, Error, FieldType, RefType};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Types tracked by the verifier, following [its type hierarchy][0]
///
/// The same enum serves two purposes. While a method is being analysed, classes are named and
/// uninitialized objects are identified by the label of their `new`. In a `StackMapTable`,
/// classes are constant pool entries and uninitialized objects are identified by the bytecode
/// offset of their `new`.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable value (eg. a local that hasn't been written to, or the second half of a `long`)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// `this` inside a constructor, up until the superclass constructor is called
    UninitializedThis,
    Object(Cls),

    /// Result of a `new` whose constructor hasn't been called yet
    Uninitialized(U),
}

/// Verification type used while interpreting a method
pub type AnalysisType = VerificationType<RefType<BinaryName>, Label>;

/// Verification type as it appears in a `StackMapTable`
pub type SerializedType = VerificationType<ClassConstantIndex, u16>;

impl<Cls, U> VerificationType<Cls, U> {
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::UninitializedThis
                | VerificationType::Object(_)
                | VerificationType::Uninitialized(_)
        )
    }

    /// Tag of the `verification_type_info` union
    fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => 7,
            VerificationType::Uninitialized(_) => 8,
        }
    }
}

/// Values of field type `boolean`, `byte`, `char`, and `short` are all `int`s to the verifier
impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Base(_) => VerificationType::Integer,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl<Cls, U> Width for VerificationType<Cls, U> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl Serialize for SerializedType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(cls) => cls.serialize(writer),
            VerificationType::Uninitialized(offset) => offset.serialize(writer),
            _ => Ok(()),
        }
    }
}

impl Parse for SerializedType {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let vtype = match u8::parse(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::parse(reader)?),
            8 => VerificationType::Uninitialized(u16::parse(reader)?),
            tag => {
                return Err(Error::MalformedClassFile(format!(
                    "invalid verification type tag {}",
                    tag
                )))
            }
        };
        Ok(vtype)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ConstantIndex;
    use std::io::Cursor;

    #[test]
    fn field_types() {
        let boolean: AnalysisType = FieldType::Base(BaseType::Boolean).into();
        assert_eq!(boolean, VerificationType::Integer);
        let long: AnalysisType = FieldType::Base(BaseType::Long).into();
        assert_eq!(long.width(), 2);
        assert!(!long.is_reference());

        let string = FieldType::Ref(RefType::Object(BinaryName::STRING));
        let string: AnalysisType = string.into();
        assert!(string.is_reference());
        assert_eq!(string.width(), 1);
    }

    #[test]
    fn encoding() {
        let types: Vec<SerializedType> = vec![
            VerificationType::Top,
            VerificationType::Long,
            VerificationType::Object(ClassConstantIndex(ConstantIndex(0x0102))),
            VerificationType::Uninitialized(7),
        ];
        let mut bytes = vec![];
        for vtype in &types {
            vtype.serialize(&mut bytes).unwrap();
        }
        assert_eq!(bytes, vec![0, 4, 7, 0x01, 0x02, 8, 0, 7]);

        let mut reader = Cursor::new(&bytes[..]);
        for vtype in &types {
            assert_eq!(&SerializedType::parse(&mut reader).unwrap(), vtype);
        }

        let bad = SerializedType::parse(&mut Cursor::new(&[9u8][..]));
        assert!(matches!(bad, Err(Error::MalformedClassFile(_))));
    }
}
