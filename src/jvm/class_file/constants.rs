use super::parse::{parse_bytes, Parse};
use super::serialize::{serialize_bytes, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fmt;

/// Class file constant pool
///
/// Entries keep the exact order (and duplicates) they were parsed with. New entries are only ever
/// appended, so every index handed out stays valid for the lifetime of the pool. The `intern_*`
/// methods deduplicate against everything already present, parsed entries included.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<String, Utf8ConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
}

impl ConstantPool {
    /// Make a fresh empty constant pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::starting_at(Offset(1)),
            utf8s: HashMap::new(),
            strings: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    /// Value of `constant_pool_count` (one more than the largest valid index)
    pub fn count(&self) -> u16 {
        self.constants.next_offset().0 as u16
    }

    /// Number of entries (not slots) in the pool
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// spaces.
    pub fn push(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset: u16 = self.constants.next_offset().0 as u16;

        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        let index = ConstantIndex(offset);
        match &constant {
            Constant::Utf8(text) => {
                self.utf8s
                    .entry(text.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings
                    .entry(*utf8)
                    .or_insert(StringConstantIndex(index));
            }
            Constant::Class(utf8) => {
                self.classes
                    .entry(*utf8)
                    .or_insert(ClassConstantIndex(index));
            }
            _ => (),
        }

        self.constants.push(constant);
        Ok(index)
    }

    /// Look up a constant by index
    pub fn get(&self, index: impl Into<ConstantIndex>) -> Option<&Constant> {
        let index: ConstantIndex = index.into();
        self.constants.get(Offset(index.0 as usize))
    }

    /// Iterate over constants, along with their index
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Find an existing UTF-8 constant with exactly this text
    pub fn lookup_utf8(&self, text: &str) -> Option<Utf8ConstantIndex> {
        self.utf8s.get(text).copied()
    }

    /// Get or insert a UTF-8 constant
    pub fn intern_utf8(&mut self, text: &str) -> Result<Utf8ConstantIndex, Error> {
        if let Some(idx) = self.lookup_utf8(text) {
            return Ok(idx);
        }
        let encoded_len = modified_utf8_len(text);
        if encoded_len > u16::MAX as usize {
            return Err(Error::Utf8ConstantTooLong(encoded_len));
        }
        let idx = self.push(Constant::Utf8(text.to_owned()))?;
        Ok(Utf8ConstantIndex(idx))
    }

    /// Get or insert a string constant pointing at the given UTF-8 constant
    pub fn intern_string(
        &mut self,
        utf8: Utf8ConstantIndex,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.strings.get(&utf8) {
            return Ok(*idx);
        }
        self.push(Constant::String(utf8)).map(StringConstantIndex)
    }

    /// Get or insert a class constant for an internal class name (or array descriptor)
    pub fn intern_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let utf8 = self.intern_utf8(name)?;
        if let Some(idx) = self.classes.get(&utf8) {
            return Ok(*idx);
        }
        Ok(ClassConstantIndex(self.push(Constant::Class(utf8))?))
    }

    /// Text of a UTF-8 constant
    pub fn get_utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index) {
            Some(Constant::Utf8(text)) => Ok(text),
            Some(Constant::InvalidUtf8(_)) => Err(Error::MalformedClassFile(format!(
                "constant #{} is not valid modified UTF-8",
                index.0 .0
            ))),
            _ => Err(Error::MalformedClassFile(format!(
                "constant #{} is not a UTF-8 constant",
                index.0 .0
            ))),
        }
    }

    /// Name of the class referred to by a class constant
    pub fn get_class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.get_utf8(*name),
            _ => Err(Error::MalformedClassFile(format!(
                "constant #{} is not a class constant",
                index.0 .0
            ))),
        }
    }

    /// If the index points at a string constant with decodable text, return that text
    pub fn get_string(&self, index: ConstantIndex) -> Option<&str> {
        match self.get(index) {
            Some(Constant::String(utf8)) => match self.get(*utf8) {
                Some(Constant::Utf8(text)) => Some(text),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.constants == other.constants
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.count().serialize(writer)?;
        for (_, constant) in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Parse for ConstantPool {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::parse(reader)?;
        let mut pool = ConstantPool::new();
        while pool.count() < count {
            let constant = Constant::parse(reader)?;
            if pool.count() as usize + constant.width() > count as usize {
                return Err(Error::MalformedClassFile(String::from(
                    "last constant pool entry overruns the pool",
                )));
            }
            pool.push(constant)?;
        }
        Ok(pool)
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: u16,
}

impl fmt::Display for ConstantPoolOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no room for {:?} at constant #{}", self.constant, self.offset)
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// UTF-8 constant whose bytes don't decode to a Rust string (eg. lone surrogates)
    ///
    /// These are carried through byte for byte and never matched against anything.
    InvalidUtf8(Vec<u8>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    const UTF8: u8 = 1;
    const INTEGER: u8 = 3;
    const FLOAT: u8 = 4;
    const LONG: u8 = 5;
    const DOUBLE: u8 = 6;
    const CLASS: u8 = 7;
    const STRING: u8 = 8;
    const FIELD_REF: u8 = 9;
    const METHOD_REF: u8 = 10;
    const INTERFACE_METHOD_REF: u8 = 11;
    const NAME_AND_TYPE: u8 = 12;
    const METHOD_HANDLE: u8 = 15;
    const METHOD_TYPE: u8 = 16;
    const DYNAMIC: u8 = 17;
    const INVOKE_DYNAMIC: u8 = 18;
    const MODULE: u8 = 19;
    const PACKAGE: u8 = 20;

    /// Tag of the `cp_info` structure
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) | Constant::InvalidUtf8(_) => Self::UTF8,
            Constant::Integer(_) => Self::INTEGER,
            Constant::Float(_) => Self::FLOAT,
            Constant::Long(_) => Self::LONG,
            Constant::Double(_) => Self::DOUBLE,
            Constant::Class(_) => Self::CLASS,
            Constant::String(_) => Self::STRING,
            Constant::FieldRef(..) => Self::FIELD_REF,
            Constant::MethodRef { is_interface: false, .. } => Self::METHOD_REF,
            Constant::MethodRef { is_interface: true, .. } => Self::INTERFACE_METHOD_REF,
            Constant::NameAndType { .. } => Self::NAME_AND_TYPE,
            Constant::MethodHandle { .. } => Self::METHOD_HANDLE,
            Constant::MethodType { .. } => Self::METHOD_TYPE,
            Constant::Dynamic { .. } => Self::DYNAMIC,
            Constant::InvokeDynamic { .. } => Self::INVOKE_DYNAMIC,
            Constant::Module(_) => Self::MODULE,
            Constant::Package(_) => Self::PACKAGE,
        }
    }
}

fn serialize_utf8_bytes<W: WriteBytesExt>(bytes: &[u8], writer: &mut W) -> std::io::Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        let msg = format!("UTF-8 constant of {} bytes is too long", bytes.len());
        std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)
    })?;
    len.serialize(writer)?;
    serialize_bytes(bytes, writer)
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(text) => serialize_utf8_bytes(&encode_modified_utf8(text), writer),
            Constant::InvalidUtf8(bytes) => serialize_utf8_bytes(bytes, writer),
            Constant::Integer(value) => value.serialize(writer),
            Constant::Float(value) => value.serialize(writer),
            Constant::Long(value) => value.serialize(writer),
            Constant::Double(value) => value.serialize(writer),
            Constant::Class(utf8)
            | Constant::String(utf8)
            | Constant::MethodType { descriptor: utf8 }
            | Constant::Module(utf8)
            | Constant::Package(utf8) => utf8.serialize(writer),
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)
            }
            Constant::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.serialize(writer)?;
                member.serialize(writer)
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor: name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)
            }
        }
    }
}

impl Parse for Constant {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let tag = u8::parse(reader)?;
        let constant = match tag {
            Constant::UTF8 => {
                let len = u16::parse(reader)?;
                let bytes = parse_bytes(reader, len as usize)?;
                match decode_modified_utf8(&bytes) {
                    Some(text) => Constant::Utf8(text),
                    None => Constant::InvalidUtf8(bytes),
                }
            }
            Constant::INTEGER => Constant::Integer(i32::parse(reader)?),
            Constant::FLOAT => Constant::Float(f32::parse(reader)?),
            Constant::LONG => Constant::Long(i64::parse(reader)?),
            Constant::DOUBLE => Constant::Double(f64::parse(reader)?),
            Constant::CLASS => Constant::Class(Utf8ConstantIndex::parse(reader)?),
            Constant::STRING => Constant::String(Utf8ConstantIndex::parse(reader)?),
            Constant::FIELD_REF => Constant::FieldRef(
                ClassConstantIndex::parse(reader)?,
                NameAndTypeConstantIndex::parse(reader)?,
            ),
            Constant::METHOD_REF | Constant::INTERFACE_METHOD_REF => Constant::MethodRef {
                class: ClassConstantIndex::parse(reader)?,
                name_and_type: NameAndTypeConstantIndex::parse(reader)?,
                is_interface: tag == Constant::INTERFACE_METHOD_REF,
            },
            Constant::NAME_AND_TYPE => Constant::NameAndType {
                name: Utf8ConstantIndex::parse(reader)?,
                descriptor: Utf8ConstantIndex::parse(reader)?,
            },
            Constant::METHOD_HANDLE => Constant::MethodHandle {
                handle_kind: HandleKind::parse(reader)?,
                member: ConstantIndex::parse(reader)?,
            },
            Constant::METHOD_TYPE => Constant::MethodType {
                descriptor: Utf8ConstantIndex::parse(reader)?,
            },
            Constant::DYNAMIC => Constant::Dynamic {
                bootstrap_method: u16::parse(reader)?,
                name_and_type: NameAndTypeConstantIndex::parse(reader)?,
            },
            Constant::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap_method: u16::parse(reader)?,
                method_descriptor: NameAndTypeConstantIndex::parse(reader)?,
            },
            Constant::MODULE => Constant::Module(Utf8ConstantIndex::parse(reader)?),
            Constant::PACKAGE => Constant::Package(Utf8ConstantIndex::parse(reader)?),
            other => {
                let msg = format!("unknown constant pool tag {}", other);
                return Err(Error::MalformedClassFile(msg));
            }
        };
        Ok(constant)
    }
}

/// Number of bytes `text` takes up once encoded with [`encode_modified_utf8`]
pub fn modified_utf8_len(text: &str) -> usize {
    text.encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Returns `None` if the bytes are not well-formed or if the UTF-16 units they describe contain
/// unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        let first = bytes[idx] as u16;
        match bytes[idx] {
            0x01..=0x7F => {
                units.push(first);
                idx += 1;
            }
            0xC0..=0xDF => {
                let second = continuation(bytes.get(idx + 1))?;
                units.push((first & 0x1F) << 6 | second);
                idx += 2;
            }
            0xE0..=0xEF => {
                let second = continuation(bytes.get(idx + 1))?;
                let third = continuation(bytes.get(idx + 2))?;
                units.push((first & 0x0F) << 12 | second << 6 | third);
                idx += 3;
            }
            _ => return None,
        }
    }
    String::from_utf16(&units).ok()
}

fn continuation(byte: Option<&u8>) -> Option<u16> {
    match byte {
        Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((*b & 0x3F) as u16),
        _ => None,
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

macro_rules! typed_index {
    ($typ:ident) => {
        impl From<$typ> for ConstantIndex {
            fn from(index: $typ) -> ConstantIndex {
                index.0
            }
        }

        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Parse for $typ {
            fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                ConstantIndex::parse(reader).map($typ)
            }
        }
    };
}

typed_index!(Utf8ConstantIndex);
typed_index!(StringConstantIndex);
typed_index!(NameAndTypeConstantIndex);
typed_index!(ClassConstantIndex);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for ConstantIndex {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        u16::parse(reader).map(ConstantIndex)
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// `reference_kind` of a method handle ([JVMS 5.4.3.5][0])
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    const ALL: [HandleKind; 9] = [
        HandleKind::GetField,
        HandleKind::GetStatic,
        HandleKind::PutField,
        HandleKind::PutStatic,
        HandleKind::InvokeVirtual,
        HandleKind::InvokeStatic,
        HandleKind::InvokeSpecial,
        HandleKind::NewInvokeSpecial,
        HandleKind::InvokeInterface,
    ];
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (*self as u8).serialize(writer)
    }
}

impl Parse for HandleKind {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = u8::parse(reader)?;
        HandleKind::ALL
            .into_iter()
            .find(|handle| *handle as u8 == kind)
            .ok_or_else(|| Error::MalformedClassFile(format!("invalid method handle kind {}", kind)))
    }
}
