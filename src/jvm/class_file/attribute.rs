use super::parse::{parse_bytes, Parse};
use super::serialize::{serialize_bytes, Serialize};
use crate::jvm::code::{Code, Label};
use crate::jvm::verifier::SerializedType;
use crate::jvm::{ConstantPool, Error, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Attributes (used in classes, fields, methods)
///
/// Only the `Code` attribute of methods gets decoded. Everything else is carried through as the
/// exact bytes it was parsed from.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub body: AttributeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBody {
    Code(Code),
    Opaque(Vec<u8>),
}

impl Attribute {
    /// Read the name and raw info bytes of an attribute
    pub fn parse_raw<R: ReadBytesExt>(reader: &mut R) -> Result<(Utf8ConstantIndex, Vec<u8>), Error> {
        let name_index = Utf8ConstantIndex::parse(reader)?;
        let len = u32::parse(reader)?;
        let info = parse_bytes(reader, len as usize)?;
        Ok((name_index, info))
    }

    /// Parse a list of attributes, decoding `Code` if `decode_code` is set
    pub fn parse_list<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantPool,
        decode_code: bool,
    ) -> Result<Vec<Attribute>, Error> {
        let count = u16::parse(reader)?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (name_index, info) = Attribute::parse_raw(reader)?;
            let body = if decode_code && constants.get_utf8(name_index)? == Code::NAME {
                AttributeBody::Code(Code::parse(&info, constants)?)
            } else {
                AttributeBody::Opaque(info)
            };
            attributes.push(Attribute { name_index, body });
        }
        Ok(attributes)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        match &self.body {
            AttributeBody::Opaque(info) => {
                // Attribute info length is 4 bytes
                (info.len() as u32).serialize(writer)?;
                serialize_bytes(info, writer)?;
            }
            AttributeBody::Code(code) => {
                let mut info = vec![];
                code.serialize(&mut info)?;
                (info.len() as u32).serialize(writer)?;
                serialize_bytes(&info, writer)?;
            }
        }
        Ok(())
    }
}

/// Attribute nested inside a `Code` attribute
///
/// Attributes that refer to bytecode offsets are decoded with labels so that they follow the
/// instructions when the code gets laid out differently. If one of them can't be decoded that way
/// (eg. an offset that isn't on an instruction boundary), it stays opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub name_index: Utf8ConstantIndex,
    pub body: CodeAttributeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodeAttributeBody {
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    LocalVariableTypeTable(Vec<LocalVariable>),
    StackMapTable(StackMapTable),
    Opaque(Vec<u8>),
}

impl CodeAttribute {
    pub const LINE_NUMBER_TABLE: &'static str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &'static str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &'static str = "LocalVariableTypeTable";
    pub const STACK_MAP_TABLE: &'static str = "StackMapTable";

    /// Opaque attributes that are known to contain bytecode offsets
    pub const OFFSET_SENSITIVE: [&'static str; 6] = [
        CodeAttribute::LINE_NUMBER_TABLE,
        CodeAttribute::LOCAL_VARIABLE_TABLE,
        CodeAttribute::LOCAL_VARIABLE_TYPE_TABLE,
        CodeAttribute::STACK_MAP_TABLE,
        "RuntimeVisibleTypeAnnotations",
        "RuntimeInvisibleTypeAnnotations",
    ];

    /// Decode an attribute, given the offsets of all instructions (plus the end of the code)
    pub fn parse(
        name_index: Utf8ConstantIndex,
        info: Vec<u8>,
        constants: &ConstantPool,
        offsets: &[u32],
    ) -> Result<CodeAttribute, Error> {
        let name = constants.get_utf8(name_index)?;
        let mut reader = Cursor::new(&info[..]);
        let decoded = match name {
            CodeAttribute::LINE_NUMBER_TABLE => {
                parse_line_numbers(&mut reader, offsets).map(CodeAttributeBody::LineNumberTable)
            }
            CodeAttribute::LOCAL_VARIABLE_TABLE => parse_local_variables(&mut reader, offsets)
                .map(CodeAttributeBody::LocalVariableTable),
            CodeAttribute::LOCAL_VARIABLE_TYPE_TABLE => {
                parse_local_variables(&mut reader, offsets)
                    .map(CodeAttributeBody::LocalVariableTypeTable)
            }
            _ => None,
        };
        let body = match decoded {
            Some(body) if reader.position() as usize == info.len() => body,
            _ => CodeAttributeBody::Opaque(info),
        };
        Ok(CodeAttribute { name_index, body })
    }

    /// Write the attribute out, given the offsets of all instructions (plus the end of the code)
    pub fn serialize_with_offsets<W: WriteBytesExt>(
        &self,
        offsets: &[u32],
        writer: &mut W,
    ) -> std::io::Result<()> {
        let mut info: Vec<u8> = vec![];
        match &self.body {
            CodeAttributeBody::Opaque(bytes) => info.extend_from_slice(bytes),
            CodeAttributeBody::StackMapTable(table) => table.serialize(&mut info)?,
            CodeAttributeBody::LineNumberTable(lines) => {
                (lines.len() as u16).serialize(&mut info)?;
                for line in lines {
                    (offsets[line.start.0] as u16).serialize(&mut info)?;
                    line.line_number.serialize(&mut info)?;
                }
            }
            CodeAttributeBody::LocalVariableTable(locals)
            | CodeAttributeBody::LocalVariableTypeTable(locals) => {
                (locals.len() as u16).serialize(&mut info)?;
                for local in locals {
                    let start = offsets[local.start.0];
                    let end = offsets[local.end.0];
                    (start as u16).serialize(&mut info)?;
                    ((end - start) as u16).serialize(&mut info)?;
                    local.name_index.serialize(&mut info)?;
                    local.descriptor_index.serialize(&mut info)?;
                    local.index.serialize(&mut info)?;
                }
            }
        }
        self.name_index.serialize(writer)?;
        (info.len() as u32).serialize(writer)?;
        serialize_bytes(&info, writer)
    }
}

/// Find the label of an instruction starting at `offset` (or the end of the code, if allowed)
fn label_at(offsets: &[u32], offset: u32, allow_end: bool) -> Option<Label> {
    match offsets.binary_search(&offset) {
        Ok(idx) if idx + 1 < offsets.len() || allow_end => Some(Label(idx)),
        _ => None,
    }
}

fn parse_line_numbers<R: ReadBytesExt>(reader: &mut R, offsets: &[u32]) -> Option<Vec<LineNumber>> {
    let count = u16::parse(reader).ok()?;
    let mut lines = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = u16::parse(reader).ok()?;
        let line_number = u16::parse(reader).ok()?;
        lines.push(LineNumber {
            start: label_at(offsets, start_pc as u32, false)?,
            line_number,
        });
    }
    Some(lines)
}

fn parse_local_variables<R: ReadBytesExt>(
    reader: &mut R,
    offsets: &[u32],
) -> Option<Vec<LocalVariable>> {
    let count = u16::parse(reader).ok()?;
    let mut locals = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = u16::parse(reader).ok()? as u32;
        let length = u16::parse(reader).ok()? as u32;
        locals.push(LocalVariable {
            start: label_at(offsets, start_pc, true)?,
            end: label_at(offsets, start_pc + length, true)?,
            name_index: Utf8ConstantIndex::parse(reader).ok()?,
            descriptor_index: Utf8ConstantIndex::parse(reader).ok()?,
            index: u16::parse(reader).ok()?,
        });
    }
    Some(locals)
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start: Label,
    pub line_number: u16,
}

/// Entry of a `LocalVariableTable` or `LocalVariableTypeTable`
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: Label,

    /// Exclusive end of the range where the variable has a value
    pub end: Label,

    pub name_index: Utf8ConstantIndex,

    /// Descriptor (or signature, in a `LocalVariableTypeTable`)
    pub descriptor_index: Utf8ConstantIndex,

    pub index: u16,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for StackMapTable {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Vec::<StackMapFrame>::parse(reader).map(StackMapTable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: SerializedType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<SerializedType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<SerializedType>,
        stack: Vec<SerializedType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                assert!(
                    0 < *chopped_k && *chopped_k < 4,
                    "ChopLocalsNoStack chops 1-3 locals"
                );
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                assert!(
                    0 < added_k && added_k < 4,
                    "AppendLocalsNoStack adds 1-3 locals"
                );
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for StackMapFrame {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let tag = u8::parse(reader)?;
        Ok(match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: tag as u16 - 64,
                stack: SerializedType::parse(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::parse(reader)?,
                stack: SerializedType::parse(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::parse(reader)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::parse(reader)?,
            },
            252..=254 => {
                let offset_delta = u16::parse(reader)?;
                let mut locals = vec![];
                for _ in 0..(tag - 251) {
                    locals.push(SerializedType::parse(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: u16::parse(reader)?,
                locals: Vec::<SerializedType>::parse(reader)?,
                stack: Vec::<SerializedType>::parse(reader)?,
            },
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "reserved stack map frame type {}",
                    other
                )))
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::verifier::VerificationType;
    use crate::jvm::{ClassConstantIndex, ConstantIndex};

    #[test]
    fn frame_encodings() {
        let string = VerificationType::Object(ClassConstantIndex(ConstantIndex(4)));
        let table = StackMapTable(vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 5 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 300 },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 2,
                stack: string,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 1,
                chopped_k: 2,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 0,
                locals: vec![VerificationType::Integer, VerificationType::Long],
            },
            StackMapFrame::Full {
                offset_delta: 9,
                locals: vec![VerificationType::Top],
                stack: vec![VerificationType::Uninitialized(12)],
            },
        ]);

        let mut bytes = vec![];
        table.serialize(&mut bytes).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, 6, // six frames
                5, // same
                251, 1, 44, // same_frame_extended
                66, 7, 0, 4, // same_locals_1_stack_item
                249, 0, 1, // chop 2
                253, 0, 0, 1, 4, // append 2
                255, 0, 9, 0, 1, 0, 0, 1, 8, 0, 12, // full
            ]
        );
        assert_eq!(StackMapTable::parse(&mut Cursor::new(bytes)).unwrap(), table);
    }

    #[test]
    fn misaligned_line_numbers_stay_opaque() {
        let mut constants = ConstantPool::new();
        let name = constants
            .intern_utf8(CodeAttribute::LINE_NUMBER_TABLE)
            .unwrap();
        let offsets = [0, 2, 3];

        let aligned = vec![0, 1, 0, 2, 0, 7];
        let attribute = CodeAttribute::parse(name, aligned, &constants, &offsets).unwrap();
        assert_eq!(
            attribute.body,
            CodeAttributeBody::LineNumberTable(vec![LineNumber {
                start: Label(1),
                line_number: 7
            }])
        );

        let misaligned = vec![0, 1, 0, 1, 0, 7];
        let attribute = CodeAttribute::parse(name, misaligned.clone(), &constants, &offsets).unwrap();
        assert_eq!(attribute.body, CodeAttributeBody::Opaque(misaligned));
    }
}
