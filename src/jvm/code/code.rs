use super::{decode_instructions, Instruction, Label};
use crate::jvm::class_file::{
    parse_bytes, Attribute, CodeAttribute, CodeAttributeBody, Parse, Serialize, StackMapTable,
};
use crate::jvm::{ClassConstantIndex, ConstantIndex, ConstantPool, Error};
use byteorder::WriteBytesExt;
use std::io::Cursor;

/// Decoded `Code` attribute of a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,

    /// Offset of every instruction when the code was parsed, plus the code length at the end
    pub source_offsets: Vec<u32>,

    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start: Label,

    /// End of exception handler range (exclusive)
    pub end: Label,

    /// Start of the exception handler
    pub handler: Label,

    /// Type of exception caught (`None` catches everything, eg. for `finally`)
    pub catch_type: Option<ClassConstantIndex>,
}

impl Code {
    pub const NAME: &'static str = "Code";

    /// Decode the info bytes of a `Code` attribute
    pub fn parse(info: &[u8], constants: &ConstantPool) -> Result<Code, Error> {
        let mut reader = Cursor::new(info);
        let max_stack = u16::parse(&mut reader)?;
        let max_locals = u16::parse(&mut reader)?;
        let code_length = u32::parse(&mut reader)?;
        if code_length == 0 || code_length > u16::MAX as u32 {
            return Err(Error::MalformedClassFile(format!(
                "invalid code length {}",
                code_length
            )));
        }
        let code_bytes = parse_bytes(&mut reader, code_length as usize)?;
        let (instructions, offsets) = decode_instructions(&code_bytes)?;

        let handler_count = u16::parse(&mut reader)?;
        let mut exception_table = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            let start = exact_label(&offsets, u16::parse(&mut reader)?, false)?;
            let end = exact_label(&offsets, u16::parse(&mut reader)?, true)?;
            let handler = exact_label(&offsets, u16::parse(&mut reader)?, false)?;
            let catch_type = match ClassConstantIndex::parse(&mut reader)? {
                ClassConstantIndex(ConstantIndex(0)) => None,
                idx => Some(idx),
            };
            exception_table.push(ExceptionHandler {
                start,
                end,
                handler,
                catch_type,
            });
        }

        let attribute_count = u16::parse(&mut reader)?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            let (name_index, info) = Attribute::parse_raw(&mut reader)?;
            attributes.push(CodeAttribute::parse(
                name_index, info, constants, &offsets,
            )?);
        }

        if reader.position() as usize != info.len() {
            return Err(Error::MalformedClassFile(String::from(
                "trailing bytes after code attribute",
            )));
        }

        Ok(Code {
            max_stack,
            max_locals,
            instructions,
            source_offsets: offsets,
            exception_table,
            attributes,
        })
    }

    /// Compute the offset of every instruction (plus the end of the code)
    pub fn layout(&self) -> Result<Vec<u32>, Error> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset: u32 = 0;
        for insn in &self.instructions {
            offsets.push(offset);
            offset += insn.encoded_len(offset);
        }
        offsets.push(offset);

        if offset > u16::MAX as u32 {
            return Err(Error::MethodCodeOverflow(offset as usize));
        }
        Ok(offsets)
    }

    /// Encode the instructions, checking every jump still fits in its encoding
    pub fn assemble(&self) -> Result<(Vec<u32>, Vec<u8>), Error> {
        let offsets = self.layout()?;
        let mut bytes = Vec::with_capacity(*offsets.last().unwrap_or(&0) as usize);
        for (insn, offset) in self.instructions.iter().zip(&offsets) {
            insn.encode(*offset, &offsets, &mut bytes)?;
        }
        Ok((offsets, bytes))
    }

    /// Find a nested attribute by name
    pub fn attribute(&self, name: &str, constants: &ConstantPool) -> Option<&CodeAttribute> {
        self.attributes
            .iter()
            .find(|attr| constants.get_utf8(attr.name_index).ok() == Some(name))
    }

    /// Drop opaque attributes whose bytecode offsets would be stale under a new layout
    ///
    /// Returns the names of the attributes that were dropped.
    pub fn drop_offset_sensitive_attributes(&mut self, constants: &ConstantPool) -> Vec<String> {
        let mut dropped = vec![];
        self.attributes.retain(|attr| {
            let name = constants.get_utf8(attr.name_index).unwrap_or("");
            let stale = matches!(attr.body, CodeAttributeBody::Opaque(_))
                && CodeAttribute::OFFSET_SENSITIVE.contains(&name);
            if stale {
                dropped.push(name.to_owned());
            }
            !stale
        });
        dropped
    }

    /// Install a stack map table, replacing any previous one
    pub fn set_stack_map_table(
        &mut self,
        table: StackMapTable,
        constants: &mut ConstantPool,
    ) -> Result<(), Error> {
        let name_index = constants.intern_utf8(CodeAttribute::STACK_MAP_TABLE)?;
        self.attributes.retain(|attr| attr.name_index != name_index);
        if !table.0.is_empty() {
            self.attributes.push(CodeAttribute {
                name_index,
                body: CodeAttributeBody::StackMapTable(table),
            });
        }
        Ok(())
    }
}

fn exact_label(offsets: &[u32], offset: u16, allow_end: bool) -> Result<Label, Error> {
    match offsets.binary_search(&(offset as u32)) {
        Ok(idx) if idx + 1 < offsets.len() || allow_end => Ok(Label(idx)),
        _ => Err(Error::MalformedClassFile(format!(
            "exception table refers to offset {} which is not an instruction",
            offset
        ))),
    }
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let (offsets, bytes) = self
            .assemble()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;

        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (bytes.len() as u32).serialize(writer)?;
        writer.write_all(&bytes)?;

        (self.exception_table.len() as u16).serialize(writer)?;
        for handler in &self.exception_table {
            (offsets[handler.start.0] as u16).serialize(writer)?;
            (offsets[handler.end.0] as u16).serialize(writer)?;
            (offsets[handler.handler.0] as u16).serialize(writer)?;
            match handler.catch_type {
                Some(catch_type) => catch_type.serialize(writer)?,
                None => 0u16.serialize(writer)?,
            }
        }

        (self.attributes.len() as u16).serialize(writer)?;
        for attribute in &self.attributes {
            attribute.serialize_with_offsets(&offsets, writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;
    use crate::jvm::class_file::{LineNumber, LocalVariable};

    /// `static String f(boolean b) { return b ? "a" : "b"; }` with line and local variable tables
    fn sample_code(constants: &mut ConstantPool) -> Vec<u8> {
        let lines = constants.intern_utf8("LineNumberTable").unwrap();
        let locals = constants.intern_utf8("LocalVariableTable").unwrap();
        let mut info = vec![
            0, 1, // max_stack
            0, 1, // max_locals
            0, 0, 0, 12, // code_length
            0x1a, // 0: iload_0
            0x99, 0x00, 0x08, // 1: ifeq +8 -> 9
            0x12, 0x02, // 4: ldc #2
            0xa7, 0x00, 0x05, // 6: goto +5 -> 11
            0x12, 0x03, // 9: ldc #3
            0xb0, // 11: areturn
        ];
        info.extend_from_slice(&[0, 0]); // no exception handlers
        info.extend_from_slice(&[0, 2]); // two attributes
        info.extend_from_slice(&[0, lines.0 .0 as u8, 0, 0, 0, 10, 0, 2, 0, 0, 0, 1, 0, 9, 0, 2]);
        info.extend_from_slice(&[
            0, locals.0 .0 as u8, 0, 0, 0, 12, 0, 1, 0, 0, 0, 12, 0, 1, 0, 1, 0, 0,
        ]);
        info
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let mut constants = ConstantPool::new();
        let info = sample_code(&mut constants);
        let code = Code::parse(&info, &constants).unwrap();
        assert_eq!(code.instructions.len(), 6);
        assert_eq!(code.source_offsets, vec![0, 1, 4, 6, 9, 11, 12]);

        let mut out = vec![];
        code.serialize(&mut out).unwrap();
        assert_eq!(out, info);
    }

    #[test]
    fn widening_relocates_debug_tables() {
        let mut constants = ConstantPool::new();
        let info = sample_code(&mut constants);
        let mut code = Code::parse(&info, &constants).unwrap();
        code.instructions[2] = Instruction::Ldc {
            index: ConstantIndex(400),
            wide: false,
        };

        let offsets = code.layout().unwrap();
        assert_eq!(offsets, vec![0, 1, 4, 7, 10, 12, 13]);
        assert_eq!(
            code.instructions[1],
            Instruction::Branch {
                opcode: IFEQ,
                target: Label(4)
            }
        );

        let mut out = vec![];
        code.serialize(&mut out).unwrap();
        let reparsed = Code::parse(&out, &constants).unwrap();
        assert_eq!(
            reparsed.instructions[2],
            Instruction::Ldc {
                index: ConstantIndex(400),
                wide: true,
            }
        );
        assert_eq!(reparsed.instructions[..2], code.instructions[..2]);
        assert_eq!(reparsed.instructions[3..], code.instructions[3..]);
        assert_eq!(
            reparsed.attributes[0].body,
            CodeAttributeBody::LineNumberTable(vec![
                LineNumber {
                    start: Label(0),
                    line_number: 1
                },
                LineNumber {
                    start: Label(4),
                    line_number: 2
                },
            ])
        );
        match &reparsed.attributes[1].body {
            CodeAttributeBody::LocalVariableTable(locals) => {
                assert_eq!(
                    locals[0],
                    LocalVariable {
                        start: Label(0),
                        end: Label(6),
                        name_index: crate::jvm::Utf8ConstantIndex(ConstantIndex(1)),
                        descriptor_index: crate::jvm::Utf8ConstantIndex(ConstantIndex(1)),
                        index: 0,
                    }
                );
            }
            other => panic!("expected local variable table, got {:?}", other),
        }
        assert_eq!(reparsed.source_offsets, offsets);
    }

    #[test]
    fn jump_out_of_range() {
        let mut instructions = vec![Instruction::Branch {
            opcode: GOTO,
            target: Label(2),
        }];
        instructions.push(Instruction::TableSwitch {
            default: Label(2),
            low: 0,
            targets: vec![Label(2); 9000],
        });
        instructions.push(Instruction::Simple(RETURN));
        let code = Code {
            max_stack: 1,
            max_locals: 0,
            instructions,
            source_offsets: vec![],
            exception_table: vec![],
            attributes: vec![],
        };
        assert!(matches!(
            code.assemble(),
            Err(Error::JumpOutOfRange { offset: 0, .. })
        ));
    }
}
