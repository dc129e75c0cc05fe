use super::opcodes::*;
use crate::jvm::class_file::{Parse, Serialize};
use crate::jvm::{ConstantIndex, Error};
use byteorder::WriteBytesExt;
use std::io::Cursor;

/// Position of an instruction in a method's instruction list
///
/// `Label(n)` where `n` is the number of instructions denotes the end of the code (used by
/// exclusive range ends in exception tables and local variable tables).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label(pub usize);

/// Encoding used for a local variable instruction
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum LocalForm {
    /// `iload_0`, `astore_3`, ...
    Short,

    /// Opcode followed by a one byte index
    Normal,

    /// `wide` prefix followed by a two byte index
    Wide,
}

/// A decoded bytecode instruction
///
/// Branch targets are [`Label`]s rather than byte offsets, so instructions can change size (eg.
/// when an `ldc` has to become an `ldc_w`) without having to patch anything else up. Offsets only
/// get computed again when the code is laid out.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Instruction {
    /// Any instruction without operands
    Simple(u8),
    BiPush(i8),
    SiPush(i16),

    /// `ldc` or `ldc_w`
    ///
    /// `wide` records that the instruction was an `ldc_w` to begin with. An `ldc` whose index no
    /// longer fits in a byte is written out as `ldc_w` regardless.
    Ldc {
        index: ConstantIndex,
        wide: bool,
    },
    Ldc2W(ConstantIndex),

    /// Loads, stores, and `ret`
    ///
    /// `opcode` is always the long form opcode (`iload`, not `iload_1`).
    Local {
        opcode: u8,
        index: u16,
        form: LocalForm,
    },
    IInc {
        index: u16,
        delta: i16,
        wide: bool,
    },

    /// Conditional and unconditional jumps, including `jsr`, `goto_w`, and `jsr_w`
    Branch {
        opcode: u8,
        target: Label,
    },
    TableSwitch {
        default: Label,
        low: i32,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },

    /// Field access, non-interface invokes, `new`, `anewarray`, `checkcast`, `instanceof`
    ConstantRef {
        opcode: u8,
        index: ConstantIndex,
    },
    InvokeInterface {
        index: ConstantIndex,
        count: u8,
    },
    InvokeDynamic(ConstantIndex),
    NewArray(u8),
    MultiANewArray {
        index: ConstantIndex,
        dimensions: u8,
    },
}

fn is_simple(opcode: u8) -> bool {
    matches!(
        opcode,
        NOP..=DCONST_1
            | IALOAD..=SALOAD
            | IASTORE..=LXOR
            | I2L..=DCMPG
            | IRETURN..=RETURN
            | ARRAYLENGTH
            | ATHROW
            | MONITORENTER
            | MONITOREXIT
    )
}

fn is_local(opcode: u8) -> bool {
    matches!(opcode, ILOAD..=ALOAD | ISTORE..=ASTORE | RET)
}

/// Switch operands are aligned to 4 bytes from the start of the code
fn switch_padding(offset: u32) -> u32 {
    3 - (offset % 4)
}

fn malformed(msg: String) -> Error {
    Error::MalformedClassFile(msg)
}

impl Instruction {
    /// Is this an instruction that loads a constant with `ldc` or `ldc_w`?
    pub fn ldc_index(&self) -> Option<ConstantIndex> {
        match self {
            Instruction::Ldc { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Labels this instruction may jump to (not including falling through)
    pub fn jump_targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, label)| *label));
                all
            }
            _ => vec![],
        }
    }

    /// Can execution continue to the next instruction?
    pub fn falls_through(&self) -> bool {
        match self {
            Instruction::Simple(opcode) => !matches!(*opcode, IRETURN..=RETURN | ATHROW),
            Instruction::Branch { opcode, .. } => !matches!(*opcode, GOTO | GOTO_W),
            Instruction::Local { opcode, .. } => *opcode != RET,
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => false,
            _ => true,
        }
    }

    fn labels_mut(&mut self) -> Vec<&mut Label> {
        match self {
            Instruction::Branch { target, .. } => vec![target],
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![default];
                all.extend(targets.iter_mut());
                all
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut all = vec![default];
                all.extend(pairs.iter_mut().map(|(_, label)| label));
                all
            }
            _ => vec![],
        }
    }

    fn local_form(&self) -> Option<LocalForm> {
        match self {
            Instruction::Local {
                opcode,
                index,
                form,
            } => Some(match form {
                LocalForm::Wide => LocalForm::Wide,
                _ if *index > 255 => LocalForm::Wide,
                LocalForm::Short if *index <= 3 && *opcode != RET => LocalForm::Short,
                _ => LocalForm::Normal,
            }),
            _ => None,
        }
    }

    /// Number of bytes the instruction takes up when placed at the given offset
    pub fn encoded_len(&self, offset: u32) -> u32 {
        match self {
            Instruction::Simple(_) => 1,
            Instruction::BiPush(_) => 2,
            Instruction::SiPush(_) => 3,
            Instruction::Ldc { index, wide } => {
                if *wide || index.0 > 255 {
                    3
                } else {
                    2
                }
            }
            Instruction::Ldc2W(_) => 3,
            Instruction::Local { .. } => match self.local_form() {
                Some(LocalForm::Short) => 1,
                Some(LocalForm::Wide) => 4,
                _ => 2,
            },
            Instruction::IInc { index, delta, wide } => {
                if *wide || *index > 255 || i8::try_from(*delta).is_err() {
                    6
                } else {
                    3
                }
            }
            Instruction::Branch { opcode, .. } => match *opcode {
                GOTO_W | JSR_W => 5,
                _ => 3,
            },
            Instruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
            }
            Instruction::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
            }
            Instruction::ConstantRef { .. } => 3,
            Instruction::InvokeInterface { .. } | Instruction::InvokeDynamic(_) => 5,
            Instruction::NewArray(_) => 2,
            Instruction::MultiANewArray { .. } => 4,
        }
    }

    /// Write out the instruction
    ///
    /// `offsets` has the offset of every instruction in the method, plus the end of the code.
    pub fn encode<W: WriteBytesExt>(
        &self,
        offset: u32,
        offsets: &[u32],
        writer: &mut W,
    ) -> Result<(), Error> {
        let relative = |label: &Label| -> i64 { offsets[label.0] as i64 - offset as i64 };
        let short_jump = |label: &Label| -> Result<i16, Error> {
            i16::try_from(relative(label)).map_err(|_| Error::JumpOutOfRange {
                offset,
                target: offsets[label.0],
            })
        };

        match self {
            Instruction::Simple(opcode) => opcode.serialize(writer)?,
            Instruction::BiPush(value) => {
                BIPUSH.serialize(writer)?;
                value.serialize(writer)?;
            }
            Instruction::SiPush(value) => {
                SIPUSH.serialize(writer)?;
                value.serialize(writer)?;
            }
            Instruction::Ldc { index, .. } => {
                if self.encoded_len(offset) == 3 {
                    LDC_W.serialize(writer)?;
                    index.serialize(writer)?;
                } else {
                    LDC.serialize(writer)?;
                    (index.0 as u8).serialize(writer)?;
                }
            }
            Instruction::Ldc2W(index) => {
                LDC2_W.serialize(writer)?;
                index.serialize(writer)?;
            }
            Instruction::Local { opcode, index, .. } => match self.local_form() {
                Some(LocalForm::Short) => {
                    let short_opcode = if *opcode <= ALOAD {
                        ILOAD_0 + (opcode - ILOAD) * 4
                    } else {
                        ISTORE_0 + (opcode - ISTORE) * 4
                    };
                    (short_opcode + *index as u8).serialize(writer)?;
                }
                Some(LocalForm::Wide) => {
                    WIDE.serialize(writer)?;
                    opcode.serialize(writer)?;
                    index.serialize(writer)?;
                }
                _ => {
                    opcode.serialize(writer)?;
                    (*index as u8).serialize(writer)?;
                }
            },
            Instruction::IInc { index, delta, .. } => {
                if self.encoded_len(offset) == 6 {
                    WIDE.serialize(writer)?;
                    IINC.serialize(writer)?;
                    index.serialize(writer)?;
                    delta.serialize(writer)?;
                } else {
                    IINC.serialize(writer)?;
                    (*index as u8).serialize(writer)?;
                    (*delta as i8).serialize(writer)?;
                }
            }
            Instruction::Branch { opcode, target } => {
                opcode.serialize(writer)?;
                match *opcode {
                    GOTO_W | JSR_W => (relative(target) as i32).serialize(writer)?,
                    _ => short_jump(target)?.serialize(writer)?,
                }
            }
            Instruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                TABLESWITCH.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0u8.serialize(writer)?;
                }
                (relative(default) as i32).serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    (relative(target) as i32).serialize(writer)?;
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                LOOKUPSWITCH.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0u8.serialize(writer)?;
                }
                (relative(default) as i32).serialize(writer)?;
                (pairs.len() as i32).serialize(writer)?;
                for (key, target) in pairs {
                    key.serialize(writer)?;
                    (relative(target) as i32).serialize(writer)?;
                }
            }
            Instruction::ConstantRef { opcode, index } => {
                opcode.serialize(writer)?;
                index.serialize(writer)?;
            }
            Instruction::InvokeInterface { index, count } => {
                INVOKEINTERFACE.serialize(writer)?;
                index.serialize(writer)?;
                count.serialize(writer)?;
                0u8.serialize(writer)?;
            }
            Instruction::InvokeDynamic(index) => {
                INVOKEDYNAMIC.serialize(writer)?;
                index.serialize(writer)?;
                0u16.serialize(writer)?;
            }
            Instruction::NewArray(atype) => {
                NEWARRAY.serialize(writer)?;
                atype.serialize(writer)?;
            }
            Instruction::MultiANewArray { index, dimensions } => {
                MULTIANEWARRAY.serialize(writer)?;
                index.serialize(writer)?;
                dimensions.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// Decode a code array
///
/// Returns the instructions along with the offset of each instruction. The offsets vector has one
/// extra trailing element: the length of the code.
pub fn decode_instructions(code: &[u8]) -> Result<(Vec<Instruction>, Vec<u32>), Error> {
    let mut instructions = vec![];
    let mut offsets = vec![];
    let mut reader = Cursor::new(code);

    while (reader.position() as usize) < code.len() {
        let offset = reader.position() as u32;
        offsets.push(offset);
        instructions.push(decode_instruction(&mut reader, offset)?);
    }
    offsets.push(code.len() as u32);

    // Branch targets were decoded as absolute offsets, now turn them into labels
    for (idx, insn) in instructions.iter_mut().enumerate() {
        for label in insn.labels_mut() {
            let target = label.0;
            match offsets.binary_search(&(target as u32)) {
                Ok(found) if found < offsets.len() - 1 => *label = Label(found),
                _ => {
                    return Err(malformed(format!(
                        "instruction at offset {} jumps to invalid offset {}",
                        offsets[idx], target
                    )))
                }
            }
        }
    }

    Ok((instructions, offsets))
}

fn absolute_target(offset: u32, relative: i64) -> Result<Label, Error> {
    let target = offset as i64 + relative;
    if target < 0 {
        return Err(malformed(format!(
            "instruction at offset {} jumps before the start of the code",
            offset
        )));
    }
    Ok(Label(target as usize))
}

fn decode_instruction(reader: &mut Cursor<&[u8]>, offset: u32) -> Result<Instruction, Error> {
    let opcode = u8::parse(reader)?;
    Ok(match opcode {
        _ if is_simple(opcode) => Instruction::Simple(opcode),
        BIPUSH => Instruction::BiPush(i8::parse(reader)?),
        SIPUSH => Instruction::SiPush(i16::parse(reader)?),
        LDC => Instruction::Ldc {
            index: ConstantIndex(u8::parse(reader)? as u16),
            wide: false,
        },
        LDC_W => Instruction::Ldc {
            index: ConstantIndex::parse(reader)?,
            wide: true,
        },
        LDC2_W => Instruction::Ldc2W(ConstantIndex::parse(reader)?),
        _ if is_local(opcode) => Instruction::Local {
            opcode,
            index: u8::parse(reader)? as u16,
            form: LocalForm::Normal,
        },
        ILOAD_0..=ALOAD_3 => {
            let k = opcode - ILOAD_0;
            Instruction::Local {
                opcode: ILOAD + k / 4,
                index: (k % 4) as u16,
                form: LocalForm::Short,
            }
        }
        ISTORE_0..=ASTORE_3 => {
            let k = opcode - ISTORE_0;
            Instruction::Local {
                opcode: ISTORE + k / 4,
                index: (k % 4) as u16,
                form: LocalForm::Short,
            }
        }
        IINC => Instruction::IInc {
            index: u8::parse(reader)? as u16,
            delta: i8::parse(reader)? as i16,
            wide: false,
        },
        WIDE => match u8::parse(reader)? {
            IINC => Instruction::IInc {
                index: u16::parse(reader)?,
                delta: i16::parse(reader)?,
                wide: true,
            },
            inner if is_local(inner) => Instruction::Local {
                opcode: inner,
                index: u16::parse(reader)?,
                form: LocalForm::Wide,
            },
            inner => {
                return Err(malformed(format!(
                    "opcode {:#04x} cannot follow wide at offset {}",
                    inner, offset
                )))
            }
        },
        IFEQ..=JSR | IFNULL | IFNONNULL => Instruction::Branch {
            opcode,
            target: absolute_target(offset, i16::parse(reader)? as i64)?,
        },
        GOTO_W | JSR_W => Instruction::Branch {
            opcode,
            target: absolute_target(offset, i32::parse(reader)? as i64)?,
        },
        TABLESWITCH => {
            for _ in 0..switch_padding(offset) {
                u8::parse(reader)?;
            }
            let default = absolute_target(offset, i32::parse(reader)? as i64)?;
            let low = i32::parse(reader)?;
            let high = i32::parse(reader)?;
            if high < low {
                return Err(malformed(format!(
                    "tableswitch at offset {} has high {} below low {}",
                    offset, high, low
                )));
            }
            let count = high as i64 - low as i64 + 1;
            let mut targets = Vec::new();
            for _ in 0..count {
                targets.push(absolute_target(offset, i32::parse(reader)? as i64)?);
            }
            Instruction::TableSwitch {
                default,
                low,
                targets,
            }
        }
        LOOKUPSWITCH => {
            for _ in 0..switch_padding(offset) {
                u8::parse(reader)?;
            }
            let default = absolute_target(offset, i32::parse(reader)? as i64)?;
            let npairs = i32::parse(reader)?;
            if npairs < 0 {
                return Err(malformed(format!(
                    "lookupswitch at offset {} has negative pair count",
                    offset
                )));
            }
            let mut pairs = Vec::new();
            for _ in 0..npairs {
                let key = i32::parse(reader)?;
                pairs.push((key, absolute_target(offset, i32::parse(reader)? as i64)?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            Instruction::ConstantRef {
                opcode,
                index: ConstantIndex::parse(reader)?,
            }
        }
        INVOKEINTERFACE => {
            let index = ConstantIndex::parse(reader)?;
            let count = u8::parse(reader)?;
            u8::parse(reader)?;
            Instruction::InvokeInterface { index, count }
        }
        INVOKEDYNAMIC => {
            let index = ConstantIndex::parse(reader)?;
            u16::parse(reader)?;
            Instruction::InvokeDynamic(index)
        }
        NEWARRAY => Instruction::NewArray(u8::parse(reader)?),
        MULTIANEWARRAY => Instruction::MultiANewArray {
            index: ConstantIndex::parse(reader)?,
            dimensions: u8::parse(reader)?,
        },
        other => {
            return Err(malformed(format!(
                "unknown opcode {:#04x} at offset {}",
                other, offset
            )))
        }
    })
}
