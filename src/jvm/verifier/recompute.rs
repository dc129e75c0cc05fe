use super::*;
use crate::jvm::class_file::{
    CodeAttribute, CodeAttributeBody, Parse, StackMapFrame, StackMapTable, Version,
};
use crate::jvm::class_graph::ClassHierarchy;
use crate::jvm::code::opcodes::*;
use crate::jvm::code::{BasicBlock, Code, Instruction, Label};
use crate::jvm::{
    BinaryName, ConstantPool, Error, MethodDescriptor, ParseDescriptor, RefType,
    VerifierErrorKind, INIT,
};
use crate::util::Width;
use std::collections::{BTreeSet, HashMap};

/// Method whose frames are being computed
pub struct MethodInfo<'a> {
    pub this_class: &'a BinaryName,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
}

/// Does a method need a `StackMapTable` once its code has been laid out again?
///
/// Class files from version 51 on are always type-checked. Version 50 files fall back to the old
/// verifier when frames are missing, so they only get frames if they had them to begin with.
pub fn requires_frames(version: Version, code: &Code, constants: &ConstantPool) -> bool {
    version >= Version::JAVA7
        || (version >= Version::JAVA6
            && code
                .attribute(CodeAttribute::STACK_MAP_TABLE, constants)
                .is_some())
}

/// Analysis failure, with the instruction it happened at (if any)
type AnalysisError = (Option<Label>, VerifierErrorKind);

/// Derive the stack map frames of a method and install them on its code
///
/// Where unresolved classes hide the common superclass of two types, the types recorded in the
/// previous `StackMapTable` (if there was one) are used instead.
///
/// This replaces any previous `StackMapTable` and raises `max_stack`/`max_locals` if the analysis
/// found them to be too small. On failure, the code is left as it was.
pub fn recompute_frames(
    code: &mut Code,
    method: &MethodInfo,
    constants: &mut ConstantPool,
    hierarchy: &ClassHierarchy,
) -> Result<(), Error> {
    let failed = |(label, kind): AnalysisError, code: &Code| Error::FrameComputationFailed {
        method: format!("{}{}", method.name, method.descriptor),
        offset: label.and_then(|label| code.source_offsets.get(label.0).copied()),
        kind,
    };

    let analysis = analyse(code, method, constants, hierarchy).map_err(|err| failed(err, code))?;
    let offsets = code.layout()?;

    let mut previous = analysis.entry.to_serializable(constants, &offsets)?;
    let mut previous_offset: Option<u32> = None;
    let mut frames = vec![];
    for (label, frame) in &analysis.frames {
        let offset = offsets[label.0];
        let offset_delta = match previous_offset {
            None => offset,
            Some(previous_offset) => offset - previous_offset - 1,
        };
        let frame = frame.to_serializable(constants, &offsets)?;
        frames.push(frame.stack_map_frame(offset_delta as u16, &previous));
        previous = frame;
        previous_offset = Some(offset);
    }
    log::trace!(
        "Computed {} frames for {}{}",
        frames.len(),
        method.name,
        method.descriptor
    );

    code.max_stack = code.max_stack.max(analysis.max_stack as u16);
    code.max_locals = code.max_locals.max(analysis.max_locals as u16);
    code.set_stack_map_table(StackMapTable(frames), constants)
}

/// Result of interpreting a method
struct Analysis {
    entry: AnalysisFrame,

    /// Frames at the instructions that need one, in code order
    frames: Vec<(Label, AnalysisFrame)>,

    max_stack: usize,
    max_locals: usize,
}

fn analyse(
    code: &Code,
    method: &MethodInfo,
    constants: &ConstantPool,
    hierarchy: &ClassHierarchy,
) -> Result<Analysis, AnalysisError> {
    // Subroutines have no frame representation
    for (idx, insn) in code.instructions.iter().enumerate() {
        let is_subroutine = match insn {
            Instruction::Branch { opcode, .. } => *opcode == JSR || *opcode == JSR_W,
            Instruction::Local { opcode, .. } => *opcode == RET,
            _ => false,
        };
        if is_subroutine {
            return Err((Some(Label(idx)), VerifierErrorKind::Subroutine));
        }
    }

    let descriptor = MethodDescriptor::<BinaryName>::parse(method.descriptor)
        .map_err(|_| (None, VerifierErrorKind::BadDescriptor(method.descriptor.to_owned())))?;
    let entry = AnalysisFrame::method_entry(
        method.this_class,
        method.is_static,
        method.name == INIT,
        &descriptor,
        code.max_locals as usize,
    );
    let env = MethodEnv {
        constants,
        this_class: method.this_class,
        code,
    };

    let handlers = code
        .exception_table
        .iter()
        .map(|handler| -> Result<_, AnalysisError> {
            let catch_type = match handler.catch_type {
                None => RefType::Object(BinaryName::THROWABLE),
                Some(catch_type) => constants
                    .get_class_name(catch_type)
                    .ok()
                    .and_then(|name| RefType::from_class_constant(name).ok())
                    .ok_or((None, VerifierErrorKind::MissingConstant(catch_type.0)))?,
            };
            Ok((handler, catch_type))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let merger = TypeMerger::new(
        hierarchy,
        handlers.iter().filter_map(|(_, catch_type)| match catch_type {
            RefType::Object(name) => Some(name.clone()),
            _ => None,
        }),
    );
    let recorded = recorded_frames(code, constants, &entry);

    let blocks = BasicBlock::partition(code);
    let block_of: HashMap<Label, usize> = blocks
        .iter()
        .enumerate()
        .map(|(idx, block)| (block.start, idx))
        .collect();
    let mut block_frames: Vec<Option<AnalysisFrame>> = vec![None; blocks.len()];
    let mut max_stack = 0;

    // Propagate a frame to the start of a block, returning whether anything changed
    let propagate = |block_frames: &mut Vec<Option<AnalysisFrame>>,
                         target: Label,
                         frame: &AnalysisFrame|
     -> Result<Option<usize>, VerifierErrorKind> {
        let target_block = *block_of.get(&target).ok_or(VerifierErrorKind::InvalidIndex)?;
        if let Some(existing) = &mut block_frames[target_block] {
            Ok(existing
                .merge_from(frame, &merger, recorded.get(&target))?
                .then_some(target_block))
        } else {
            block_frames[target_block] = Some(frame.clone());
            Ok(Some(target_block))
        }
    };

    let mut worklist: BTreeSet<usize> = BTreeSet::new();
    if !blocks.is_empty() {
        block_frames[0] = Some(entry.clone());
        worklist.insert(0);
    }

    while let Some(block_idx) = worklist.pop_first() {
        let block = blocks[block_idx];
        let mut frame = match &block_frames[block_idx] {
            Some(frame) => frame.clone(),
            None => continue,
        };
        max_stack = max_stack.max(frame.stack_size());

        for label in block.labels() {
            let at = |kind| (Some(label), kind);
            let insn = &code.instructions[label.0];
            let covering: Vec<_> = handlers
                .iter()
                .filter(|(handler, _)| handler.start <= label && label < handler.end)
                .collect();

            for (handler, catch_type) in &covering {
                let handler_frame = frame.handler_frame(catch_type.clone());
                if let Some(changed) =
                    propagate(&mut block_frames, handler.handler, &handler_frame).map_err(at)?
                {
                    worklist.insert(changed);
                }
            }

            frame.execute(insn, label, &env).map_err(at)?;
            max_stack = max_stack.max(frame.stack_size());

            // Handlers also see locals written by the instruction
            if matches!(insn, Instruction::Local { .. } | Instruction::IInc { .. }) {
                for (handler, catch_type) in &covering {
                    let handler_frame = frame.handler_frame(catch_type.clone());
                    if let Some(changed) =
                        propagate(&mut block_frames, handler.handler, &handler_frame)
                            .map_err(at)?
                    {
                        worklist.insert(changed);
                    }
                }
            }
        }

        let last = Label(block.end.0 - 1);
        let last_insn = &code.instructions[last.0];
        let mut successors = last_insn.jump_targets();
        if last_insn.falls_through() {
            if block.end.0 >= code.instructions.len() {
                return Err((Some(last), VerifierErrorKind::FallsOffEnd));
            }
            successors.push(block.end);
        }
        for successor in successors {
            if let Some(changed) =
                propagate(&mut block_frames, successor, &frame).map_err(|kind| (Some(last), kind))?
            {
                worklist.insert(changed);
            }
        }
    }

    // Frames go at jump targets, handlers, and after instructions that don't fall through
    let mut needs_frame: BTreeSet<Label> = BTreeSet::new();
    for (idx, insn) in code.instructions.iter().enumerate() {
        needs_frame.extend(insn.jump_targets());
        if !insn.falls_through() && idx + 1 < code.instructions.len() {
            needs_frame.insert(Label(idx + 1));
        }
    }
    needs_frame.extend(code.exception_table.iter().map(|handler| handler.handler));

    for (block, frame) in blocks.iter().zip(&block_frames) {
        if frame.is_none() {
            return Err((Some(block.start), VerifierErrorKind::UnreachableCode));
        }
    }

    let frames = blocks
        .iter()
        .zip(block_frames)
        .filter(|(block, _)| needs_frame.contains(&block.start))
        .filter_map(|(block, frame)| frame.map(|frame| (block.start, frame)))
        .collect();

    Ok(Analysis {
        max_locals: entry.locals.len(),
        entry,
        frames,
        max_stack,
    })
}

/// Frames of the method's existing `StackMapTable`, keyed by the instruction they describe
///
/// A table that can't be decoded is ignored.
fn recorded_frames(
    code: &Code,
    constants: &ConstantPool,
    entry: &AnalysisFrame,
) -> HashMap<Label, AnalysisFrame> {
    decode_recorded_frames(code, constants, entry).unwrap_or_else(|err| {
        log::debug!("Ignoring unreadable StackMapTable: {}", err);
        HashMap::new()
    })
}

fn decode_recorded_frames(
    code: &Code,
    constants: &ConstantPool,
    entry: &AnalysisFrame,
) -> Result<HashMap<Label, AnalysisFrame>, Error> {
    let attribute = code.attribute(CodeAttribute::STACK_MAP_TABLE, constants);
    let table = match attribute.map(|attr| &attr.body) {
        Some(CodeAttributeBody::StackMapTable(table)) => table.clone(),
        Some(CodeAttributeBody::Opaque(bytes)) => StackMapTable::parse(&mut bytes.as_slice())?,
        _ => return Ok(HashMap::new()),
    };

    let label_at = |offset: u32| -> Result<Label, Error> {
        match code.source_offsets.binary_search(&offset) {
            Ok(idx) if idx + 1 < code.source_offsets.len() => Ok(Label(idx)),
            _ => Err(Error::MalformedClassFile(format!(
                "stack map frame refers to offset {} which is not an instruction",
                offset
            ))),
        }
    };
    let decode = |vtype: &SerializedType| -> Result<AnalysisType, Error> {
        Ok(match *vtype {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(class) => {
                let name = constants.get_class_name(class)?;
                let ref_type = RefType::from_class_constant(name).map_err(|_| {
                    Error::MalformedClassFile(format!("invalid class name '{}'", name))
                })?;
                VerificationType::Object(ref_type)
            }
            VerificationType::Uninitialized(offset) => {
                VerificationType::Uninitialized(label_at(offset as u32)?)
            }
        })
    };

    // Locals as the table encodes them: wide types take one entry and there is no trailing `Top`
    let mut locals: Vec<AnalysisType> = vec![];
    let mut slot = 0;
    while slot < entry.locals.len() {
        let vtype = &entry.locals[slot];
        locals.push(vtype.clone());
        slot += vtype.width();
    }
    while locals.last() == Some(&VerificationType::Top) {
        locals.pop();
    }

    let mut frames = HashMap::new();
    let mut previous_offset: Option<u32> = None;
    for frame in &table.0 {
        let offset_delta = frame.offset_delta() as u32;
        let offset = match previous_offset {
            None => offset_delta,
            Some(previous_offset) => previous_offset + offset_delta + 1,
        };
        let stack = match frame {
            StackMapFrame::SameLocalsNoStack { .. } => vec![],
            StackMapFrame::SameLocalsOneStack { stack, .. } => vec![decode(stack)?],
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let kept = locals.len().checked_sub(*chopped_k as usize).ok_or_else(|| {
                    Error::MalformedClassFile(format!(
                        "stack map frame chops {} of {} locals",
                        chopped_k,
                        locals.len()
                    ))
                })?;
                locals.truncate(kept);
                vec![]
            }
            StackMapFrame::AppendLocalsNoStack {
                locals: appended, ..
            } => {
                for vtype in appended {
                    locals.push(decode(vtype)?);
                }
                vec![]
            }
            StackMapFrame::Full {
                locals: full_locals,
                stack,
                ..
            } => {
                locals = full_locals.iter().map(&decode).collect::<Result<_, _>>()?;
                stack.iter().map(&decode).collect::<Result<_, _>>()?
            }
        };

        let mut slots = vec![];
        for vtype in &locals {
            slots.push(vtype.clone());
            if vtype.width() == 2 {
                slots.push(VerificationType::Top);
            }
        }
        frames.insert(
            label_at(offset)?,
            Frame {
                locals: slots,
                stack,
            },
        );
        previous_offset = Some(offset);
    }
    Ok(frames)
}
