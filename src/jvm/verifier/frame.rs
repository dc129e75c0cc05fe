use super::*;
use crate::jvm::class_file::StackMapFrame;
use crate::jvm::code::opcodes::*;
use crate::jvm::code::{Code, Instruction, Label};
use crate::jvm::{
    BaseType, BinaryName, ClassConstantIndex, Constant, ConstantIndex, ConstantPool, Error,
    FieldType, MethodDescriptor, NameAndTypeConstantIndex, ParseDescriptor, RefType,
    Utf8ConstantIndex, VerifierErrorKind, INIT,
};
use crate::util::Width;

/// Snapshot of the stack and local variables at a point in the bytecode
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame<Cls, U> {
    /// Local variables
    ///
    /// While analysing a method, there is one entry per slot and the second slot of a `long` or
    /// `double` holds [`VerificationType::Top`]. In a serialized frame, `long` and `double` take
    /// just one entry (as they do in the `StackMapTable` attribute).
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack (`long` and `double` are one entry)
    pub stack: Vec<VerificationType<Cls, U>>,
}

/// Frame tracked while interpreting a method
pub type AnalysisFrame = Frame<RefType<BinaryName>, Label>;

/// Frame in the form written to a `StackMapTable`
pub type SerializableFrame = Frame<ClassConstantIndex, u16>;

/// What instructions need to know about the method they are in
pub struct MethodEnv<'a> {
    pub constants: &'a ConstantPool,
    pub this_class: &'a BinaryName,
    pub code: &'a Code,
}

impl<Cls, U> Frame<Cls, U> {
    /// Size of the stack in slots
    pub fn stack_size(&self) -> usize {
        self.stack.iter().map(|t| t.width()).sum()
    }
}

impl AnalysisFrame {
    /// Frame on entry to a method
    ///
    /// Locals start out as the receiver (if any) followed by the parameters. The rest of the
    /// `max_locals` slots are unusable until something is stored to them.
    pub fn method_entry(
        this_class: &BinaryName,
        is_static: bool,
        is_init: bool,
        descriptor: &MethodDescriptor<BinaryName>,
        max_locals: usize,
    ) -> AnalysisFrame {
        let mut locals = vec![];
        if !is_static {
            if is_init && *this_class != BinaryName::OBJECT {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(RefType::Object(this_class.clone())));
            }
        }
        for parameter in &descriptor.parameters {
            let vtype = AnalysisType::from(parameter.clone());
            let wide = vtype.width() == 2;
            locals.push(vtype);
            if wide {
                locals.push(VerificationType::Top);
            }
        }
        while locals.len() < max_locals {
            locals.push(VerificationType::Top);
        }
        Frame {
            locals,
            stack: vec![],
        }
    }

    /// Merge an incoming frame into this one
    ///
    /// Returns whether this frame changed. Stacks must have the same shape, and their entries must
    /// have compatible types. Locals that don't agree just become unusable. `original` is the
    /// frame previously recorded at the same instruction, if the method had a `StackMapTable`.
    pub fn merge_from(
        &mut self,
        incoming: &AnalysisFrame,
        merger: &TypeMerger,
        original: Option<&AnalysisFrame>,
    ) -> Result<bool, VerifierErrorKind> {
        if self.stack.len() != incoming.stack.len() {
            return Err(VerifierErrorKind::StackHeightMismatch {
                expected: self.stack_size(),
                found: incoming.stack_size(),
            });
        }
        let original_stack = original
            .map(|frame| &frame.stack)
            .filter(|stack| stack.len() == self.stack.len());
        let original_locals = original.map(|frame| &frame.locals);
        let mut changed = false;

        for (slot, (current, other)) in self.stack.iter_mut().zip(&incoming.stack).enumerate() {
            let previous = original_stack.and_then(|stack| stack.get(slot));
            let merged = merger.merge(current, other, previous);
            if merged == VerificationType::Top {
                return Err(VerifierErrorKind::InvalidType);
            }
            if merged != *current {
                *current = merged;
                changed = true;
            }
        }

        for (slot, (current, other)) in self.locals.iter_mut().zip(&incoming.locals).enumerate() {
            let previous = original_locals.and_then(|locals| locals.get(slot));
            let merged = merger.merge(current, other, previous);
            if merged != *current {
                *current = merged;
                changed = true;
            }
        }

        Ok(changed)
    }

    /// Frame seen by an exception handler for an instruction executed in this frame
    pub fn handler_frame(&self, catch_type: RefType<BinaryName>) -> AnalysisFrame {
        Frame {
            locals: self.locals.clone(),
            stack: vec![VerificationType::Object(catch_type)],
        }
    }

    /// Update the frame to reflect the effects of the given instruction
    ///
    /// `label` is the label of the instruction itself.
    pub fn execute(
        &mut self,
        insn: &Instruction,
        label: Label,
        env: &MethodEnv,
    ) -> Result<(), VerifierErrorKind> {
        execute_instruction(self, insn, label, env)
    }

    /// Resolve the frame into its serializable form
    ///
    /// `offsets` are the offsets of the instructions in the final layout of the code (used to
    /// locate the `new` instructions of uninitialized values).
    pub fn to_serializable(
        &self,
        constants: &mut ConstantPool,
        offsets: &[u32],
    ) -> Result<SerializableFrame, Error> {
        // Collapse the two slots of wide locals and drop unusable locals at the end
        let mut locals = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let vtype = &self.locals[slot];
            locals.push(serializable_type(vtype, constants, offsets)?);
            slot += vtype.width();
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }

        let stack = self
            .stack
            .iter()
            .map(|vtype| serializable_type(vtype, constants, offsets))
            .collect::<Result<_, _>>()?;

        Ok(Frame { locals, stack })
    }
}

fn serializable_type(
    vtype: &AnalysisType,
    constants: &mut ConstantPool,
    offsets: &[u32],
) -> Result<SerializedType, Error> {
    use VerificationType::*;

    Ok(match vtype {
        Top => Top,
        Integer => Integer,
        Float => Float,
        Double => Double,
        Long => Long,
        Null => Null,
        UninitializedThis => UninitializedThis,
        Object(ref_type) => Object(constants.intern_class(&ref_type.class_constant_name())?),
        Uninitialized(label) => Uninitialized(offsets[label.0] as u16),
    })
}

impl SerializableFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none of the
    /// other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        match self.stack.len() {
            0 => {
                let this_locals_len = self.locals.len();
                let prev_locals_len = previous_frame.locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    let this_is_prefix_of_prev = self
                        .locals
                        .iter()
                        .zip(previous_frame.locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if this_is_prefix_of_prev && len_difference == 0 {
                        return StackMapFrame::SameLocalsNoStack { offset_delta };
                    } else if this_is_prefix_of_prev && len_difference < 4 {
                        return StackMapFrame::ChopLocalsNoStack {
                            offset_delta,
                            chopped_k: len_difference as u8,
                        };
                    }
                } else if this_locals_len - prev_locals_len < 4 {
                    let prev_is_prefix_of_this = previous_frame
                        .locals
                        .iter()
                        .zip(self.locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if prev_is_prefix_of_this {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: self.locals[prev_locals_len..].to_vec(),
                        };
                    }
                }
            }
            1 if self.locals == previous_frame.locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: self.stack[0],
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.clone(),
            locals: self.locals.clone(),
        }
    }
}

fn execute_instruction(
    frame: &mut AnalysisFrame,
    insn: &Instruction,
    label: Label,
    env: &MethodEnv,
) -> Result<(), VerifierErrorKind> {
    use VerificationType::*;

    match insn {
        Instruction::Simple(opcode) => execute_simple(frame, *opcode)?,
        Instruction::BiPush(_) | Instruction::SiPush(_) => frame.stack.push(Integer),
        Instruction::Ldc { index, .. } => {
            let vtype = loadable_constant_type(env.constants, *index)?;
            if vtype.width() != 1 {
                return Err(VerifierErrorKind::InvalidWidth(2));
            }
            frame.stack.push(vtype);
        }
        Instruction::Ldc2W(index) => {
            let vtype = loadable_constant_type(env.constants, *index)?;
            if vtype.width() != 2 {
                return Err(VerifierErrorKind::InvalidWidth(1));
            }
            frame.stack.push(vtype);
        }

        Instruction::Local { opcode, index, .. } => {
            let index = *index as usize;
            match *opcode {
                ILOAD => load(frame, index, Integer)?,
                LLOAD => load(frame, index, Long)?,
                FLOAD => load(frame, index, Float)?,
                DLOAD => load(frame, index, Double)?,
                ALOAD => {
                    let vtype = get_local(&frame.locals, index)?;
                    if !vtype.is_reference() {
                        return Err(VerifierErrorKind::InvalidType);
                    }
                    frame.stack.push(vtype);
                }
                ISTORE => store(frame, index, Some(Integer))?,
                LSTORE => store(frame, index, Some(Long))?,
                FSTORE => store(frame, index, Some(Float))?,
                DSTORE => store(frame, index, Some(Double))?,
                ASTORE => store(frame, index, None)?,
                _ => return Err(VerifierErrorKind::Subroutine),
            }
        }
        Instruction::IInc { index, .. } => {
            if get_local(&frame.locals, *index as usize)? != Integer {
                return Err(VerifierErrorKind::InvalidType);
            }
        }

        Instruction::Branch { opcode, .. } => match *opcode {
            IFEQ..=IFLE => pop_expecting_type(&mut frame.stack, &Integer)?,
            IF_ICMPEQ..=IF_ICMPLE => {
                pop_expecting_type(&mut frame.stack, &Integer)?;
                pop_expecting_type(&mut frame.stack, &Integer)?;
            }
            IF_ACMPEQ | IF_ACMPNE => {
                pop_reference(&mut frame.stack)?;
                pop_reference(&mut frame.stack)?;
            }
            IFNULL | IFNONNULL => {
                pop_reference(&mut frame.stack)?;
            }
            GOTO | GOTO_W => (),
            _ => return Err(VerifierErrorKind::Subroutine),
        },
        Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
            pop_expecting_type(&mut frame.stack, &Integer)?
        }

        Instruction::ConstantRef { opcode, index } => match *opcode {
            GETSTATIC => {
                let field_type = field_ref(env.constants, *index)?;
                frame.stack.push(field_type.into());
            }
            PUTSTATIC => {
                pop(&mut frame.stack)?;
            }
            GETFIELD => {
                let field_type = field_ref(env.constants, *index)?;
                pop_reference(&mut frame.stack)?;
                frame.stack.push(field_type.into());
            }
            PUTFIELD => {
                pop(&mut frame.stack)?;
                pop_reference(&mut frame.stack)?;
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => {
                let (name, descriptor) = method_ref(env.constants, *index)?;
                invoke(
                    frame,
                    &descriptor,
                    *opcode != INVOKESTATIC,
                    *opcode == INVOKESPECIAL && name == INIT,
                    env,
                )?;
            }
            NEW => {
                class_ref(env.constants, *index)?;
                frame.stack.push(Uninitialized(label));
            }
            ANEWARRAY => {
                let element_type = class_ref(env.constants, *index)?;
                pop_expecting_type(&mut frame.stack, &Integer)?;
                frame
                    .stack
                    .push(Object(RefType::array(FieldType::Ref(element_type))));
            }
            CHECKCAST => {
                let ref_type = class_ref(env.constants, *index)?;
                pop_reference(&mut frame.stack)?;
                frame.stack.push(Object(ref_type));
            }
            INSTANCEOF => {
                class_ref(env.constants, *index)?;
                pop_reference(&mut frame.stack)?;
                frame.stack.push(Integer);
            }
            _ => return Err(VerifierErrorKind::InvalidType),
        },
        Instruction::InvokeInterface { index, .. } => {
            let (_, descriptor) = method_ref(env.constants, *index)?;
            invoke(frame, &descriptor, true, false, env)?;
        }
        Instruction::InvokeDynamic(index) => {
            let descriptor = match env.constants.get(*index) {
                Some(Constant::InvokeDynamic {
                    method_descriptor, ..
                }) => {
                    let (_, descriptor) = name_and_type(env.constants, *method_descriptor)?;
                    parse_descriptor::<MethodDescriptor<BinaryName>>(descriptor)?
                }
                _ => return Err(VerifierErrorKind::MissingConstant(*index)),
            };
            invoke(frame, &descriptor, false, false, env)?;
        }
        Instruction::NewArray(type_code) => {
            let element_type =
                BaseType::from_array_type_code(*type_code).ok_or(VerifierErrorKind::InvalidType)?;
            pop_expecting_type(&mut frame.stack, &Integer)?;
            frame
                .stack
                .push(Object(RefType::array(FieldType::Base(element_type))));
        }
        Instruction::MultiANewArray { index, dimensions } => {
            let array_type = class_ref(env.constants, *index)?;
            for _ in 0..*dimensions {
                pop_expecting_type(&mut frame.stack, &Integer)?;
            }
            frame.stack.push(Object(array_type));
        }
    }

    Ok(())
}

/// Instructions without operands
fn execute_simple(frame: &mut AnalysisFrame, opcode: u8) -> Result<(), VerifierErrorKind> {
    use VerificationType::*;

    let stack = &mut frame.stack;
    match opcode {
        NOP => (),
        ACONST_NULL => stack.push(Null),
        ICONST_M1..=ICONST_5 => stack.push(Integer),
        LCONST_0 | LCONST_1 => stack.push(Long),
        FCONST_0..=FCONST_2 => stack.push(Float),
        DCONST_0 | DCONST_1 => stack.push(Double),

        IALOAD | BALOAD | CALOAD | SALOAD => array_load(stack, Integer)?,
        LALOAD => array_load(stack, Long)?,
        FALOAD => array_load(stack, Float)?,
        DALOAD => array_load(stack, Double)?,
        AALOAD => {
            pop_expecting_type(stack, &Integer)?;
            match pop_reference(stack)? {
                Null => stack.push(Null),
                Object(array_type) => match array_type.component() {
                    Some(FieldType::Ref(component)) => stack.push(Object(component)),
                    _ => return Err(VerifierErrorKind::NotArrayType),
                },
                _ => return Err(VerifierErrorKind::NotArrayType),
            }
        }

        IASTORE | BASTORE | CASTORE | SASTORE => array_store(stack, Integer)?,
        LASTORE => array_store(stack, Long)?,
        FASTORE => array_store(stack, Float)?,
        DASTORE => array_store(stack, Double)?,
        AASTORE => {
            pop_reference(stack)?;
            pop_expecting_type(stack, &Integer)?;
            pop_reference(stack)?;
        }

        POP => {
            pop_expecting_width(stack, 1)?;
        }

        POP2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_expecting_width(stack, 1)?;
                }

                // Form 2
                _ => (),
            }
        }

        DUP => {
            let arg1 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DUP_X1 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DUP_X2 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        DUP2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }
            }
        }

        DUP2_X1 => {
            let arg1 = pop(stack)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                _ => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
            }
        }

        DUP2_X2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    let arg3 = pop(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        _ => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }
                    }
                }

                _ => {
                    let arg2 = pop(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        _ => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }
                    }
                }
            }
        }

        SWAP => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR | IXOR | ISHL | ISHR | IUSHR => {
            binary_op(stack, Integer, Integer)?
        }
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => binary_op(stack, Long, Long)?,
        FADD | FSUB | FMUL | FDIV | FREM => binary_op(stack, Float, Float)?,
        DADD | DSUB | DMUL | DDIV | DREM => binary_op(stack, Double, Double)?,
        LSHL | LSHR | LUSHR => {
            pop_expecting_type(stack, &Integer)?;
            pop_expecting_type(stack, &Long)?;
            stack.push(Long);
        }

        INEG | I2B | I2C | I2S => unary_op(stack, Integer, Integer)?,
        LNEG => unary_op(stack, Long, Long)?,
        FNEG => unary_op(stack, Float, Float)?,
        DNEG => unary_op(stack, Double, Double)?,

        I2L => unary_op(stack, Integer, Long)?,
        I2F => unary_op(stack, Integer, Float)?,
        I2D => unary_op(stack, Integer, Double)?,
        L2I => unary_op(stack, Long, Integer)?,
        L2F => unary_op(stack, Long, Float)?,
        L2D => unary_op(stack, Long, Double)?,
        F2I => unary_op(stack, Float, Integer)?,
        F2L => unary_op(stack, Float, Long)?,
        F2D => unary_op(stack, Float, Double)?,
        D2I => unary_op(stack, Double, Integer)?,
        D2L => unary_op(stack, Double, Long)?,
        D2F => unary_op(stack, Double, Float)?,

        LCMP => binary_op(stack, Long, Integer)?,
        FCMPL | FCMPG => binary_op(stack, Float, Integer)?,
        DCMPL | DCMPG => binary_op(stack, Double, Integer)?,

        IRETURN => pop_expecting_type(stack, &Integer)?,
        LRETURN => pop_expecting_type(stack, &Long)?,
        FRETURN => pop_expecting_type(stack, &Float)?,
        DRETURN => pop_expecting_type(stack, &Double)?,
        ARETURN | ATHROW | MONITORENTER | MONITOREXIT => {
            pop_reference(stack)?;
        }
        RETURN => (),

        ARRAYLENGTH => {
            match pop_reference(stack)? {
                Null | Object(RefType::PrimitiveArray(_) | RefType::ObjectArray(_)) => (),
                _ => return Err(VerifierErrorKind::NotArrayType),
            }
            stack.push(Integer);
        }

        _ => return Err(VerifierErrorKind::InvalidType),
    }

    Ok(())
}

fn invoke(
    frame: &mut AnalysisFrame,
    descriptor: &MethodDescriptor<BinaryName>,
    has_receiver: bool,
    is_init: bool,
    env: &MethodEnv,
) -> Result<(), VerifierErrorKind> {
    use VerificationType::*;

    for parameter in descriptor.parameters.iter().rev() {
        let found = pop(&mut frame.stack)?;
        if found.width() != parameter.width() {
            return Err(VerifierErrorKind::InvalidWidth(found.width()));
        }
    }

    if is_init {
        let receiver = pop(&mut frame.stack)?;
        let initialized = match receiver {
            UninitializedThis => RefType::Object(env.this_class.clone()),
            Uninitialized(new_label) => new_class(env, new_label)?,
            _ => return Err(VerifierErrorKind::UninitializedMisuse),
        };
        let initialized = Object(initialized);
        replace_all(&mut frame.stack, &receiver, &initialized);
        replace_all(&mut frame.locals, &receiver, &initialized);
    } else if has_receiver {
        match pop(&mut frame.stack)? {
            Null | Object(_) => (),
            UninitializedThis | Uninitialized(_) => {
                return Err(VerifierErrorKind::UninitializedMisuse)
            }
            _ => return Err(VerifierErrorKind::InvalidType),
        }
    }

    // Push the return type
    if let Some(return_type) = &descriptor.return_type {
        frame.stack.push(AnalysisType::from(return_type.clone()));
    }
    Ok(())
}

/// Replace every occurrence of a type (used when a constructor initializes an object)
fn replace_all(types: &mut [AnalysisType], from: &AnalysisType, to: &AnalysisType) {
    for vtype in types.iter_mut().filter(|vtype| *vtype == from) {
        *vtype = to.clone();
    }
}

/// Class instantiated by the `new` instruction at the given label
fn new_class(env: &MethodEnv, new_label: Label) -> Result<RefType<BinaryName>, VerifierErrorKind> {
    match env.code.instructions.get(new_label.0) {
        Some(Instruction::ConstantRef { opcode: NEW, index }) => class_ref(env.constants, *index),
        _ => Err(VerifierErrorKind::UninitializedMisuse),
    }
}

fn get_local(locals: &[AnalysisType], index: usize) -> Result<AnalysisType, VerifierErrorKind> {
    locals
        .get(index)
        .cloned()
        .ok_or(VerifierErrorKind::InvalidIndex)
}

fn load(
    frame: &mut AnalysisFrame,
    index: usize,
    expected: AnalysisType,
) -> Result<(), VerifierErrorKind> {
    if get_local(&frame.locals, index)? != expected {
        return Err(VerifierErrorKind::InvalidType);
    }
    if expected.width() == 2 && index + 1 >= frame.locals.len() {
        return Err(VerifierErrorKind::InvalidIndex);
    }
    frame.stack.push(expected);
    Ok(())
}

/// Store the top of the stack into a local
///
/// `expected` of `None` means any reference type.
fn store(
    frame: &mut AnalysisFrame,
    index: usize,
    expected: Option<AnalysisType>,
) -> Result<(), VerifierErrorKind> {
    let value = pop(&mut frame.stack)?;
    match &expected {
        Some(expected) if value != *expected => return Err(VerifierErrorKind::InvalidType),
        None if !value.is_reference() => return Err(VerifierErrorKind::InvalidType),
        _ => (),
    }

    let width = value.width();
    if index + width > frame.locals.len() {
        return Err(VerifierErrorKind::InvalidIndex);
    }

    // Overwriting the second half of a wide value invalidates its first half
    if index > 0 && frame.locals[index - 1].width() == 2 {
        frame.locals[index - 1] = VerificationType::Top;
    }
    frame.locals[index] = value;
    if width == 2 {
        frame.locals[index + 1] = VerificationType::Top;
    }
    Ok(())
}

fn pop(stack: &mut Vec<AnalysisType>) -> Result<AnalysisType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

/// Pop a value off the stack, checking its width
fn pop_expecting_width(
    stack: &mut Vec<AnalysisType>,
    expected_width: usize,
) -> Result<AnalysisType, VerifierErrorKind> {
    let found = pop(stack)?;
    let found_width = found.width();
    if found_width != expected_width {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    } else {
        Ok(found)
    }
}

fn pop_expecting_type(
    stack: &mut Vec<AnalysisType>,
    expected: &AnalysisType,
) -> Result<(), VerifierErrorKind> {
    if pop(stack)? != *expected {
        return Err(VerifierErrorKind::InvalidType);
    }
    Ok(())
}

fn pop_reference(stack: &mut Vec<AnalysisType>) -> Result<AnalysisType, VerifierErrorKind> {
    let found = pop(stack)?;
    if !found.is_reference() {
        return Err(VerifierErrorKind::InvalidType);
    }
    Ok(found)
}

fn array_load(
    stack: &mut Vec<AnalysisType>,
    element: AnalysisType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(stack, &VerificationType::Integer)?;
    pop_reference(stack)?;
    stack.push(element);
    Ok(())
}

fn array_store(
    stack: &mut Vec<AnalysisType>,
    element: AnalysisType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(stack, &element)?;
    pop_expecting_type(stack, &VerificationType::Integer)?;
    pop_reference(stack)?;
    Ok(())
}

fn unary_op(
    stack: &mut Vec<AnalysisType>,
    operand: AnalysisType,
    result: AnalysisType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(stack, &operand)?;
    stack.push(result);
    Ok(())
}

fn binary_op(
    stack: &mut Vec<AnalysisType>,
    operand: AnalysisType,
    result: AnalysisType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(stack, &operand)?;
    pop_expecting_type(stack, &operand)?;
    stack.push(result);
    Ok(())
}

fn parse_descriptor<T: ParseDescriptor>(descriptor: &str) -> Result<T, VerifierErrorKind> {
    T::parse(descriptor).map_err(|_| VerifierErrorKind::BadDescriptor(descriptor.to_owned()))
}

fn utf8(constants: &ConstantPool, index: Utf8ConstantIndex) -> Result<&str, VerifierErrorKind> {
    constants
        .get_utf8(index)
        .map_err(|_| VerifierErrorKind::MissingConstant(index.0))
}

fn name_and_type(
    constants: &ConstantPool,
    index: NameAndTypeConstantIndex,
) -> Result<(&str, &str), VerifierErrorKind> {
    match constants.get(index) {
        Some(Constant::NameAndType { name, descriptor }) => {
            Ok((utf8(constants, *name)?, utf8(constants, *descriptor)?))
        }
        _ => Err(VerifierErrorKind::MissingConstant(index.0)),
    }
}

fn class_ref(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<RefType<BinaryName>, VerifierErrorKind> {
    match constants.get(index) {
        Some(Constant::Class(name)) => {
            let name = utf8(constants, *name)?;
            RefType::from_class_constant(name)
                .map_err(|_| VerifierErrorKind::BadDescriptor(name.to_owned()))
        }
        _ => Err(VerifierErrorKind::MissingConstant(index)),
    }
}

fn field_ref(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<FieldType<BinaryName>, VerifierErrorKind> {
    match constants.get(index) {
        Some(Constant::FieldRef(_, name_and_type_index)) => {
            let (_, descriptor) = name_and_type(constants, *name_and_type_index)?;
            parse_descriptor(descriptor)
        }
        _ => Err(VerifierErrorKind::MissingConstant(index)),
    }
}

fn method_ref(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<(&str, MethodDescriptor<BinaryName>), VerifierErrorKind> {
    match constants.get(index) {
        Some(Constant::MethodRef { name_and_type: name_and_type_index, .. }) => {
            let (name, descriptor) = name_and_type(constants, *name_and_type_index)?;
            Ok((name, parse_descriptor(descriptor)?))
        }
        _ => Err(VerifierErrorKind::MissingConstant(index)),
    }
}

/// Type of the value pushed by loading a constant
fn loadable_constant_type(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<AnalysisType, VerifierErrorKind> {
    use VerificationType::*;

    let constant = constants
        .get(index)
        .ok_or(VerifierErrorKind::MissingConstant(index))?;
    Ok(match constant {
        Constant::Integer(_) => Integer,
        Constant::Float(_) => Float,
        Constant::Long(_) => Long,
        Constant::Double(_) => Double,
        Constant::String(_) => Object(RefType::Object(BinaryName::STRING)),
        Constant::Class(_) => Object(RefType::Object(BinaryName::CLASS)),
        Constant::MethodType { .. } => Object(RefType::Object(BinaryName::METHODTYPE)),
        Constant::MethodHandle { .. } => Object(RefType::Object(BinaryName::METHODHANDLE)),
        Constant::Dynamic { name_and_type: name_and_type_index, .. } => {
            let (_, descriptor) = name_and_type(constants, *name_and_type_index)?;
            AnalysisType::from(parse_descriptor::<FieldType<BinaryName>>(descriptor)?)
        }
        other => return Err(VerifierErrorKind::NotLoadableConstant(other.clone())),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::test::animals;

    fn object(name: &str) -> AnalysisType {
        VerificationType::Object(RefType::Object(
            BinaryName::from_string(name.to_owned()).unwrap(),
        ))
    }

    fn frame(locals: Vec<AnalysisType>, stack: Vec<AnalysisType>) -> AnalysisFrame {
        Frame { locals, stack }
    }

    #[test]
    fn entry_frames() {
        let this_class = BinaryName::from_string(String::from("com/x/Dog")).unwrap();
        let descriptor = MethodDescriptor::<BinaryName>::parse("(JLjava/lang/String;I)V").unwrap();

        let entry = AnalysisFrame::method_entry(&this_class, true, false, &descriptor, 6);
        assert_eq!(
            entry.locals,
            vec![
                VerificationType::Long,
                VerificationType::Top,
                object("java/lang/String"),
                VerificationType::Integer,
                VerificationType::Top,
                VerificationType::Top,
            ]
        );

        let init = AnalysisFrame::method_entry(&this_class, false, true, &descriptor, 0);
        assert_eq!(init.locals[0], VerificationType::UninitializedThis);
        assert_eq!(init.locals.len(), 5);
        assert!(init.stack.is_empty());
    }

    #[test]
    fn stores_clobber_wide_locals() {
        let constants = ConstantPool::new();
        let this_class = BinaryName::OBJECT;
        let code = Code {
            max_stack: 2,
            max_locals: 3,
            instructions: vec![],
            source_offsets: vec![],
            exception_table: vec![],
            attributes: vec![],
        };
        let env = MethodEnv {
            constants: &constants,
            this_class: &this_class,
            code: &code,
        };

        let mut current = frame(
            vec![
                VerificationType::Long,
                VerificationType::Top,
                VerificationType::Top,
            ],
            vec![],
        );
        let istore_1 = Instruction::Local {
            opcode: ISTORE,
            index: 1,
            form: crate::jvm::code::LocalForm::Short,
        };
        current.execute(&Instruction::Simple(ICONST_1), Label(0), &env).unwrap();
        current.execute(&istore_1, Label(1), &env).unwrap();
        assert_eq!(
            current.locals,
            vec![
                VerificationType::Top,
                VerificationType::Integer,
                VerificationType::Top
            ]
        );

        let lload_0 = Instruction::Local {
            opcode: LLOAD,
            index: 0,
            form: crate::jvm::code::LocalForm::Short,
        };
        assert!(matches!(
            current.execute(&lload_0, Label(2), &env),
            Err(VerifierErrorKind::InvalidType)
        ));
        assert!(matches!(
            current.execute(&Instruction::Simple(POP), Label(3), &env),
            Err(VerifierErrorKind::EmptyStack)
        ));
    }

    #[test]
    fn field_access() {
        let mut constants = ConstantPool::new();
        let class = constants.intern_class("com/x/Dog").unwrap();
        let name = constants.intern_utf8("names").unwrap();
        let descriptor = constants.intern_utf8("[Ljava/lang/String;").unwrap();
        let name_and_type = constants
            .push(Constant::NameAndType { name, descriptor })
            .unwrap();
        let names = constants
            .push(Constant::FieldRef(
                class,
                NameAndTypeConstantIndex(name_and_type),
            ))
            .unwrap();
        let this_class = BinaryName::OBJECT;
        let code = Code {
            max_stack: 2,
            max_locals: 1,
            instructions: vec![],
            source_offsets: vec![],
            exception_table: vec![],
            attributes: vec![],
        };
        let env = MethodEnv {
            constants: &constants,
            this_class: &this_class,
            code: &code,
        };
        let string_array =
            VerificationType::Object(RefType::<BinaryName>::parse("[Ljava/lang/String;").unwrap());

        let mut current = frame(vec![object("com/x/Dog")], vec![object("com/x/Dog")]);
        let getfield = Instruction::ConstantRef {
            opcode: GETFIELD,
            index: names,
        };
        current.execute(&getfield, Label(0), &env).unwrap();
        assert_eq!(current.stack, vec![string_array.clone()]);

        let getstatic = Instruction::ConstantRef {
            opcode: GETSTATIC,
            index: names,
        };
        current.execute(&getstatic, Label(1), &env).unwrap();
        assert_eq!(current.stack, vec![string_array.clone(), string_array]);

        let missing = Instruction::ConstantRef {
            opcode: GETSTATIC,
            index: class.0,
        };
        assert!(matches!(
            current.execute(&missing, Label(2), &env),
            Err(VerifierErrorKind::MissingConstant(_))
        ));
    }

    #[test]
    fn merging_frames() {
        let hierarchy = animals();
        let merger = TypeMerger::new(&hierarchy, vec![]);
        let mut current = frame(
            vec![object("com/x/Puppy"), VerificationType::Integer],
            vec![VerificationType::Null],
        );
        let incoming = frame(
            vec![object("com/x/Cat"), VerificationType::Float],
            vec![object("com/x/Dog")],
        );

        assert!(current.merge_from(&incoming, &merger, None).unwrap());
        assert_eq!(
            current,
            frame(
                vec![object("com/x/Animal"), VerificationType::Top],
                vec![object("com/x/Dog")],
            )
        );
        assert!(!current.merge_from(&incoming, &merger, None).unwrap());

        let taller = frame(vec![], vec![VerificationType::Integer, VerificationType::Integer]);
        assert!(matches!(
            current.merge_from(&taller, &merger, None),
            Err(VerifierErrorKind::StackHeightMismatch { .. })
        ));
        let primitive = frame(vec![], vec![VerificationType::Integer]);
        assert!(matches!(
            current.merge_from(&primitive, &merger, None),
            Err(VerifierErrorKind::InvalidType)
        ));
    }

    #[test]
    fn merging_through_unknown_classes() {
        let hierarchy = animals();
        let merger = TypeMerger::new(&hierarchy, vec![]);
        let mut current = frame(
            vec![object("org/lib/Widget")],
            vec![object("org/lib/Gadget")],
        );
        let incoming = frame(
            vec![object("com/x/Dog")],
            vec![object("com/x/Cat")],
        );
        let original = frame(
            vec![object("org/lib/Part")],
            vec![object("org/lib/Base"), VerificationType::Integer],
        );

        assert!(current
            .merge_from(&incoming, &merger, Some(&original))
            .unwrap());
        assert_eq!(
            current,
            frame(
                vec![object("org/lib/Part")],
                vec![object("java/lang/Object")],
            )
        );
    }

    #[test]
    fn serializable_frames() {
        let mut constants = ConstantPool::new();
        let current = frame(
            vec![
                object("java/lang/String"),
                VerificationType::Double,
                VerificationType::Top,
                VerificationType::Uninitialized(Label(1)),
                VerificationType::Top,
            ],
            vec![VerificationType::Long],
        );
        let serializable = current
            .to_serializable(&mut constants, &[0, 3, 7])
            .unwrap();
        let string = constants.intern_class("java/lang/String").unwrap();
        assert_eq!(
            serializable.locals,
            vec![
                VerificationType::Object(string),
                VerificationType::Double,
                VerificationType::Uninitialized(3),
            ]
        );
        assert_eq!(serializable.stack, vec![VerificationType::Long]);
    }

    #[test]
    fn compact_stack_map_frames() {
        let int = SerializedType::Integer;
        let previous = Frame {
            locals: vec![int, int],
            stack: vec![],
        };

        let same = Frame {
            locals: vec![int, int],
            stack: vec![],
        };
        assert_eq!(
            same.stack_map_frame(3, &previous),
            StackMapFrame::SameLocalsNoStack { offset_delta: 3 }
        );

        let one_stack = Frame {
            locals: vec![int, int],
            stack: vec![VerificationType::Float],
        };
        assert_eq!(
            one_stack.stack_map_frame(70, &previous),
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 70,
                stack: VerificationType::Float
            }
        );

        let chopped = Frame {
            locals: vec![int],
            stack: vec![],
        };
        assert_eq!(
            chopped.stack_map_frame(0, &previous),
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 0,
                chopped_k: 1
            }
        );

        let appended = Frame {
            locals: vec![int, int, VerificationType::Long],
            stack: vec![],
        };
        assert_eq!(
            appended.stack_map_frame(1, &previous),
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 1,
                locals: vec![VerificationType::Long]
            }
        );

        let different = Frame {
            locals: vec![VerificationType::Float],
            stack: vec![int, int],
        };
        assert_eq!(
            different.stack_map_frame(2, &previous),
            different.full_stack_map_frame(2)
        );
    }
}
