#![allow(dead_code)]

use jar_string_replacer::archive::Entry;
use jar_string_replacer::jvm::class_file::{
    Attribute, AttributeBody, ClassFile, CodeAttribute, CodeAttributeBody, LineNumber, Method,
    Version,
};
use jar_string_replacer::jvm::code::opcodes::*;
use jar_string_replacer::jvm::code::{Code, Instruction, Label, LocalForm};
use jar_string_replacer::jvm::{
    ClassAccessFlags, ClassConstantIndex, ConstantIndex, ConstantPool, Error, MethodAccessFlags,
};
use jar_string_replacer::replace::{Observer, Substitution};
use std::sync::Mutex;

/// Assemble a class in memory, one method at a time
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str, version: Version) -> ClassBuilder {
        let mut constants = ConstantPool::new();
        let this_class = constants.intern_class(name).unwrap();
        let super_class = constants.intern_class("java/lang/Object").unwrap();
        ClassBuilder {
            class: ClassFile {
                version,
                constants,
                access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                this_class,
                super_class: Some(super_class),
                interfaces: vec![],
                fields: vec![],
                methods: vec![],
                attributes: vec![],
            },
        }
    }

    /// Index of a string constant
    pub fn string(&mut self, text: &str) -> ConstantIndex {
        let utf8 = self.class.constants.intern_utf8(text).unwrap();
        self.class.constants.intern_string(utf8).unwrap().0
    }

    /// Index of a class constant
    pub fn class(&mut self, name: &str) -> ClassConstantIndex {
        self.class.constants.intern_class(name).unwrap()
    }

    /// Fill the constant pool so that the next constant lands past the `ldc` range
    pub fn fill_constant_pool(&mut self) {
        let mut idx = 0;
        while self.class.constants.count() <= 256 {
            self.class
                .constants
                .intern_utf8(&format!("filler {}", idx))
                .unwrap();
            idx += 1;
        }
    }

    pub fn method(&mut self, name: &str, descriptor: &str, is_static: bool, code: Code) {
        let constants = &mut self.class.constants;
        let name_index = constants.intern_utf8(name).unwrap();
        let descriptor_index = constants.intern_utf8(descriptor).unwrap();
        let code_name = constants.intern_utf8(Code::NAME).unwrap();
        let mut access_flags = MethodAccessFlags::PUBLIC;
        if is_static {
            access_flags |= MethodAccessFlags::STATIC;
        }
        self.class.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![Attribute {
                name_index: code_name,
                body: AttributeBody::Code(code),
            }],
        });
    }

    /// Add `static String <name>() { return <text>; }`
    pub fn constant_method(&mut self, name: &str, text: &str) {
        let index = self.string(text);
        let code = Code {
            max_stack: 1,
            max_locals: 0,
            instructions: vec![
                Instruction::Ldc { index, wide: false },
                Instruction::Simple(ARETURN),
            ],
            source_offsets: vec![],
            exception_table: vec![],
            attributes: vec![],
        };
        self.method(name, "()Ljava/lang/String;", true, code);
    }

    /// Add `static String pick(boolean b) { return b ? first : second; }`, with line numbers
    ///
    /// Instruction offsets are `[0, 1, 4, 6, 9, 11]`, and the two loads are on lines 2 and 3.
    pub fn pick_method(&mut self, first: &str, second: &str) {
        let first = self.string(first);
        let second = self.string(second);
        let lines = self
            .class
            .constants
            .intern_utf8(CodeAttribute::LINE_NUMBER_TABLE)
            .unwrap();
        let code = Code {
            max_stack: 1,
            max_locals: 1,
            instructions: vec![
                Instruction::Local {
                    opcode: ILOAD,
                    index: 0,
                    form: LocalForm::Short,
                },
                Instruction::Branch {
                    opcode: IFEQ,
                    target: Label(4),
                },
                Instruction::Ldc {
                    index: first,
                    wide: false,
                },
                Instruction::Branch {
                    opcode: GOTO,
                    target: Label(5),
                },
                Instruction::Ldc {
                    index: second,
                    wide: false,
                },
                Instruction::Simple(ARETURN),
            ],
            source_offsets: vec![],
            exception_table: vec![],
            attributes: vec![CodeAttribute {
                name_index: lines,
                body: CodeAttributeBody::LineNumberTable(vec![
                    LineNumber {
                        start: Label(0),
                        line_number: 1,
                    },
                    LineNumber {
                        start: Label(2),
                        line_number: 2,
                    },
                    LineNumber {
                        start: Label(4),
                        line_number: 3,
                    },
                ]),
            }],
        };
        self.method("pick", "(Z)Ljava/lang/String;", true, code);
    }

    pub fn finish(self) -> ClassFile {
        self.class
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.class.to_bytes().unwrap()
    }
}

/// Text of the string constants loaded by each method, in order
pub fn loaded_strings(class: &ClassFile) -> Vec<Vec<String>> {
    class
        .methods
        .iter()
        .map(|method| {
            let code = method.code().unwrap();
            code.instructions
                .iter()
                .filter_map(|insn| insn.ldc_index())
                .map(|index| class.constants.get_string(index).unwrap().to_owned())
                .collect()
        })
        .collect()
}

pub fn class_entry(class_name: &str, bytes: Vec<u8>) -> Entry {
    Entry::file(format!("{}.class", class_name), bytes)
}

/// Observer that remembers what it was told
#[derive(Default)]
pub struct Recording {
    pub substitutions: Mutex<Vec<String>>,
    pub failed_classes: Mutex<Vec<String>>,
    pub failed_methods: Mutex<Vec<String>>,
}

impl Observer for Recording {
    fn substituted(&self, substitution: &Substitution) {
        self.substitutions.lock().unwrap().push(format!(
            "{}.{}{}: {} -> {}",
            substitution.class,
            substitution.method,
            substitution.method_descriptor,
            substitution.key,
            substitution.replacement
        ));
    }

    fn class_failed(&self, entry_name: &str, _error: &Error) {
        self.failed_classes.lock().unwrap().push(entry_name.to_owned());
    }

    fn method_failed(&self, class: &str, method: &str, method_descriptor: &str, _error: &Error) {
        self.failed_methods
            .lock()
            .unwrap()
            .push(format!("{}.{}{}", class, method, method_descriptor));
    }
}
