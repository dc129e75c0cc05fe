use super::{Observer, Rewrite, Settings, Substitution};
use crate::jvm::class_file::{ClassFile, Version};
use crate::jvm::class_graph::ClassHierarchy;
use crate::jvm::code::{Code, Instruction, Label};
use crate::jvm::verifier::{recompute_frames, requires_frames, MethodInfo};
use crate::jvm::{BinaryName, ConstantPool, Error};
use rand::Rng;

/// What happened to one class
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassReport {
    /// Placeholder occurrences replaced (including the ones that kept their original text)
    pub substitutions: usize,

    /// Methods left with their original code
    pub failed_methods: usize,

    /// Did any `ldc` end up loading a different constant?
    pub changed: bool,
}

/// `ldc` whose string matched at least one rule
struct Match<'r> {
    label: Label,
    original: String,
    rewrite: Rewrite<'r>,
}

/// Rewrites the string constants loaded by the methods of a class
pub struct ClassRewriter<'a> {
    settings: &'a Settings,
    hierarchy: &'a ClassHierarchy,
    observer: &'a dyn Observer,
}

impl<'a> ClassRewriter<'a> {
    pub fn new(
        settings: &'a Settings,
        hierarchy: &'a ClassHierarchy,
        observer: &'a dyn Observer,
    ) -> ClassRewriter<'a> {
        ClassRewriter {
            settings,
            hierarchy,
            observer,
        }
    }

    /// Apply the rules to every `ldc` of a string constant in the class
    ///
    /// The class filter is not checked here. New strings are appended to the constant pool and
    /// the old ones are left in place. A method whose new code can't be finished (eg. its frames
    /// can't be computed) keeps its old code, which is reported to the observer. Errors returned
    /// are about the class as a whole.
    pub fn rewrite<R: Rng>(&self, class: &mut ClassFile, rng: &mut R) -> Result<ClassReport, Error> {
        let class_name = class.name()?.to_owned();
        let this_class =
            BinaryName::from_string(class_name.clone()).map_err(Error::MalformedClassFile)?;
        let mut report = ClassReport::default();

        let ClassFile {
            version,
            constants,
            methods,
            ..
        } = class;

        for method in methods.iter_mut() {
            let name = method.name(constants)?.to_owned();
            let descriptor = method.descriptor(constants)?.to_owned();
            let is_static = method.is_static();
            let code = match method.code_mut() {
                Some(code) => code,
                None => continue,
            };

            let matches = self.find_matches(code, constants, rng);
            if matches.is_empty() {
                continue;
            }

            let info = MethodInfo {
                this_class: &this_class,
                name: &name,
                descriptor: &descriptor,
                is_static,
            };
            match self.rewrite_code(code, &matches, *version, &info, constants) {
                Ok(Some(new_code)) => {
                    *code = new_code;
                    report.changed = true;
                }
                Ok(None) => (),
                Err(err) => {
                    self.observer
                        .method_failed(&class_name, &name, &descriptor, &err);
                    report.failed_methods += 1;
                    continue;
                }
            }

            for found in &matches {
                for replacement in &found.rewrite.replacements {
                    self.observer.substituted(&Substitution {
                        class: &class_name,
                        method: &name,
                        method_descriptor: &descriptor,
                        key: replacement.key,
                        replacement: &replacement.replacement,
                    });
                    report.substitutions += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run the rules over the strings loaded by `ldc`s
    fn find_matches<R: Rng>(
        &self,
        code: &Code,
        constants: &ConstantPool,
        rng: &mut R,
    ) -> Vec<Match<'a>> {
        let mut matches = vec![];
        for (idx, insn) in code.instructions.iter().enumerate() {
            let text = match insn.ldc_index().and_then(|index| constants.get_string(index)) {
                Some(text) => text,
                None => continue,
            };
            let rewrite = self.settings.rules.rewrite(text, rng);
            if !rewrite.replacements.is_empty() {
                matches.push(Match {
                    label: Label(idx),
                    original: text.to_owned(),
                    rewrite,
                });
            }
        }
        matches
    }

    /// Build the new code of a method, or `None` if no constant actually changed
    fn rewrite_code(
        &self,
        code: &Code,
        matches: &[Match],
        version: Version,
        method: &MethodInfo,
        constants: &mut ConstantPool,
    ) -> Result<Option<Code>, Error> {
        let needs_frames = requires_frames(version, code, constants);
        let mut new_code = code.clone();
        let mut changed = false;

        for found in matches {
            if !found.rewrite.changed(&found.original) {
                continue;
            }
            let utf8 = constants.intern_utf8(&found.rewrite.text)?;
            let string = constants.intern_string(utf8)?;
            if let Instruction::Ldc { index, wide } = &mut new_code.instructions[found.label.0] {
                *index = string.0;
                *wide = *wide || index.0 > u8::MAX as u16;
                changed = true;
            }
        }
        if !changed {
            return Ok(None);
        }

        // Only a change of layout (`ldc` becoming `ldc_w`) invalidates offsets. Frames are
        // recomputed first so the old `StackMapTable` can still be consulted.
        if new_code.layout()? != code.layout()? {
            if needs_frames {
                recompute_frames(&mut new_code, method, constants, self.hierarchy)?;
            }
            let dropped = new_code.drop_offset_sensitive_attributes(constants);
            if !dropped.is_empty() {
                log::debug!(
                    "Dropped {} from {}.{}{}",
                    dropped.join(", "),
                    method.this_class,
                    method.name,
                    method.descriptor
                );
            }
        }

        new_code.assemble()?;
        Ok(Some(new_code))
    }
}
