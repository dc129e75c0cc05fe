use super::{AnalysisType, VerificationType};
use crate::jvm::class_graph::ClassHierarchy;
use crate::jvm::{BinaryName, RefType};
use std::collections::HashSet;

/// Joins the types that reach the same instruction along different paths
///
/// Reference types meet at their closest common superclass. When unresolved classes hide that
/// class, the merge picks the first of these that applies:
///
///   - the type the method's original `StackMapTable` had in that slot, which the JVM already
///     accepted for the same instructions
///   - `java/lang/Throwable`, if both sides are known to be exceptions
///   - `java/lang/Object`
pub struct TypeMerger<'a> {
    hierarchy: &'a ClassHierarchy,

    /// Catch types of the method's exception handlers, which the verifier guarantees extend
    /// `java/lang/Throwable` whether or not their hierarchy can be resolved
    catch_types: HashSet<BinaryName>,
}

impl<'a> TypeMerger<'a> {
    pub fn new(
        hierarchy: &'a ClassHierarchy,
        catch_types: impl IntoIterator<Item = BinaryName>,
    ) -> TypeMerger<'a> {
        TypeMerger {
            hierarchy,
            catch_types: catch_types.into_iter().collect(),
        }
    }

    /// Most specific type that both types can be used as
    ///
    /// Primitives only merge with themselves. Anything that doesn't merge becomes `Top`.
    /// `original` is the type previously recorded for the same slot, if there is one.
    pub fn merge(
        &self,
        type1: &AnalysisType,
        type2: &AnalysisType,
        original: Option<&AnalysisType>,
    ) -> AnalysisType {
        use VerificationType::*;

        match (type1, type2) {
            _ if type1 == type2 => type1.clone(),
            (Null, Object(ref_type)) | (Object(ref_type), Null) => Object(ref_type.clone()),
            (Object(ref1), Object(ref2)) => Object(self.merge_references(ref1, ref2, original)),
            _ => Top,
        }
    }

    fn merge_references(
        &self,
        ref1: &RefType<BinaryName>,
        ref2: &RefType<BinaryName>,
        original: Option<&AnalysisType>,
    ) -> RefType<BinaryName> {
        if let Some(merged) = self.hierarchy.common_ref_type(ref1, ref2) {
            return merged;
        }
        if let Some(VerificationType::Object(original)) = original {
            log::debug!(
                "Merging {:?} and {:?} as previously recorded {:?}",
                ref1,
                ref2,
                original
            );
            return original.clone();
        }
        if self.is_throwable(ref1) && self.is_throwable(ref2) {
            RefType::Object(BinaryName::THROWABLE)
        } else {
            RefType::Object(BinaryName::OBJECT)
        }
    }

    /// Is the type known to extend `java/lang/Throwable`?
    fn is_throwable(&self, ref_type: &RefType<BinaryName>) -> bool {
        let class = match ref_type {
            RefType::Object(class) => class,
            _ => return false,
        };
        self.hierarchy
            .superclass_chain(class)
            .classes
            .into_iter()
            .any(|class| *class == BinaryName::THROWABLE || self.catch_types.contains(class))
    }
}
