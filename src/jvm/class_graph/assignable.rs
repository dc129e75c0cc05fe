use super::ClassHierarchy;
use crate::jvm::{ArrayType, BinaryName, RefType};

impl ClassHierarchy {
    /// Most specific reference type both types are assignable to
    ///
    /// Arrays of objects merge element-wise when they have the same number of dimensions. Other
    /// array pairs meet at the deepest `Object` array that holds both (or at `java/lang/Object`).
    /// `None` means unresolved classes hide the answer, as in
    /// [`ClassHierarchy::common_superclass`].
    pub fn common_ref_type(
        &self,
        type1: &RefType<BinaryName>,
        type2: &RefType<BinaryName>,
    ) -> Option<RefType<BinaryName>> {
        if type1 == type2 {
            return Some(type1.clone());
        }
        let merged = match (type1, type2) {
            (RefType::Object(cls1), RefType::Object(cls2)) => {
                RefType::Object(self.common_superclass(cls1, cls2)?)
            }
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
                if arr1.additional_dimensions == arr2.additional_dimensions =>
            {
                let element_type = self.common_superclass(&arr1.element_type, &arr2.element_type)?;
                RefType::ObjectArray(ArrayType {
                    additional_dimensions: arr1.additional_dimensions,
                    element_type,
                })
            }
            (RefType::Object(_), _) | (_, RefType::Object(_)) => RefType::Object(BinaryName::OBJECT),
            _ => match object_depth(type1).min(object_depth(type2)) {
                0 => RefType::Object(BinaryName::OBJECT),
                depth => RefType::ObjectArray(ArrayType {
                    additional_dimensions: depth - 1,
                    element_type: BinaryName::OBJECT,
                }),
            },
        };
        Some(merged)
    }
}

/// Number of array dimensions whose elements are references
fn object_depth(ref_type: &RefType<BinaryName>) -> usize {
    match ref_type {
        RefType::Object(_) => 0,
        RefType::ObjectArray(arr) => arr.dimensions(),
        RefType::PrimitiveArray(arr) => arr.additional_dimensions,
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::test::animals;
    use crate::jvm::{BinaryName, ParseDescriptor, RefType};

    fn ref_type(descriptor: &str) -> RefType<BinaryName> {
        RefType::parse(descriptor).unwrap()
    }

    fn merged(type1: &str, type2: &str) -> Option<RefType<BinaryName>> {
        animals().common_ref_type(&ref_type(type1), &ref_type(type2))
    }

    #[test]
    fn classes_and_object_arrays() {
        assert_eq!(merged("Lcom/x/Puppy;", "Lcom/x/Cat;"), Some(ref_type("Lcom/x/Animal;")));
        assert_eq!(merged("[Lcom/x/Puppy;", "[Lcom/x/Cat;"), Some(ref_type("[Lcom/x/Animal;")));
        assert_eq!(
            merged("[Lcom/x/Dog;", "Lcom/x/Dog;"),
            Some(ref_type("Ljava/lang/Object;"))
        );
    }

    #[test]
    fn primitive_arrays() {
        assert_eq!(merged("[I", "[J"), Some(ref_type("Ljava/lang/Object;")));
        assert_eq!(merged("[[I", "[Lcom/x/Dog;"), Some(ref_type("[Ljava/lang/Object;")));
        assert_eq!(merged("[[I", "[[I"), Some(ref_type("[[I")));
    }

    #[test]
    fn unresolved_elements() {
        assert_eq!(merged("Lorg/lib/Missing;", "Lcom/x/Cat;"), None);
        assert_eq!(merged("[Lorg/lib/Missing;", "[Lcom/x/Cat;"), None);
        assert_eq!(
            merged("[Lorg/lib/Missing;", "[[Lcom/x/Cat;"),
            Some(ref_type("[Ljava/lang/Object;"))
        );
    }
}
