//! Type hierarchy resolution
//!
//! Computing stack map frames requires knowing how classes relate to each other: when two paths
//! through a method reach the same instruction with different reference types in the same slot,
//! the frame at that instruction must use their closest common superclass. Nothing here ever
//! loads or runs code. The hierarchy is pieced together from:
//!
//!   - the classes inside the archive being rewritten
//!   - a fixed table of common JDK types ([`JdkClasses`])
//!   - any other [`ClassLookup`] (eg. library archives, see [`LibraryClasses`])
//!
//! Classes that can't be found anywhere leave gaps in the hierarchy. Queries whose answer falls
//! into such a gap say so instead of guessing, and the caller decides what a safe answer is.

use crate::jvm::class_file::ClassFile;
use crate::jvm::{BinaryName, Error};
use elsa::sync::FrozenMap;
use std::collections::{HashMap, HashSet};

mod assignable;
mod classpath;
mod java_lib_types;

pub use classpath::*;
pub use java_lib_types::*;

/// What the hierarchy needs to know about a class or interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<BinaryName>,

    pub is_interface: bool,
}

impl ClassInfo {
    /// Extract the hierarchy information from a parsed class
    pub fn from_class(class: &ClassFile) -> Result<ClassInfo, Error> {
        let name = parse_name(class.name()?)?;
        let superclass = class.super_name()?.map(parse_name).transpose()?;
        let interfaces = class
            .interface_names()?
            .into_iter()
            .map(parse_name)
            .collect::<Result<_, _>>()?;
        Ok(ClassInfo {
            name,
            superclass,
            interfaces,
            is_interface: class.is_interface(),
        })
    }
}

fn parse_name(name: &str) -> Result<BinaryName, Error> {
    BinaryName::from_string(name.to_owned()).map_err(Error::MalformedClassFile)
}

/// Source of class information for classes outside of the archive being processed
///
/// Lookups may be slow (eg. reading from another archive), but the results get cached by
/// [`ClassHierarchy`].
pub trait ClassLookup: Sync {
    fn lookup(&self, name: &str) -> Option<ClassInfo>;
}

/// Resolves relationships between classes
///
/// Shared (read-only) between all of the worker threads processing an archive. The cache of
/// external lookups gets populated on demand, and two threads racing to look up the same class
/// just means one of the results is thrown away.
pub struct ClassHierarchy {
    /// Classes from the archive being processed
    local: HashMap<BinaryName, ClassInfo>,

    /// Consulted in order for anything not in `local`
    external: Vec<Box<dyn ClassLookup>>,

    /// External lookups done so far, including the ones that found nothing
    cache: FrozenMap<String, Box<Option<ClassInfo>>>,
}

impl ClassHierarchy {
    /// Hierarchy that knows only about the JDK types in [`JdkClasses`]
    pub fn new() -> ClassHierarchy {
        ClassHierarchy {
            local: HashMap::new(),
            external: vec![Box::new(JdkClasses)],
            cache: FrozenMap::new(),
        }
    }

    /// Add a source for classes that are not in the archive
    ///
    /// Sources added later are consulted later.
    pub fn add_lookup(&mut self, lookup: Box<dyn ClassLookup>) {
        self.external.push(lookup);
        self.cache = FrozenMap::new();
    }

    /// Add a class from the archive
    ///
    /// If two entries declare the same class, the first one wins.
    pub fn add_class(&mut self, class: ClassInfo) {
        self.local.entry(class.name.clone()).or_insert(class);
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Find information about a class
    pub fn resolve(&self, name: &str) -> Option<&ClassInfo> {
        if let Some(info) = self.local.get(name) {
            return Some(info);
        }
        if let Some(cached) = self.cache.get(name) {
            return cached.as_ref();
        }
        let found = self.external.iter().find_map(|lookup| lookup.lookup(name));
        if found.is_none() {
            log::debug!("Could not resolve {}", name);
        }
        self.cache.insert(name.to_owned(), Box::new(found)).as_ref()
    }

    /// Is the class or interface `sub_type` assignable to `super_type`?
    ///
    /// Unresolved classes are only assignable to themselves and `java/lang/Object`.
    pub fn is_subclass(&self, sub_type: &str, super_type: &str) -> bool {
        if sub_type == super_type || super_type == BinaryName::OBJECT.as_str() {
            return true;
        }

        // Optimization: if the super type is a class, then skip visiting interfaces
        let super_is_class = !self
            .resolve(super_type)
            .map_or(false, |info| info.is_interface);

        let mut supertypes_to_visit: Vec<&str> = vec![sub_type];
        let mut dont_revisit: HashSet<&str> = HashSet::new();
        dont_revisit.insert(sub_type);

        while let Some(class_name) = supertypes_to_visit.pop() {
            if class_name == super_type {
                return true;
            }
            let info = match self.resolve(class_name) {
                Some(info) => info,
                None => continue,
            };

            // Enqueue next types to visit
            if let Some(superclass) = &info.superclass {
                if dont_revisit.insert(superclass.as_str()) {
                    supertypes_to_visit.push(superclass.as_str());
                }
            }
            if !super_is_class {
                for interface in &info.interfaces {
                    if dont_revisit.insert(interface.as_str()) {
                        supertypes_to_visit.push(interface.as_str());
                    }
                }
            }
        }

        false
    }

    /// Superclasses of a class, starting with the class itself
    ///
    /// The walk stops early at the first class that can't be resolved.
    pub fn superclass_chain<'a>(&'a self, name: &'a BinaryName) -> SuperclassChain<'a> {
        let mut classes = vec![name];
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(name.as_str());
        let mut current = name;
        loop {
            let info = match self.resolve(current.as_str()) {
                Some(info) => info,
                None => {
                    return SuperclassChain {
                        classes,
                        complete: false,
                    }
                }
            };
            match &info.superclass {
                Some(superclass) if visited.insert(superclass.as_str()) => {
                    classes.push(superclass);
                    current = superclass;
                }
                Some(_) | None => {
                    return SuperclassChain {
                        classes,
                        complete: true,
                    }
                }
            }
        }
    }

    /// Closest class that both classes extend
    ///
    /// If one is assignable to the other, that's the answer. Otherwise interfaces don't take
    /// part: if either side is an interface, the answer is `java/lang/Object` (which is also what
    /// the verifier accepts for interface types).
    ///
    /// Returns `None` when an unresolved class hides the answer. `java/lang/Object` is always a
    /// correct (if imprecise) answer then, but callers may know something better.
    pub fn common_superclass(&self, class1: &BinaryName, class2: &BinaryName) -> Option<BinaryName> {
        if class1 == class2 {
            return Some(class1.clone());
        }
        if *class1 == BinaryName::OBJECT || *class2 == BinaryName::OBJECT {
            return Some(BinaryName::OBJECT);
        }
        if self.is_subclass(class2.as_str(), class1.as_str()) {
            return Some(class1.clone());
        }
        if self.is_subclass(class1.as_str(), class2.as_str()) {
            return Some(class2.clone());
        }

        let is_interface = |name: &BinaryName| {
            self.resolve(name.as_str())
                .map_or(false, |info| info.is_interface)
        };
        if is_interface(class1) || is_interface(class2) {
            return Some(BinaryName::OBJECT);
        }

        // The first shared class is exact even if the chains stop early: any closer common class
        // would have to be a superclass of it
        let chain1 = self.superclass_chain(class1);
        let chain2 = self.superclass_chain(class2);
        let ancestors2: HashSet<&BinaryName> = chain2.classes.iter().copied().collect();
        if let Some(common) = chain1.classes.iter().find(|class| ancestors2.contains(*class)) {
            return Some((*common).clone());
        }
        if chain1.complete && chain2.complete {
            return Some(BinaryName::OBJECT);
        }
        log::debug!(
            "Common superclass of {} and {} is hidden by unresolved classes",
            class1,
            class2
        );
        None
    }
}

/// Result of [`ClassHierarchy::superclass_chain`]
#[derive(Debug, PartialEq, Eq)]
pub struct SuperclassChain<'a> {
    pub classes: Vec<&'a BinaryName>,

    /// Whether the walk reached a class without a superclass (rather than an unresolved one)
    pub complete: bool,
}

impl Default for ClassHierarchy {
    fn default() -> Self {
        ClassHierarchy::new()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn class(name: &str, superclass: &str, interfaces: &[&str]) -> ClassInfo {
        ClassInfo {
            name: BinaryName::from_string(name.to_owned()).unwrap(),
            superclass: Some(BinaryName::from_string(superclass.to_owned()).unwrap()),
            interfaces: interfaces
                .iter()
                .map(|name| BinaryName::from_string(name.to_string()).unwrap())
                .collect(),
            is_interface: false,
        }
    }

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    /// Animal <- Dog <- Puppy, Animal <- Cat
    pub(crate) fn animals() -> ClassHierarchy {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(class("com/x/Animal", "java/lang/Object", &[]));
        hierarchy.add_class(class("com/x/Dog", "com/x/Animal", &["java/lang/Comparable"]));
        hierarchy.add_class(class("com/x/Puppy", "com/x/Dog", &[]));
        hierarchy.add_class(class("com/x/Cat", "com/x/Animal", &[]));
        hierarchy
    }

    #[test]
    fn local_classes() {
        let hierarchy = animals();
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Puppy"), &name("com/x/Cat")),
            Some(name("com/x/Animal"))
        );
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Puppy"), &name("com/x/Dog")),
            Some(name("com/x/Dog"))
        );
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Animal"), &name("com/x/Puppy")),
            Some(name("com/x/Animal"))
        );
        assert!(hierarchy.is_subclass("com/x/Puppy", "java/lang/Comparable"));
        assert!(!hierarchy.is_subclass("com/x/Cat", "com/x/Dog"));
    }

    #[test]
    fn jdk_classes() {
        let hierarchy = ClassHierarchy::new();
        assert_eq!(
            hierarchy.common_superclass(
                &name("java/lang/IllegalArgumentException"),
                &name("java/lang/IllegalStateException")
            ),
            Some(name("java/lang/RuntimeException"))
        );
        assert_eq!(
            hierarchy.common_superclass(&name("java/lang/Integer"), &name("java/lang/Long")),
            Some(name("java/lang/Number"))
        );
        assert_eq!(
            hierarchy.common_superclass(&BinaryName::STRING, &name("java/lang/Integer")),
            Some(BinaryName::OBJECT)
        );
    }

    #[test]
    fn jdk_exceptions() {
        let hierarchy = ClassHierarchy::new();
        let common = |class1: &str, class2: &str| {
            hierarchy.common_superclass(&name(class1), &name(class2))
        };
        assert_eq!(
            common(
                "java/lang/InterruptedException",
                "java/util/concurrent/ExecutionException"
            ),
            Some(name("java/lang/Exception"))
        );
        assert_eq!(
            common("java/util/concurrent/CancellationException", "java/lang/Throwable"),
            Some(BinaryName::THROWABLE)
        );
        assert_eq!(
            common("java/util/concurrent/TimeoutException", "java/io/IOException"),
            Some(name("java/lang/Exception"))
        );
        assert_eq!(
            common("java/net/SocketTimeoutException", "java/io/EOFException"),
            Some(name("java/io/IOException"))
        );
    }

    #[test]
    fn superclass_chains() {
        let hierarchy = animals();
        let puppy = name("com/x/Puppy");
        let chain = hierarchy.superclass_chain(&puppy);
        assert!(chain.complete);
        assert_eq!(
            chain.classes,
            vec![
                &puppy,
                &name("com/x/Dog"),
                &name("com/x/Animal"),
                &BinaryName::OBJECT
            ]
        );

        let mut hierarchy = animals();
        hierarchy.add_class(class("com/x/Plugin", "org/lib/Base", &[]));
        let plugin = name("com/x/Plugin");
        let chain = hierarchy.superclass_chain(&plugin);
        assert!(!chain.complete);
        assert_eq!(chain.classes, vec![&plugin, &name("org/lib/Base")]);
    }

    #[test]
    fn interfaces_and_unknowns_fall_back_to_object() {
        let hierarchy = animals();
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Puppy"), &name("java/lang/Comparable")),
            Some(name("java/lang/Comparable"))
        );
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Cat"), &name("java/lang/Comparable")),
            Some(BinaryName::OBJECT)
        );
        assert_eq!(
            hierarchy.common_superclass(
                &name("java/lang/CharSequence"),
                &name("java/lang/Comparable")
            ),
            Some(BinaryName::OBJECT)
        );
        assert_eq!(
            hierarchy.common_superclass(&name("org/lib/Missing"), &name("com/x/Dog")),
            None
        );
        assert!(hierarchy.resolve("org/lib/Missing").is_none());
    }

    struct Library;

    impl ClassLookup for Library {
        fn lookup(&self, name: &str) -> Option<ClassInfo> {
            match name {
                "org/lib/Base" => Some(class("org/lib/Base", "java/lang/Object", &[])),
                "org/lib/Sub" => Some(class("org/lib/Sub", "org/lib/Base", &[])),
                _ => None,
            }
        }
    }

    #[test]
    fn external_lookup() {
        let mut hierarchy = animals();
        hierarchy.add_class(class("com/x/Plugin", "org/lib/Base", &[]));
        hierarchy.add_class(class("com/x/Other", "org/lib/Base", &[]));
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Plugin"), &name("com/x/Other")),
            Some(name("org/lib/Base"))
        );
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Plugin"), &name("org/lib/Sub")),
            None
        );

        hierarchy.add_lookup(Box::new(Library));
        assert_eq!(
            hierarchy.common_superclass(&name("com/x/Plugin"), &name("org/lib/Sub")),
            Some(name("org/lib/Base"))
        );
    }
}
