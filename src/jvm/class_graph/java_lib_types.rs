use super::{ClassInfo, ClassLookup};
use crate::jvm::BinaryName;

/// Lookup for a fixed set of JDK types
///
/// These are the classes most likely to show up when two branches of a method merge: boxes,
/// strings and builders, collections, and the exception types found in `catch` blocks.
pub struct JdkClasses;

/// Class name, superclass, interfaces
type Entry = (&'static str, Option<&'static str>, &'static [&'static str]);

const CLASSES: &[Entry] = &[
    ("java/lang/Object", None, &[]),
    ("java/lang/String", Some(OBJECT), &[SERIALIZABLE, COMPARABLE, CHAR_SEQUENCE]),
    ("java/lang/Class", Some(OBJECT), &[SERIALIZABLE]),
    ("java/lang/Enum", Some(OBJECT), &[COMPARABLE, SERIALIZABLE]),
    ("java/lang/Number", Some(OBJECT), &[SERIALIZABLE]),
    ("java/lang/Byte", Some(NUMBER), &[COMPARABLE]),
    ("java/lang/Short", Some(NUMBER), &[COMPARABLE]),
    ("java/lang/Integer", Some(NUMBER), &[COMPARABLE]),
    ("java/lang/Long", Some(NUMBER), &[COMPARABLE]),
    ("java/lang/Float", Some(NUMBER), &[COMPARABLE]),
    ("java/lang/Double", Some(NUMBER), &[COMPARABLE]),
    ("java/lang/Boolean", Some(OBJECT), &[SERIALIZABLE, COMPARABLE]),
    ("java/lang/Character", Some(OBJECT), &[SERIALIZABLE, COMPARABLE]),
    ("java/lang/AbstractStringBuilder", Some(OBJECT), &["java/lang/Appendable", CHAR_SEQUENCE]),
    ("java/lang/StringBuilder", Some("java/lang/AbstractStringBuilder"), &[SERIALIZABLE, CHAR_SEQUENCE]),
    ("java/lang/StringBuffer", Some("java/lang/AbstractStringBuilder"), &[SERIALIZABLE, CHAR_SEQUENCE]),
    ("java/lang/Thread", Some(OBJECT), &["java/lang/Runnable"]),
    ("java/lang/Throwable", Some(OBJECT), &[SERIALIZABLE]),
    ("java/lang/Exception", Some(THROWABLE), &[]),
    ("java/lang/Error", Some(THROWABLE), &[]),
    ("java/lang/AssertionError", Some(ERROR), &[]),
    ("java/lang/LinkageError", Some(ERROR), &[]),
    ("java/lang/NoClassDefFoundError", Some(LINKAGE_ERROR), &[]),
    ("java/lang/ExceptionInInitializerError", Some(LINKAGE_ERROR), &[]),
    ("java/lang/ClassFormatError", Some(LINKAGE_ERROR), &[]),
    ("java/lang/UnsupportedClassVersionError", Some("java/lang/ClassFormatError"), &[]),
    ("java/lang/UnsatisfiedLinkError", Some(LINKAGE_ERROR), &[]),
    ("java/lang/VerifyError", Some(LINKAGE_ERROR), &[]),
    ("java/lang/IncompatibleClassChangeError", Some(LINKAGE_ERROR), &[]),
    ("java/lang/AbstractMethodError", Some(INCOMPATIBLE_CLASS_CHANGE), &[]),
    ("java/lang/NoSuchFieldError", Some(INCOMPATIBLE_CLASS_CHANGE), &[]),
    ("java/lang/NoSuchMethodError", Some(INCOMPATIBLE_CLASS_CHANGE), &[]),
    ("java/lang/VirtualMachineError", Some(ERROR), &[]),
    ("java/lang/OutOfMemoryError", Some("java/lang/VirtualMachineError"), &[]),
    ("java/lang/StackOverflowError", Some("java/lang/VirtualMachineError"), &[]),
    ("java/lang/InternalError", Some("java/lang/VirtualMachineError"), &[]),
    ("java/lang/ThreadDeath", Some(ERROR), &[]),
    ("java/io/IOError", Some(ERROR), &[]),
    ("java/lang/RuntimeException", Some(EXCEPTION), &[]),
    ("java/lang/IllegalArgumentException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/NumberFormatException", Some("java/lang/IllegalArgumentException"), &[]),
    ("java/lang/IllegalStateException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/NullPointerException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/ClassCastException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/ArithmeticException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/UnsupportedOperationException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/SecurityException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/IndexOutOfBoundsException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/ArrayIndexOutOfBoundsException", Some("java/lang/IndexOutOfBoundsException"), &[]),
    ("java/lang/StringIndexOutOfBoundsException", Some("java/lang/IndexOutOfBoundsException"), &[]),
    ("java/lang/NegativeArraySizeException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/ArrayStoreException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/IllegalMonitorStateException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/TypeNotPresentException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/reflect/UndeclaredThrowableException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/lang/InterruptedException", Some(EXCEPTION), &[]),
    ("java/lang/CloneNotSupportedException", Some(EXCEPTION), &[]),
    ("java/lang/ReflectiveOperationException", Some(EXCEPTION), &[]),
    ("java/lang/ClassNotFoundException", Some(REFLECTIVE_EXCEPTION), &[]),
    ("java/lang/NoSuchMethodException", Some(REFLECTIVE_EXCEPTION), &[]),
    ("java/lang/NoSuchFieldException", Some(REFLECTIVE_EXCEPTION), &[]),
    ("java/lang/InstantiationException", Some(REFLECTIVE_EXCEPTION), &[]),
    ("java/lang/IllegalAccessException", Some(REFLECTIVE_EXCEPTION), &[]),
    ("java/lang/reflect/InvocationTargetException", Some(REFLECTIVE_EXCEPTION), &[]),
    ("java/io/IOException", Some(EXCEPTION), &[]),
    ("java/io/FileNotFoundException", Some(IO_EXCEPTION), &[]),
    ("java/io/EOFException", Some(IO_EXCEPTION), &[]),
    ("java/io/UTFDataFormatException", Some(IO_EXCEPTION), &[]),
    ("java/io/UnsupportedEncodingException", Some(IO_EXCEPTION), &[]),
    ("java/io/InterruptedIOException", Some(IO_EXCEPTION), &[]),
    ("java/io/ObjectStreamException", Some(IO_EXCEPTION), &[]),
    ("java/io/InvalidObjectException", Some("java/io/ObjectStreamException"), &[]),
    ("java/io/NotSerializableException", Some("java/io/ObjectStreamException"), &[]),
    ("java/io/UncheckedIOException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/net/SocketException", Some(IO_EXCEPTION), &[]),
    ("java/net/ConnectException", Some("java/net/SocketException"), &[]),
    ("java/net/SocketTimeoutException", Some("java/io/InterruptedIOException"), &[]),
    ("java/net/UnknownHostException", Some(IO_EXCEPTION), &[]),
    ("java/net/MalformedURLException", Some(IO_EXCEPTION), &[]),
    ("java/net/URISyntaxException", Some(EXCEPTION), &[]),
    ("java/nio/charset/CharacterCodingException", Some(IO_EXCEPTION), &[]),
    ("java/nio/file/FileSystemException", Some(IO_EXCEPTION), &[]),
    ("java/nio/file/NoSuchFileException", Some(FILE_SYSTEM_EXCEPTION), &[]),
    ("java/nio/file/AccessDeniedException", Some(FILE_SYSTEM_EXCEPTION), &[]),
    ("java/nio/file/FileAlreadyExistsException", Some(FILE_SYSTEM_EXCEPTION), &[]),
    ("java/util/zip/ZipException", Some(IO_EXCEPTION), &[]),
    ("java/util/zip/DataFormatException", Some(EXCEPTION), &[]),
    ("java/text/ParseException", Some(EXCEPTION), &[]),
    ("java/sql/SQLException", Some(EXCEPTION), &["java/lang/Iterable"]),
    ("java/security/GeneralSecurityException", Some(EXCEPTION), &[]),
    ("java/security/NoSuchAlgorithmException", Some(SECURITY_EXCEPTION), &[]),
    ("java/security/KeyException", Some(SECURITY_EXCEPTION), &[]),
    ("java/security/InvalidKeyException", Some("java/security/KeyException"), &[]),
    ("java/util/NoSuchElementException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/util/ConcurrentModificationException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/util/MissingResourceException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/util/EmptyStackException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/util/concurrent/ExecutionException", Some(EXCEPTION), &[]),
    ("java/util/concurrent/TimeoutException", Some(EXCEPTION), &[]),
    ("java/util/concurrent/BrokenBarrierException", Some(EXCEPTION), &[]),
    ("java/util/concurrent/CancellationException", Some("java/lang/IllegalStateException"), &[]),
    ("java/util/concurrent/CompletionException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/util/concurrent/RejectedExecutionException", Some(RUNTIME_EXCEPTION), &[]),
    ("java/util/AbstractCollection", Some(OBJECT), &[COLLECTION]),
    ("java/util/AbstractList", Some("java/util/AbstractCollection"), &[LIST]),
    ("java/util/ArrayList", Some("java/util/AbstractList"), &[LIST, SERIALIZABLE, CLONEABLE]),
    ("java/util/AbstractSet", Some("java/util/AbstractCollection"), &[SET]),
    ("java/util/HashSet", Some("java/util/AbstractSet"), &[SET, SERIALIZABLE, CLONEABLE]),
    ("java/util/LinkedHashSet", Some("java/util/HashSet"), &[SET, SERIALIZABLE, CLONEABLE]),
    ("java/util/AbstractMap", Some(OBJECT), &[MAP]),
    ("java/util/HashMap", Some("java/util/AbstractMap"), &[MAP, SERIALIZABLE, CLONEABLE]),
    ("java/util/LinkedHashMap", Some("java/util/HashMap"), &[MAP]),
    ("java/util/TreeMap", Some("java/util/AbstractMap"), &[MAP, SERIALIZABLE, CLONEABLE]),
];

/// Interface name, super-interfaces
const INTERFACES: &[(&str, &[&str])] = &[
    (SERIALIZABLE, &[]),
    (CLONEABLE, &[]),
    (COMPARABLE, &[]),
    (CHAR_SEQUENCE, &[]),
    ("java/lang/Appendable", &[]),
    ("java/lang/Runnable", &[]),
    ("java/lang/AutoCloseable", &[]),
    ("java/io/Closeable", &["java/lang/AutoCloseable"]),
    ("java/lang/Iterable", &[]),
    (COLLECTION, &["java/lang/Iterable"]),
    (LIST, &[COLLECTION]),
    (SET, &[COLLECTION]),
    (MAP, &[]),
];

const OBJECT: &str = "java/lang/Object";
const NUMBER: &str = "java/lang/Number";
const THROWABLE: &str = "java/lang/Throwable";
const EXCEPTION: &str = "java/lang/Exception";
const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
const REFLECTIVE_EXCEPTION: &str = "java/lang/ReflectiveOperationException";
const ERROR: &str = "java/lang/Error";
const LINKAGE_ERROR: &str = "java/lang/LinkageError";
const INCOMPATIBLE_CLASS_CHANGE: &str = "java/lang/IncompatibleClassChangeError";
const IO_EXCEPTION: &str = "java/io/IOException";
const FILE_SYSTEM_EXCEPTION: &str = "java/nio/file/FileSystemException";
const SECURITY_EXCEPTION: &str = "java/security/GeneralSecurityException";
const SERIALIZABLE: &str = "java/io/Serializable";
const CLONEABLE: &str = "java/lang/Cloneable";
const COMPARABLE: &str = "java/lang/Comparable";
const CHAR_SEQUENCE: &str = "java/lang/CharSequence";
const COLLECTION: &str = "java/util/Collection";
const LIST: &str = "java/util/List";
const SET: &str = "java/util/Set";
const MAP: &str = "java/util/Map";

fn names(names: &[&'static str]) -> Vec<BinaryName> {
    names.iter().map(|name| BinaryName::from_static(*name)).collect()
}

impl ClassLookup for JdkClasses {
    fn lookup(&self, name: &str) -> Option<ClassInfo> {
        if let Some((name, superclass, interfaces)) = CLASSES.iter().find(|cls| cls.0 == name) {
            return Some(ClassInfo {
                name: BinaryName::from_static(*name),
                superclass: superclass.map(BinaryName::from_static),
                interfaces: names(interfaces),
                is_interface: false,
            });
        }
        INTERFACES
            .iter()
            .find(|iface| iface.0 == name)
            .map(|(name, interfaces)| ClassInfo {
                name: BinaryName::from_static(*name),
                superclass: Some(BinaryName::OBJECT),
                interfaces: names(interfaces),
                is_interface: true,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_supertype_is_known() {
        for (name, superclass, interfaces) in CLASSES {
            BinaryName::check_valid(name).unwrap();
            if let Some(superclass) = superclass {
                let found = JdkClasses.lookup(superclass).unwrap();
                assert!(!found.is_interface, "superclass of {} is a class", name);
            }
            for interface in *interfaces {
                let found = JdkClasses.lookup(interface).unwrap();
                assert!(found.is_interface, "{} is an interface", interface);
            }
        }
        assert_eq!(JdkClasses.lookup("java/lang/Object").unwrap().superclass, None);

        let mut seen = std::collections::HashSet::new();
        for (name, _, _) in CLASSES {
            assert!(seen.insert(*name), "{} is listed once", name);
        }
        assert!(JdkClasses.lookup("com/x/Foo").is_none());
    }
}
