use std::borrow::{Borrow, Cow};
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of classes and interfaces, in internal form (`java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Borrow<str> for BinaryName {
    fn borrow(&self) -> &str {
        self.0.as_ref()
    }
}

impl BinaryName {
    /// Check if a string would be a valid binary name
    pub fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(format!("Binary name '{}' is empty", name));
        }
        for segment in name.split('/') {
            if segment.is_empty() {
                return Err(format!("Binary name '{}' has an empty segment", name));
            } else if segment.contains(&['.', ';', '['][..]) {
                return Err(format!(
                    "Binary name '{}' contains an illegal character",
                    name
                ));
            }
        }
        Ok(())
    }

    /// Try to construct a name from a string
    pub fn from_string(name: String) -> Result<BinaryName, String> {
        BinaryName::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }

    /// Extact the raw underlying string name
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    /// Name from a string known to be valid
    pub(crate) const fn from_static(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    pub const CLASS: Self = Self::from_static("java/lang/Class");
    pub const CLONEABLE: Self = Self::from_static("java/lang/Cloneable");
    pub const METHODHANDLE: Self = Self::from_static("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::from_static("java/lang/invoke/MethodType");
    pub const OBJECT: Self = Self::from_static("java/lang/Object");
    pub const SERIALIZABLE: Self = Self::from_static("java/io/Serializable");
    pub const STRING: Self = Self::from_static("java/lang/String");
    pub const THROWABLE: Self = Self::from_static("java/lang/Throwable");
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

/// Name of instance initialization methods
pub const INIT: &str = "<init>";
