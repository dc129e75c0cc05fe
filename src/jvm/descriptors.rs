use super::BinaryName;
use crate::util::Width;
use std::fmt;

/// Problem found while reading a field or method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError {
    /// Byte position in the descriptor where reading stopped
    pub position: usize,
    pub reason: String,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad descriptor at {}: {}", self.position, self.reason)
    }
}

impl std::error::Error for DescriptorError {}

/// Cursor over the text of a descriptor
pub struct DescriptorReader<'a> {
    text: &'a str,
    position: usize,
}

impl<'a> DescriptorReader<'a> {
    pub fn new(text: &'a str) -> DescriptorReader<'a> {
        DescriptorReader { text, position: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.position).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        Some(byte)
    }

    fn eat(&mut self, expected: u8) -> bool {
        let found = self.peek() == Some(expected);
        if found {
            self.position += 1;
        }
        found
    }

    fn error(&self, reason: impl Into<String>) -> DescriptorError {
        DescriptorError {
            position: self.position,
            reason: reason.into(),
        }
    }

    /// Everything up to the next `;`, which is consumed but not returned
    fn until_semicolon(&mut self) -> Result<&'a str, DescriptorError> {
        let text = self.text;
        let rest = &text[self.position..];
        let end = rest
            .find(';')
            .ok_or_else(|| self.error("unterminated class name"))?;
        self.position += end + 1;
        Ok(&rest[..end])
    }
}

/// Types that can be read out of a descriptor string
///
/// Rendering goes the other way through `Display`.
pub trait ParseDescriptor: Sized {
    /// Parse a complete descriptor, rejecting trailing input
    fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut reader = DescriptorReader::new(descriptor);
        let parsed = Self::read(&mut reader)?;
        if reader.peek().is_some() {
            return Err(reader.error("trailing characters"));
        }
        Ok(parsed)
    }

    fn read(reader: &mut DescriptorReader) -> Result<Self, DescriptorError>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub const fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    pub fn from_descriptor_char(c: u8) -> Option<BaseType> {
        const ALL: [BaseType; 8] = [
            BaseType::Byte,
            BaseType::Char,
            BaseType::Double,
            BaseType::Float,
            BaseType::Int,
            BaseType::Long,
            BaseType::Short,
            BaseType::Boolean,
        ];
        ALL.into_iter().find(|base| base.descriptor_char() == c as char)
    }

    /// Element type for the `atype` operand of `newarray`
    pub fn from_array_type_code(code: u8) -> Option<BaseType> {
        let base = match code {
            4 => BaseType::Boolean,
            5 => BaseType::Char,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Byte,
            9 => BaseType::Short,
            10 => BaseType::Int,
            11 => BaseType::Long,
            _ => return None,
        };
        Some(base)
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        if matches!(self, BaseType::Long | BaseType::Double) {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor_char())
    }
}

impl ParseDescriptor for BaseType {
    fn read(reader: &mut DescriptorReader) -> Result<Self, DescriptorError> {
        match reader.peek().and_then(BaseType::from_descriptor_char) {
            Some(base) => {
                reader.bump();
                Ok(base)
            }
            None => Err(reader.error("expected a primitive type")),
        }
    }
}

impl ParseDescriptor for BinaryName {
    fn read(reader: &mut DescriptorReader) -> Result<Self, DescriptorError> {
        if !reader.eat(b'L') {
            return Err(reader.error("expected 'L'"));
        }
        let start = reader.position;
        let name = reader.until_semicolon()?;
        BinaryName::from_string(name.to_owned()).map_err(|reason| DescriptorError {
            position: start,
            reason,
        })
    }
}

/// Array of some element type, with the element type kept outside of any nesting
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Dimensions beyond the first, so `A[]` has 0 and `A[][][]` has 2
    pub additional_dimensions: usize,
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }

    fn one_dimension(element_type: T) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: 0,
            element_type,
        }
    }

    fn deeper(self) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: self.additional_dimensions + 1,
            element_type: self.element_type,
        }
    }

    /// Array type of the components, or `None` for a single dimension
    fn shallower(&self) -> Option<ArrayType<T>>
    where
        T: Clone,
    {
        let additional_dimensions = self.additional_dimensions.checked_sub(1)?;
        Some(ArrayType {
            additional_dimensions,
            element_type: self.element_type.clone(),
        })
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl<C> RefType<C> {
    /// Array whose components have the given type
    pub fn array(component: FieldType<C>) -> RefType<C> {
        match component {
            FieldType::Base(base) => RefType::PrimitiveArray(ArrayType::one_dimension(base)),
            FieldType::Ref(RefType::Object(class)) => {
                RefType::ObjectArray(ArrayType::one_dimension(class))
            }
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(arr.deeper()),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(arr.deeper()),
        }
    }
}

impl<C: Clone> RefType<C> {
    /// Type of the components of an array type
    pub fn component(&self) -> Option<FieldType<C>> {
        let component = match self {
            RefType::Object(_) => return None,
            RefType::ObjectArray(arr) => match arr.shallower() {
                Some(inner) => FieldType::Ref(RefType::ObjectArray(inner)),
                None => FieldType::object(arr.element_type.clone()),
            },
            RefType::PrimitiveArray(arr) => match arr.shallower() {
                Some(inner) => FieldType::Ref(RefType::PrimitiveArray(inner)),
                None => FieldType::Base(arr.element_type),
            },
        };
        Some(component)
    }
}

/// `CONSTANT_Class_info` holds a binary name for classes and interfaces, but a full descriptor
/// for array types ([JVMS 4.4.1][0]).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
impl RefType<BinaryName> {
    pub fn from_class_constant(name: &str) -> Result<RefType<BinaryName>, DescriptorError> {
        if name.starts_with('[') {
            return RefType::parse(name);
        }
        BinaryName::from_string(name.to_owned())
            .map(RefType::Object)
            .map_err(|reason| DescriptorError {
                position: 0,
                reason,
            })
    }

    pub fn class_constant_name(&self) -> String {
        match self {
            RefType::Object(name) => name.as_str().to_owned(),
            array => array.to_string(),
        }
    }
}

impl<C: AsRef<str>> fmt::Display for RefType<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (brackets, element) = match self {
            RefType::Object(class) => return write!(f, "L{};", class.as_ref()),
            RefType::ObjectArray(arr) => {
                let element = format!("L{};", arr.element_type.as_ref());
                (arr.dimensions(), element)
            }
            RefType::PrimitiveArray(arr) => (arr.dimensions(), arr.element_type.to_string()),
        };
        write!(f, "{}{}", "[".repeat(brackets), element)
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn read(reader: &mut DescriptorReader) -> Result<Self, DescriptorError> {
        let mut dimensions: usize = 0;
        while reader.eat(b'[') {
            dimensions += 1;
        }
        let additional_dimensions = match dimensions.checked_sub(1) {
            None => return C::read(reader).map(RefType::Object),
            Some(additional) => additional,
        };
        if reader.peek() == Some(b'L') {
            Ok(RefType::ObjectArray(ArrayType {
                additional_dimensions,
                element_type: C::read(reader)?,
            }))
        } else {
            Ok(RefType::PrimitiveArray(ArrayType {
                additional_dimensions,
                element_type: BaseType::read(reader)?,
            }))
        }
    }
}

/// Type of a field, parameter, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> FieldType<C> {
    pub fn array(component: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(component))
    }

    pub const fn object(class: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class))
    }
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base) => base.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C: AsRef<str>> fmt::Display for FieldType<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => base.fmt(f),
            FieldType::Ref(ref_type) => ref_type.fmt(f),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn read(reader: &mut DescriptorReader) -> Result<Self, DescriptorError> {
        match reader.peek() {
            Some(b'L' | b'[') => RefType::read(reader).map(FieldType::Ref),
            Some(_) => BaseType::read(reader).map(FieldType::Base),
            None => Err(reader.error("missing field type")),
        }
    }
}

/// Parameter and return types of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C: AsRef<str>> fmt::Display for MethodDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            parameter.fmt(f)?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(return_type) => return_type.fmt(f),
            None => f.write_str("V"),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn read(reader: &mut DescriptorReader) -> Result<Self, DescriptorError> {
        if !reader.eat(b'(') {
            return Err(reader.error("expected '('"));
        }
        let mut parameters = vec![];
        while !reader.eat(b')') {
            if reader.peek().is_none() {
                return Err(reader.error("expected ')'"));
            }
            parameters.push(FieldType::read(reader)?);
        }
        let return_type = if reader.eat(b'V') {
            None
        } else {
            Some(FieldType::read(reader)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type FT = FieldType<BinaryName>;

    const INT: FT = FieldType::Base(BaseType::Int);
    const LONG: FT = FieldType::Base(BaseType::Long);
    const STRING: FT = FieldType::object(BinaryName::STRING);

    fn field(descriptor: &str) -> FT {
        let parsed = FT::parse(descriptor).unwrap();
        assert_eq!(parsed.to_string(), descriptor);
        parsed
    }

    #[test]
    fn field_types() {
        assert_eq!(field("Z"), FieldType::Base(BaseType::Boolean));
        assert_eq!(field("J").width(), 2);
        assert_eq!(field("Ljava/lang/String;"), STRING);
        assert_eq!(field("[Ljava/lang/String;"), FieldType::array(STRING));
        assert_eq!(
            field("[[[D"),
            FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 2,
                element_type: BaseType::Double,
            }))
        );

        assert!(FT::parse("").is_err());
        assert!(FT::parse("V").is_err());
        assert!(FT::parse("[").is_err());
        assert!(FT::parse("Ljava/lang/String").is_err());
        assert_eq!(FT::parse("II").unwrap_err().position, 1);
    }

    #[test]
    fn method_types() {
        let desc = MethodDescriptor::<BinaryName>::parse("(IJLjava/lang/String;)V").unwrap();
        assert_eq!(desc.parameters, vec![INT, LONG, STRING]);
        assert_eq!(desc.return_type, None);
        assert_eq!(desc.to_string(), "(IJLjava/lang/String;)V");

        let desc = MethodDescriptor::<BinaryName>::parse("()[I").unwrap();
        assert!(desc.parameters.is_empty());
        assert_eq!(desc.return_type, Some(FieldType::array(INT)));

        assert!(MethodDescriptor::<BinaryName>::parse("(I").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("I)V").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("()").is_err());
    }

    #[test]
    fn class_constant_names() {
        let string = RefType::from_class_constant("java/lang/String").unwrap();
        assert_eq!(string, RefType::Object(BinaryName::STRING));
        assert_eq!(string.class_constant_name(), "java/lang/String");
        assert_eq!(string.component(), None);

        let matrix = RefType::from_class_constant("[[Ljava/lang/String;").unwrap();
        assert_eq!(matrix.class_constant_name(), "[[Ljava/lang/String;");
        assert_eq!(matrix.component(), Some(FieldType::array(STRING)));

        let ints = RefType::from_class_constant("[I").unwrap();
        assert_eq!(ints.component(), Some(INT));
    }

    #[test]
    fn newarray_codes() {
        assert_eq!(BaseType::from_array_type_code(10), Some(BaseType::Int));
        assert_eq!(BaseType::from_array_type_code(4), Some(BaseType::Boolean));
        assert_eq!(BaseType::from_array_type_code(3), None);
    }
}
