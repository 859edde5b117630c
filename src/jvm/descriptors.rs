use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
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

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Array type
///
/// `A[]` has 0 additional dimensions, `A[][][][]` has 3. The element type is never itself an
/// array (the parser folds all leading `[` markers into the dimension count).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType {
    pub additional_dimensions: usize,
    pub element_type: Box<FieldType>,
}

impl RenderDescriptor for ArrayType {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

/// Type of a field, parameter, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    /// Primitive type
    Base(BaseType),

    /// Object type, by internal binary name (eg. `java/lang/String`)
    Object(String),

    /// Array type
    Array(ArrayType),
}

impl FieldType {
    /// Does a value of this type live on the heap (so a local variable slot holds a reference)?
    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    pub fn object(class_name: &str) -> FieldType {
        FieldType::Object(class_name.to_owned())
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub fn array(element_type: FieldType) -> FieldType {
        match element_type {
            FieldType::Array(arr) => FieldType::Array(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            other => FieldType::Array(ArrayType {
                additional_dimensions: 0,
                element_type: Box::new(other),
            }),
        }
    }
}

/// References take one local variable slot regardless of how deep the array nesting goes
impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Object(_) | FieldType::Array(_) => 1,
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Object(class_name) => {
                write_to.push('L');
                write_to.push_str(class_name);
                write_to.push(';');
            }
            FieldType::Array(array_type) => array_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        // All leading array markers fold into one dimension count; an array is one type (and,
        // inside a method descriptor, one parameter) no matter how many dimensions it has
        let mut dimensions = 0;
        while source.next_if_eq(&'[').is_some() {
            dimensions += 1;
        }

        let element = match source.peek().copied() {
            Some('L') => {
                source.next();
                let mut class_name = String::new();
                loop {
                    let c: char = source.next().ok_or_else(|| {
                        let msg = format!("Missing terminator for 'L{}'", class_name);
                        Error::new(ErrorKind::UnexpectedEof, msg)
                    })?;
                    if c == ';' {
                        break FieldType::Object(class_name);
                    }
                    class_name.push(c);
                }
            }
            Some(_) => FieldType::Base(BaseType::parse_from(source)?),
            None => {
                return Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type"));
            }
        };

        if dimensions == 0 {
            Ok(element)
        } else {
            Ok(FieldType::Array(ArrayType {
                additional_dimensions: dimensions - 1,
                element_type: Box::new(element),
            }))
        }
    }
}

/// Signature of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Local variable slot holding the given parameter at method-body start
    ///
    /// Instance methods reserve slot 0 for the receiver, and `long`/`double` parameters occupy
    /// two slots each, so a parameter's slot is the sum of the widths of everything before it.
    pub fn parameter_slot(&self, parameter: usize, is_static: bool) -> u16 {
        let mut slot: u16 = if is_static { 0 } else { 1 };
        for parameter_type in self.parameters.iter().take(parameter) {
            slot += parameter_type.width() as u16;
        }
        slot
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        }
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next_if_eq(&'(').is_none() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected method descriptor to start with `(`",
            ));
        }
        let mut parameters = vec![];
        loop {
            match source.peek().copied() {
                Some(')') => {
                    source.next();
                    break;
                }
                Some(_) => parameters.push(FieldType::parse_from(source)?),
                None => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        "Missing closing `)` in method descriptor",
                    ));
                }
            }
        }
        let return_type = match source.peek().copied() {
            Some('V') => {
                source.next();
                None
            }
            _ => Some(FieldType::parse_from(source)?),
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}
