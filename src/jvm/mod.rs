//! Reading and writing the JVM class file format
//!
//! The model here is deliberately shallow: the constant pool, member tables, and `Code`
//! attributes are structured, bytecode and unrecognized attributes stay as raw bytes, and
//! serializing a parsed class reproduces the input byte for byte.

mod access_flags;
mod binary_format;
mod class_file;
mod code;
mod constants;
mod descriptors;
mod events;

pub use access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use binary_format::{Deserialize, Serialize};
pub use class_file::{Attribute, AttributeInfo, ClassFile, Field, Method, Version};
pub use code::{
    CodeAttribute, ExceptionHandler, LineNumber, LocalVariable, SpliceOverflow, StackMapFrame,
    VerificationType,
};
pub use constants::{
    Constant, ConstantIndex, ConstantPool, ConstantPoolOverflow, ClassConstantIndex,
    MethodRefConstantIndex, NameAndTypeConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::{
    ArrayType, BaseType, FieldType, MethodDescriptor, ParseDescriptor, RenderDescriptor,
};
pub use events::{scan_header, structural_events, ClassEvent, ClassHeader};

pub(crate) use binary_format::take;
