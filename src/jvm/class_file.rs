use super::{
    take, ClassAccessFlags, ClassConstantIndex, CodeAttribute, ConstantPool, Deserialize,
    FieldAccessFlags, LineNumber, LocalVariable, MethodAccessFlags, Serialize, StackMapFrame,
    Utf8ConstantIndex,
};
use crate::jvm::binary_format::parse_exact;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Representation of the [`class` file format of the JVM][0]
///
/// The parse keeps everything it does not need to understand as opaque bytes: only the constant
/// pool, the member tables, and `Code` attributes (plus the code sub-tables whose entries hold
/// bytecode offsets) are interpreted structurally. Everything else round-trips untouched.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub(crate) const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file out of raw bytes
    ///
    /// Trailing bytes after the final attribute are an error: a class file that does not account
    /// for every byte did not parse the way the JVM would read it.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        let mut reader = bytes;
        let magic = take(&mut reader, 4)?;
        if magic != Self::MAGIC {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Missing class file magic header",
            ));
        }
        let version = Version::deserialize(&mut reader)?;
        let constants = ConstantPool::deserialize(&mut reader)?;
        let access_flags = ClassAccessFlags::deserialize(&mut reader)?;
        let this_class = ClassConstantIndex::deserialize(&mut reader)?;
        let super_class = ClassConstantIndex::deserialize(&mut reader)?;
        let interfaces = Vec::<ClassConstantIndex>::deserialize(&mut reader)?;

        let field_count = u16::deserialize(&mut reader)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(Field {
                access_flags: FieldAccessFlags::deserialize(&mut reader)?,
                name_index: Utf8ConstantIndex::deserialize(&mut reader)?,
                descriptor_index: Utf8ConstantIndex::deserialize(&mut reader)?,
                attributes: read_attributes(&mut reader, &constants, AttributeContext::Field)?,
            });
        }

        let method_count = u16::deserialize(&mut reader)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(Method {
                access_flags: MethodAccessFlags::deserialize(&mut reader)?,
                name_index: Utf8ConstantIndex::deserialize(&mut reader)?,
                descriptor_index: Utf8ConstantIndex::deserialize(&mut reader)?,
                attributes: read_attributes(&mut reader, &constants, AttributeContext::Method)?,
            });
        }

        let attributes = read_attributes(&mut reader, &constants, AttributeContext::Class)?;
        if !reader.is_empty() {
            let msg = format!("Unexpected {} trailing bytes after class file", reader.len());
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Internal binary name of the class (eg. `java/lang/String`)
    pub fn class_name(&self) -> Result<&str> {
        self.constants.class_name(self.this_class)
    }

    /// Declared source file name, if the class carries a `SourceFile` attribute
    pub fn source_file(&self) -> Result<Option<&str>> {
        for attribute in &self.attributes {
            if self.constants.utf8(attribute.name_index)? == "SourceFile" {
                if let AttributeInfo::Raw(info) = &attribute.info {
                    let index: Utf8ConstantIndex = parse_exact(info)?;
                    return Ok(Some(self.constants.utf8(index)?));
                }
            }
        }
        Ok(None)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(Version {
            minor_version: u16::deserialize(reader)?,
            major_version: u16::deserialize(reader)?,
        })
    }
}

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// The method's `Code` attribute (absent for `abstract` and `native` methods)
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|attribute| match &attribute.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.attributes
            .iter_mut()
            .find_map(|attribute| match &mut attribute.info {
                AttributeInfo::Code(code) => Some(code),
                _ => None,
            })
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Attributes (used on the class, fields, methods, and nested inside `Code` attributes)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: AttributeInfo,
}

/// Attribute payloads
///
/// Only the attributes whose bytes depend on bytecode positions are parsed structurally; the
/// rest round-trip as raw bytes so no attribute is ever dropped or reordered.
#[derive(Debug)]
pub enum AttributeInfo {
    /// `Code`, on methods
    Code(CodeAttribute),

    /// `StackMapTable`, inside `Code`
    StackMapTable(Vec<StackMapFrame>),

    /// `LineNumberTable`, inside `Code`
    LineNumberTable(Vec<LineNumber>),

    /// `LocalVariableTable` or `LocalVariableTypeTable`, inside `Code` (the two share a layout;
    /// the attribute name tells them apart)
    LocalVariableTable(Vec<LocalVariable>),

    /// Anything else, uninterpreted
    Raw(Vec<u8>),
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes and is always recomputed from content
        let mut info: Vec<u8> = vec![];
        match &self.info {
            AttributeInfo::Code(code) => code.serialize(&mut info)?,
            AttributeInfo::StackMapTable(frames) => frames.serialize(&mut info)?,
            AttributeInfo::LineNumberTable(lines) => lines.serialize(&mut info)?,
            AttributeInfo::LocalVariableTable(variables) => variables.serialize(&mut info)?,
            AttributeInfo::Raw(bytes) => info.extend_from_slice(bytes),
        }
        (info.len() as u32).serialize(writer)?;
        writer.write_all(&info)?;

        Ok(())
    }
}

/// Where an attribute table appears, which decides how much structure its entries get
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum AttributeContext {
    Class,
    Field,
    Method,
    Code,
}

pub(crate) fn read_attributes(
    reader: &mut &[u8],
    constants: &ConstantPool,
    context: AttributeContext,
) -> Result<Vec<Attribute>> {
    let count = u16::deserialize(reader)?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let length = u32::deserialize(reader)? as usize;
        let info_bytes = take(reader, length)?;
        let name = constants.utf8(name_index)?;
        let info = match (context, name) {
            (AttributeContext::Method, "Code") => {
                AttributeInfo::Code(CodeAttribute::parse(info_bytes, constants)?)
            }
            (AttributeContext::Code, "StackMapTable") => {
                AttributeInfo::StackMapTable(parse_exact(info_bytes)?)
            }
            (AttributeContext::Code, "LineNumberTable") => {
                AttributeInfo::LineNumberTable(parse_exact(info_bytes)?)
            }
            (AttributeContext::Code, "LocalVariableTable" | "LocalVariableTypeTable") => {
                AttributeInfo::LocalVariableTable(parse_exact(info_bytes)?)
            }
            _ => AttributeInfo::Raw(info_bytes.to_vec()),
        };
        attributes.push(Attribute { name_index, info });
    }
    Ok(attributes)
}
