use super::class_file::{AttributeInfo, ClassFile};
use super::constants::Constant;
use super::{take, Deserialize, Version};
use std::io::{Error, ErrorKind, Result};

/// Structural observations made while walking a parsed class, in the order a rewriting pass
/// wants to consume them
///
/// Per method, every `ParameterAnnotation` is emitted before the `BodyStart`, regardless of how
/// the attributes were ordered in the file.
#[derive(Debug, PartialEq, Eq)]
pub enum ClassEvent<'c> {
    /// Always the first event
    ClassDeclared {
        /// Internal binary name (eg. `java/lang/String`)
        name: &'c str,

        /// `SourceFile` attribute contents, when present
        source_file: Option<&'c str>,
    },

    MethodDeclared {
        /// Index into [`ClassFile::methods`]
        method: usize,
        name: &'c str,

        /// Raw method descriptor (eg. `(IJ)V`)
        descriptor: &'c str,
        is_static: bool,
    },

    /// Annotation applied to one declared parameter, from either the runtime-visible or the
    /// runtime-invisible parameter annotation table
    ParameterAnnotation {
        method: usize,

        /// Declared parameter position (not a local variable slot)
        parameter: u16,

        /// Annotation type as a field descriptor (eg. `Lorg/jetbrains/annotations/NotNull;`)
        annotation: &'c str,
        visible: bool,
    },

    /// The method has a body (emitted after the method's annotation events)
    BodyStart { method: usize },
}

/// Walk a parsed class and report the declarations and annotations a rewriting pass reacts to
pub fn structural_events(class: &ClassFile) -> Result<Vec<ClassEvent<'_>>> {
    let mut events = vec![ClassEvent::ClassDeclared {
        name: class.class_name()?,
        source_file: class.source_file()?,
    }];

    for (method_index, method) in class.methods.iter().enumerate() {
        events.push(ClassEvent::MethodDeclared {
            method: method_index,
            name: class.constants.utf8(method.name_index)?,
            descriptor: class.constants.utf8(method.descriptor_index)?,
            is_static: method.is_static(),
        });

        for attribute in &method.attributes {
            let visible = match class.constants.utf8(attribute.name_index)? {
                "RuntimeVisibleParameterAnnotations" => true,
                "RuntimeInvisibleParameterAnnotations" => false,
                _ => continue,
            };
            if let AttributeInfo::Raw(info) = &attribute.info {
                parameter_annotations(class, method_index, info, visible, &mut events)?;
            }
        }

        if method.code().is_some() {
            events.push(ClassEvent::BodyStart {
                method: method_index,
            });
        }
    }

    Ok(events)
}

/// Decode a `Runtime{In,}VisibleParameterAnnotations` payload
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.18
fn parameter_annotations<'c>(
    class: &'c ClassFile,
    method: usize,
    info: &[u8],
    visible: bool,
    events: &mut Vec<ClassEvent<'c>>,
) -> Result<()> {
    let mut reader = info;
    let parameter_count = u8::deserialize(&mut reader)?;
    for parameter in 0..parameter_count as u16 {
        let annotation_count = u16::deserialize(&mut reader)?;
        for _ in 0..annotation_count {
            let annotation = read_annotation_type(class, &mut reader)?;
            events.push(ClassEvent::ParameterAnnotation {
                method,
                parameter,
                annotation,
                visible,
            });
        }
    }
    Ok(())
}

/// Read one `annotation` structure, returning its type descriptor and consuming (but not
/// interpreting) its element-value pairs
fn read_annotation_type<'c>(class: &'c ClassFile, reader: &mut &[u8]) -> Result<&'c str> {
    let type_index = super::Utf8ConstantIndex::deserialize(reader)?;
    let annotation = class.constants.utf8(type_index)?;
    let pair_count = u16::deserialize(reader)?;
    for _ in 0..pair_count {
        let _element_name = u16::deserialize(reader)?;
        skip_element_value(reader)?;
    }
    Ok(annotation)
}

/// Consume one `annotation` structure without resolving anything, returning the raw type
/// descriptor index
fn skip_annotation(reader: &mut &[u8]) -> Result<u16> {
    let type_index = u16::deserialize(reader)?;
    let pair_count = u16::deserialize(reader)?;
    for _ in 0..pair_count {
        let _element_name = u16::deserialize(reader)?;
        skip_element_value(reader)?;
    }
    Ok(type_index)
}

fn skip_element_value(reader: &mut &[u8]) -> Result<()> {
    let tag = u8::deserialize(reader)?;
    match tag {
        // Primitive constants, strings, and classes are a single constant pool index
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            let _ = u16::deserialize(reader)?;
        }
        // Enum constants name a type and a field
        b'e' => {
            let _ = u16::deserialize(reader)?;
            let _ = u16::deserialize(reader)?;
        }
        b'@' => {
            let _ = skip_annotation(reader)?;
        }
        b'[' => {
            let count = u16::deserialize(reader)?;
            for _ in 0..count {
                skip_element_value(reader)?;
            }
        }
        other => {
            let msg = format!("Invalid element value tag '{}'", other as char);
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }
    }
    Ok(())
}

/// The little a package scan needs from a class: its name and its class-level annotations
#[derive(Debug)]
pub struct ClassHeader {
    /// Internal binary name
    pub name: String,

    /// Class-level annotation type descriptors, visible and invisible alike
    pub annotations: Vec<String>,
}

/// Read just the class name and class-level annotations out of raw class bytes
///
/// This is the cheap first pass: it walks past the constant pool and member tables without
/// building a [`ClassFile`], which matters when scanning every artifact in a large archive
/// only to find the handful of `package-info` classes.
pub fn scan_header(bytes: &[u8]) -> Result<ClassHeader> {
    let mut reader = bytes;
    let magic = take(&mut reader, 4)?;
    if magic != ClassFile::MAGIC {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "Missing class file magic header",
        ));
    }
    let _version = Version::deserialize(&mut reader)?;

    // Only Utf8 and Class entries matter for resolving names
    let constant_count = u16::deserialize(&mut reader)?;
    let mut utf8_entries: Vec<Option<String>> = vec![None; constant_count as usize];
    let mut class_entries: Vec<Option<u16>> = vec![None; constant_count as usize];
    let mut index = 1;
    while index < constant_count {
        let wide = match Constant::deserialize(&mut reader)? {
            Constant::Utf8(text) => {
                utf8_entries[index as usize] = Some(text);
                false
            }
            Constant::Class(name) => {
                class_entries[index as usize] = Some(name.0 .0);
                false
            }
            Constant::Long(_) | Constant::Double(_) => true,
            _ => false,
        };
        index += if wide { 2 } else { 1 };
    }

    let _access_flags = u16::deserialize(&mut reader)?;
    let this_class = u16::deserialize(&mut reader)?;
    let _super_class = u16::deserialize(&mut reader)?;
    let interface_count = u16::deserialize(&mut reader)?;
    let _ = take(&mut reader, interface_count as usize * 2)?;

    // Fields, then methods
    for _ in 0..2 {
        let member_count = u16::deserialize(&mut reader)?;
        for _ in 0..member_count {
            let _ = take(&mut reader, 6)?;
            skip_attributes(&mut reader)?;
        }
    }

    fn utf8_at(entries: &[Option<String>], index: u16) -> Result<&str> {
        entries
            .get(index as usize)
            .and_then(|entry| entry.as_deref())
            .ok_or_else(|| {
                let msg = format!("Expected Utf8 constant at index {}", index);
                Error::new(ErrorKind::InvalidData, msg)
            })
    }
    let name_index = class_entries
        .get(this_class as usize)
        .and_then(|entry| *entry)
        .ok_or_else(|| {
            let msg = format!("Expected Class constant at index {}", this_class);
            Error::new(ErrorKind::InvalidData, msg)
        })?;
    let name = utf8_at(&utf8_entries, name_index)?.to_owned();

    let mut annotations = vec![];
    let attribute_count = u16::deserialize(&mut reader)?;
    for _ in 0..attribute_count {
        let attribute_name = u16::deserialize(&mut reader)?;
        let length = u32::deserialize(&mut reader)? as usize;
        let info = take(&mut reader, length)?;
        match utf8_at(&utf8_entries, attribute_name)? {
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let mut info_reader = info;
                let annotation_count = u16::deserialize(&mut info_reader)?;
                for _ in 0..annotation_count {
                    // Element values are consumed but never resolved; only type names matter here
                    let type_index = skip_annotation(&mut info_reader)?;
                    annotations.push(utf8_at(&utf8_entries, type_index)?.to_owned());
                }
            }
            _ => (),
        }
    }

    Ok(ClassHeader { name, annotations })
}

fn skip_attributes(reader: &mut &[u8]) -> Result<()> {
    let count = u16::deserialize(reader)?;
    for _ in 0..count {
        let _name = u16::deserialize(reader)?;
        let length = u32::deserialize(reader)? as usize;
        let _ = take(reader, length)?;
    }
    Ok(())
}
