use super::class_file::{read_attributes, Attribute, AttributeContext, AttributeInfo};
use super::{
    take, ClassConstantIndex, ConstantPool, Deserialize, Serialize, Utf8ConstantIndex,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Method body
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug)]
pub struct CodeAttribute {
    /// Maximum size of the operand stack at any point during execution
    pub max_stack: u16,

    /// Number of local variable slots (`long`/`double` count for two)
    pub max_locals: u16,

    /// Bytecode, kept opaque
    pub bytecode: Vec<u8>,

    pub exception_table: Vec<ExceptionHandler>,

    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub(crate) fn parse(bytes: &[u8], constants: &ConstantPool) -> Result<CodeAttribute> {
        let mut reader = bytes;
        let max_stack = u16::deserialize(&mut reader)?;
        let max_locals = u16::deserialize(&mut reader)?;
        let code_length = u32::deserialize(&mut reader)? as usize;
        let bytecode = take(&mut reader, code_length)?.to_vec();
        let exception_table = Vec::<ExceptionHandler>::deserialize(&mut reader)?;
        let attributes = read_attributes(&mut reader, constants, AttributeContext::Code)?;
        if !reader.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Unexpected trailing bytes in Code attribute",
            ));
        }
        Ok(CodeAttribute {
            max_stack,
            max_locals,
            bytecode,
            exception_table,
            attributes,
        })
    }

    /// Prepend straight-line code to the front of the method body
    ///
    /// The inserted code must fall through into the original first instruction, leave the operand
    /// stack empty, and write no locals, so everything else in the attribute stays valid once the
    /// bytecode positions it records are shifted forward by the length of the prologue:
    ///
    ///   * exception table ranges and handler targets
    ///   * the first stack map frame's offset delta (later frames are relative to it)
    ///   * `Uninitialized` verification types, which store absolute offsets of `new` instructions
    ///   * line number entries
    ///   * local variable ranges (entries live from offset 0, like parameters, instead grow by
    ///     the prologue length so they still cover the whole body)
    ///
    /// `min_stack` is the operand stack depth the prologue itself needs.
    pub fn splice_prologue(
        &mut self,
        prologue: &[u8],
        min_stack: u16,
    ) -> std::result::Result<(), SpliceOverflow> {
        if prologue.is_empty() {
            return Ok(());
        }
        let delta = u16::try_from(prologue.len()).map_err(|_| SpliceOverflow)?;
        let shift = |offset: u16| offset.checked_add(delta).ok_or(SpliceOverflow);

        let mut spliced = Vec::with_capacity(prologue.len() + self.bytecode.len());
        spliced.extend_from_slice(prologue);
        spliced.append(&mut self.bytecode);
        self.bytecode = spliced;

        self.max_stack = self.max_stack.max(min_stack);

        for handler in &mut self.exception_table {
            handler.start_pc = shift(handler.start_pc)?;
            handler.end_pc = shift(handler.end_pc)?;
            handler.handler_pc = shift(handler.handler_pc)?;
        }

        for attribute in &mut self.attributes {
            match &mut attribute.info {
                AttributeInfo::StackMapTable(frames) => {
                    if let Some(first) = frames.first_mut() {
                        *first.offset_delta_mut() = shift(*first.offset_delta_mut())?;
                    }
                    for frame in frames.iter_mut() {
                        frame.shift_uninitialized(delta)?;
                    }
                }
                AttributeInfo::LineNumberTable(lines) => {
                    for line in lines.iter_mut() {
                        line.start_pc = shift(line.start_pc)?;
                    }
                }
                AttributeInfo::LocalVariableTable(variables) => {
                    for variable in variables.iter_mut() {
                        if variable.start_pc == 0 {
                            variable.length = shift(variable.length)?;
                        } else {
                            variable.start_pc = shift(variable.start_pc)?;
                        }
                    }
                }
                _ => (),
            }
        }

        Ok(())
    }
}

impl Serialize for CodeAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.bytecode.len() as u32).serialize(writer)?;
        writer.write_all(&self.bytecode)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// A shifted 16-bit bytecode offset no longer fits in its encoding
#[derive(Debug, thiserror::Error)]
#[error("a shifted 16-bit code offset no longer fits")]
pub struct SpliceOverflow;

/// Entry in the exception handler table of a `Code` attribute
#[derive(Debug)]
pub struct ExceptionHandler {
    /// Start of the range where the handler is active (inclusive)
    pub start_pc: u16,

    /// End of the range where the handler is active (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions handled (a zero index means catch everything)
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(ExceptionHandler {
            start_pc: u16::deserialize(reader)?,
            end_pc: u16::deserialize(reader)?,
            handler_pc: u16::deserialize(reader)?,
            catch_type: ClassConstantIndex::deserialize(reader)?,
        })
    }
}

/// Entry in a `LineNumberTable` attribute
#[derive(Debug)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for LineNumber {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(LineNumber {
            start_pc: u16::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

/// Entry in a `LocalVariableTable` or `LocalVariableTypeTable` attribute (the two layouts match,
/// only the meaning of the second UTF-8 index differs)
#[derive(Debug)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        Ok(LocalVariable {
            start_pc: u16::deserialize(reader)?,
            length: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            index: u16::deserialize(reader)?,
        })
    }
}

/// Frames in the `StackMapTable` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.4
#[derive(Debug)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and no stack
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and one stack element
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals and no stack
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals and no stack
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },

    /// Frame includes all locals and stack
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta_mut(&mut self) -> &mut u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => offset_delta,
            StackMapFrame::SameLocalsOneStack { offset_delta, .. } => offset_delta,
            StackMapFrame::ChopLocalsNoStack { offset_delta, .. } => offset_delta,
            StackMapFrame::AppendLocalsNoStack { offset_delta, .. } => offset_delta,
            StackMapFrame::Full { offset_delta, .. } => offset_delta,
        }
    }

    /// Shift forward the absolute offsets stored in `Uninitialized` verification types
    pub fn shift_uninitialized(
        &mut self,
        delta: u16,
    ) -> std::result::Result<(), SpliceOverflow> {
        let shift_all = |types: &mut [VerificationType]| {
            for verification_type in types.iter_mut() {
                if let VerificationType::Uninitialized(offset) = verification_type {
                    *offset = offset.checked_add(delta).ok_or(SpliceOverflow)?;
                }
            }
            Ok(())
        };
        match self {
            StackMapFrame::SameLocalsNoStack { .. } => Ok(()),
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                shift_all(std::slice::from_mut(stack))
            }
            StackMapFrame::ChopLocalsNoStack { .. } => Ok(()),
            StackMapFrame::AppendLocalsNoStack { locals, .. } => shift_all(locals),
            StackMapFrame::Full { locals, stack, .. } => {
                shift_all(locals)?;
                shift_all(stack)
            }
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    // same_frame
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    // same_frame_extended
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    // same_locals_1_stack_item_frame
                    (64 + *offset_delta as u8).serialize(writer)?;
                    stack.serialize(writer)?;
                } else {
                    // same_locals_1_stack_item_frame_extended
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                    stack.serialize(writer)?;
                }
            }
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                // chop_frame
                debug_assert!(
                    (1..=3).contains(chopped_k),
                    "Can only chop between 1 and 3 locals"
                );
                (251 - *chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                // append_frame
                debug_assert!(
                    (1..=3).contains(&locals.len()),
                    "Can only append between 1 and 3 locals"
                );
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                // full_frame
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for StackMapFrame {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let tag = u8::deserialize(reader)?;
        let frame = match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::deserialize(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::deserialize(reader)?,
                stack: VerificationType::deserialize(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                chopped_k: 251 - tag,
                offset_delta: u16::deserialize(reader)?,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
            },
            252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let mut locals = Vec::with_capacity((tag - 251) as usize);
                for _ in 251..tag {
                    locals.push(VerificationType::deserialize(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: u16::deserialize(reader)?,
                locals: Vec::<VerificationType>::deserialize(reader)?,
                stack: Vec::<VerificationType>::deserialize(reader)?,
            },
            other => {
                let msg = format!("Reserved stack map frame type {}", other);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(frame)
    }
}

/// Verification type in a stack map frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(ClassConstantIndex),

    /// Object created by a `new` at this (absolute) bytecode offset, not yet initialized
    Uninitialized(u16),
}

impl Serialize for VerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(index) => {
                7u8.serialize(writer)?;
                index.serialize(writer)?;
            }
            VerificationType::Uninitialized(offset) => {
                8u8.serialize(writer)?;
                offset.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for VerificationType {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let verification_type = match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::deserialize(reader)?),
            8 => VerificationType::Uninitialized(u16::deserialize(reader)?),
            other => {
                let msg = format!("Invalid verification type tag {}", other);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(verification_type)
    }
}

#[cfg(test)]
mod splice_tests {
    use super::*;
    use crate::jvm::{ConstantPool, Utf8ConstantIndex};

    fn code_with(attributes: Vec<Attribute>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 2,
            max_locals: 3,
            bytecode: vec![0xB1],
            exception_table: vec![],
            attributes,
        }
    }

    fn utf8(constants: &mut ConstantPool, text: &str) -> Utf8ConstantIndex {
        constants.get_utf8(text).unwrap()
    }

    #[test]
    fn shifts_exception_table() {
        let mut code = code_with(vec![]);
        code.exception_table.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 1,
            handler_pc: 1,
            catch_type: ClassConstantIndex(crate::jvm::ConstantIndex(0)),
        });
        code.splice_prologue(&[0x2A, 0x57], 1).unwrap();

        assert_eq!(code.bytecode, vec![0x2A, 0x57, 0xB1]);
        assert_eq!(code.exception_table[0].start_pc, 2);
        assert_eq!(code.exception_table[0].end_pc, 3);
        assert_eq!(code.exception_table[0].handler_pc, 3);
    }

    #[test]
    fn keeps_larger_max_stack() {
        let mut code = code_with(vec![]);
        code.splice_prologue(&[0x00], 1).unwrap();
        assert_eq!(code.max_stack, 2);

        code.max_stack = 0;
        code.splice_prologue(&[0x00], 1).unwrap();
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn shifts_only_first_stack_map_delta() {
        let mut constants = ConstantPool::new();
        let name = utf8(&mut constants, "StackMapTable");
        let mut code = code_with(vec![Attribute {
            name_index: name,
            info: AttributeInfo::StackMapTable(vec![
                StackMapFrame::SameLocalsNoStack { offset_delta: 4 },
                StackMapFrame::SameLocalsNoStack { offset_delta: 7 },
            ]),
        }]);
        code.splice_prologue(&[0x00, 0x00, 0x00], 1).unwrap();

        match &code.attributes[0].info {
            AttributeInfo::StackMapTable(frames) => {
                assert!(matches!(
                    frames[0],
                    StackMapFrame::SameLocalsNoStack { offset_delta: 7 }
                ));
                assert!(matches!(
                    frames[1],
                    StackMapFrame::SameLocalsNoStack { offset_delta: 7 }
                ));
            }
            other => panic!("Unexpected attribute {:?}", other),
        }
    }

    #[test]
    fn promoted_first_frame_reencodes_in_extended_form() {
        // Delta 60 fits the one-byte form; after a 10-byte prologue it must take the
        // extended encoding
        let frame = StackMapFrame::SameLocalsNoStack { offset_delta: 60 };
        let mut short = vec![];
        frame.serialize(&mut short).unwrap();
        assert_eq!(short, vec![60]);

        let mut constants = ConstantPool::new();
        let name = utf8(&mut constants, "StackMapTable");
        let mut code = code_with(vec![Attribute {
            name_index: name,
            info: AttributeInfo::StackMapTable(vec![frame]),
        }]);
        code.splice_prologue(&[0x00; 10], 1).unwrap();

        match &code.attributes[0].info {
            AttributeInfo::StackMapTable(frames) => {
                let mut extended = vec![];
                frames[0].serialize(&mut extended).unwrap();
                assert_eq!(extended, vec![251, 0, 70]);
            }
            other => panic!("Unexpected attribute {:?}", other),
        }
    }

    #[test]
    fn shifts_uninitialized_offsets_in_every_frame() {
        let mut constants = ConstantPool::new();
        let name = utf8(&mut constants, "StackMapTable");
        let mut code = code_with(vec![Attribute {
            name_index: name,
            info: AttributeInfo::StackMapTable(vec![
                StackMapFrame::SameLocalsNoStack { offset_delta: 0 },
                StackMapFrame::SameLocalsOneStack {
                    offset_delta: 5,
                    stack: VerificationType::Uninitialized(8),
                },
            ]),
        }]);
        code.splice_prologue(&[0x00; 4], 1).unwrap();

        match &code.attributes[0].info {
            AttributeInfo::StackMapTable(frames) => match &frames[1] {
                StackMapFrame::SameLocalsOneStack { stack, .. } => {
                    assert_eq!(*stack, VerificationType::Uninitialized(12));
                }
                other => panic!("Unexpected frame {:?}", other),
            },
            other => panic!("Unexpected attribute {:?}", other),
        }
    }

    #[test]
    fn local_variables_live_from_zero_grow_instead_of_moving() {
        let mut constants = ConstantPool::new();
        let table_name = utf8(&mut constants, "LocalVariableTable");
        let var_name = utf8(&mut constants, "x");
        let descriptor = utf8(&mut constants, "I");
        let mut code = code_with(vec![Attribute {
            name_index: table_name,
            info: AttributeInfo::LocalVariableTable(vec![
                LocalVariable {
                    start_pc: 0,
                    length: 6,
                    name_index: var_name,
                    descriptor_index: descriptor,
                    index: 0,
                },
                LocalVariable {
                    start_pc: 2,
                    length: 4,
                    name_index: var_name,
                    descriptor_index: descriptor,
                    index: 1,
                },
            ]),
        }]);
        code.splice_prologue(&[0x00; 3], 1).unwrap();

        match &code.attributes[0].info {
            AttributeInfo::LocalVariableTable(variables) => {
                assert_eq!((variables[0].start_pc, variables[0].length), (0, 9));
                assert_eq!((variables[1].start_pc, variables[1].length), (5, 4));
            }
            other => panic!("Unexpected attribute {:?}", other),
        }
    }

    #[test]
    fn shifts_line_numbers() {
        let mut constants = ConstantPool::new();
        let name = utf8(&mut constants, "LineNumberTable");
        let mut code = code_with(vec![Attribute {
            name_index: name,
            info: AttributeInfo::LineNumberTable(vec![LineNumber {
                start_pc: 0,
                line_number: 17,
            }]),
        }]);
        code.splice_prologue(&[0x00; 5], 1).unwrap();

        match &code.attributes[0].info {
            AttributeInfo::LineNumberTable(lines) => {
                assert_eq!(lines[0].start_pc, 5);
                assert_eq!(lines[0].line_number, 17);
            }
            other => panic!("Unexpected attribute {:?}", other),
        }
    }

    #[test]
    fn overflowing_shift_is_an_error() {
        let mut code = code_with(vec![]);
        code.exception_table.push(ExceptionHandler {
            start_pc: u16::MAX - 1,
            end_pc: u16::MAX,
            handler_pc: 0,
            catch_type: ClassConstantIndex(crate::jvm::ConstantIndex(0)),
        });
        assert!(code.splice_prologue(&[0x00; 4], 1).is_err());
    }
}
