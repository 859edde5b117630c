use super::{Deserialize, Serialize};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Class file constant pool
///
/// The parsed pool keeps its slot layout: indexing starts at 1 and `long`/`double` constants
/// claim two slots, with the second slot unusable. New constants can only be appended, so every
/// index handed out while the original class was parsed stays valid while the rewritten class is
/// assembled. The `get_*` methods intern: they return the index of an existing matching constant
/// before they grow the pool.
#[derive(Debug)]
pub struct ConstantPool {
    slots: Vec<Option<Constant>>,
}

impl ConstantPool {
    /// Make a fresh empty constant pool
    pub fn new() -> ConstantPool {
        ConstantPool { slots: vec![None] }
    }

    /// Number of slots, including the unusable slot 0 (this is the `constant_pool_count` of the
    /// class file format)
    pub fn slot_count(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Look up a constant by index
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.slots.get(index.0 as usize).and_then(Option::as_ref)
    }

    /// Occupied slots, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|constant| (ConstantIndex(index as u16), constant))
        })
    }

    /// Resolve a Utf8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str> {
        match self.get(index.0) {
            Some(Constant::Utf8(string)) => Ok(string.as_str()),
            _ => {
                let msg = format!("Expected Utf8 constant at index {}", index.0 .0);
                Err(Error::new(ErrorKind::InvalidData, msg))
            }
        }
    }

    /// Resolve a class constant down to its internal binary name
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str> {
        match self.get(index.0) {
            Some(Constant::Class(utf8)) => self.utf8(*utf8),
            _ => {
                let msg = format!("Expected Class constant at index {}", index.0 .0);
                Err(Error::new(ErrorKind::InvalidData, msg))
            }
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// slots.
    fn push(&mut self, constant: Constant) -> std::result::Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.slots.len();
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }
        let index = ConstantIndex(offset as u16);
        let width = constant.width();
        self.slots.push(Some(constant));
        if width == 2 {
            self.slots.push(None);
        }
        Ok(index)
    }

    /// Get or insert a Utf8 constant
    pub fn get_utf8(
        &mut self,
        value: &str,
    ) -> std::result::Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        for (index, constant) in self.iter() {
            if let Constant::Utf8(existing) = constant {
                if existing == value {
                    return Ok(Utf8ConstantIndex(index));
                }
            }
        }
        self.push(Constant::Utf8(value.to_owned()))
            .map(Utf8ConstantIndex)
    }

    /// Get or insert a class constant
    pub fn get_class(
        &mut self,
        name: &str,
    ) -> std::result::Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name_index = self.get_utf8(name)?;
        for (index, constant) in self.iter() {
            if let Constant::Class(existing) = constant {
                if *existing == name_index {
                    return Ok(ClassConstantIndex(index));
                }
            }
        }
        self.push(Constant::Class(name_index))
            .map(ClassConstantIndex)
    }

    /// Get or insert a name & type constant
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> std::result::Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        for (index, constant) in self.iter() {
            if let Constant::NameAndType {
                name: existing_name,
                descriptor: existing_descriptor,
            } = constant
            {
                if *existing_name == name && *existing_descriptor == descriptor {
                    return Ok(NameAndTypeConstantIndex(index));
                }
            }
        }
        self.push(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    /// Get or insert a (non-interface) method reference
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class_index = self.get_class(class)?;
        let name_index = self.get_utf8(name)?;
        let descriptor_index = self.get_utf8(descriptor)?;
        let name_and_type = self.get_name_and_type(name_index, descriptor_index)?;
        for (index, constant) in self.iter() {
            if let Constant::MethodRef {
                class: existing_class,
                name_and_type: existing_name_and_type,
                is_interface: false,
            } = constant
            {
                if *existing_class == class_index && *existing_name_and_type == name_and_type {
                    return Ok(MethodRefConstantIndex(index));
                }
            }
        }
        self.push(Constant::MethodRef {
            class: class_index,
            name_and_type,
            is_interface: false,
        })
        .map(MethodRefConstantIndex)
    }
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.slot_count().serialize(writer)?;
        for slot in &self.slots[1..] {
            if let Some(constant) = slot {
                constant.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for ConstantPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let count = u16::deserialize(reader)? as usize;
        if count == 0 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Constant pool count must be at least 1",
            ));
        }
        let mut slots: Vec<Option<Constant>> = Vec::with_capacity(count);
        slots.push(None);
        while slots.len() < count {
            let constant = Constant::deserialize(reader)?;
            let width = constant.width();
            slots.push(Some(constant));
            if width == 2 {
                slots.push(None);
            }
        }
        if slots.len() != count {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Wide constant overruns the declared constant pool count",
            ));
        }
        Ok(ConstantPool { slots })
    }
}

/// One constant pool slot ran past the maximum pool size
#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    ///
    /// The reference kind byte is carried through raw: this layer never resolves handles, it
    /// only needs them to survive the round trip.
    MethodHandle {
        handle_kind: u8,
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module declaration
    Module(Utf8ConstantIndex),

    /// Package exported or opened by a module
    Package(Utf8ConstantIndex),
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the spec:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let length = u16::deserialize(reader)? as usize;
                let mut buffer = vec![0u8; length];
                reader.read_exact(&mut buffer)?;
                Constant::Utf8(decode_modified_utf8(&buffer)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: u8::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            tag => {
                let msg = format!("Unsupported constant pool tag {}", tag);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\0` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]: surrogate pairs fold back into supplementary characters
/// and the two-byte form of `\u{0000}` folds back into a plain NUL.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    fn continuation(bytes: &[u8], at: usize) -> Result<u32> {
        match bytes.get(at) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u32),
            Some(b) => {
                let msg = format!("Invalid modified UTF-8 continuation byte {:#04x}", b);
                Err(Error::new(ErrorKind::InvalidData, msg))
            }
            None => Err(Error::new(
                ErrorKind::UnexpectedEof,
                "Truncated modified UTF-8 sequence",
            )),
        }
    }

    /// Decode one 1-3 byte unit, returning the code unit and its byte width
    fn unit(bytes: &[u8], at: usize) -> Result<(u32, usize)> {
        let b0 = *bytes.get(at).ok_or_else(|| {
            Error::new(ErrorKind::UnexpectedEof, "Truncated modified UTF-8 sequence")
        })?;
        if b0 & 0b1000_0000 == 0 {
            Ok((b0 as u32, 1))
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            let b1 = continuation(bytes, at + 1)?;
            Ok((((b0 & 0x1F) as u32) << 6 | b1, 2))
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let b1 = continuation(bytes, at + 1)?;
            let b2 = continuation(bytes, at + 2)?;
            Ok((((b0 & 0x0F) as u32) << 12 | b1 << 6 | b2, 3))
        } else {
            let msg = format!("Invalid modified UTF-8 lead byte {:#04x}", b0);
            Err(Error::new(ErrorKind::InvalidData, msg))
        }
    }

    let invalid_unit = |code: u32| {
        let msg = format!("Invalid modified UTF-8 code unit {:#06x}", code);
        Error::new(ErrorKind::InvalidData, msg)
    };

    let mut decoded = String::with_capacity(bytes.len());
    let mut at = 0;
    while at < bytes.len() {
        let (high, high_width) = unit(bytes, at)?;
        let code = if (0xD800..0xDC00).contains(&high) {
            let (low, low_width) = unit(bytes, at + high_width)?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(invalid_unit(high));
            }
            at += high_width + low_width;
            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
        } else if (0xDC00..0xE000).contains(&high) {
            return Err(invalid_unit(high));
        } else {
            at += high_width;
            high
        };
        decoded.push(char::from_u32(code).ok_or_else(|| invalid_unit(code))?);
    }
    Ok(decoded)
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<MethodRefConstantIndex> for ConstantIndex {
    fn from(index: MethodRefConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for NameAndTypeConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for MethodRefConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        u16::deserialize(reader).map(ConstantIndex)
    }
}
impl Deserialize for Utf8ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        ConstantIndex::deserialize(reader).map(Utf8ConstantIndex)
    }
}
impl Deserialize for ClassConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        ConstantIndex::deserialize(reader).map(ClassConstantIndex)
    }
}
impl Deserialize for NameAndTypeConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        ConstantIndex::deserialize(reader).map(NameAndTypeConstantIndex)
    }
}
impl Deserialize for MethodRefConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        ConstantIndex::deserialize(reader).map(MethodRefConstantIndex)
    }
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(&[102, 111, 111]).unwrap(), "foo");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let input = "ĄǍǞǠǺȀȂȦȺӐӒ";
        assert_eq!(decode_modified_utf8(&encode_modified_utf8(input)).unwrap(), input);
        let input = "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ";
        assert_eq!(decode_modified_utf8(&encode_modified_utf8(input)).unwrap(), input);
    }

    #[test]
    fn supplementary_characters() {
        let input = "\u{10000}\u{dffff}\u{10FFFF}";
        let encoded = encode_modified_utf8(input);
        assert_eq!(
            encoded,
            vec![
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ]
        );
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), input);
    }

    #[test]
    fn unpaired_surrogate() {
        // High surrogate unit with no low surrogate following
        assert!(decode_modified_utf8(&[237, 160, 128, 97]).is_err());
    }
}

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = ConstantPool::new();
        let first = pool.get_utf8("java/util/Objects").unwrap();
        let again = pool.get_utf8("java/util/Objects").unwrap();
        assert_eq!(first, again);
        assert_eq!(pool.slot_count(), 2);
    }

    #[test]
    fn method_ref_chain() {
        let mut pool = ConstantPool::new();
        let method_ref = pool
            .get_method_ref(
                "java/util/Objects",
                "requireNonNull",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
            )
            .unwrap();
        // Utf8 x3, Class, NameAndType, MethodRef, plus slot 0
        assert_eq!(pool.slot_count(), 7);
        let again = pool
            .get_method_ref(
                "java/util/Objects",
                "requireNonNull",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
            )
            .unwrap();
        assert_eq!(method_ref, again);
        assert_eq!(pool.slot_count(), 7);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long_index = pool.push(Constant::Long(42)).unwrap();
        let next_index = pool.push(Constant::Integer(1)).unwrap();
        assert_eq!(long_index.0 + 2, next_index.0);
        assert!(pool.get(ConstantIndex(long_index.0 + 1)).is_none());
    }
}
