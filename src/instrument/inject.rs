use super::policy::InstrumentationPlan;
use crate::jvm::{MethodDescriptor, MethodRefConstantIndex, Serialize};
use byteorder::WriteBytesExt;
use std::io::Result;

/// Class whose static method performs the null check
pub const NULL_CHECK_OWNER: &str = "java/util/Objects";

/// Name of the checking method
pub const NULL_CHECK_NAME: &str = "requireNonNull";

/// Descriptor of the checking method
pub const NULL_CHECK_DESCRIPTOR: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";

/// Operand stack depth a null check prologue needs (one reference at a time)
pub const PROLOGUE_STACK: u16 = 1;

/// The handful of instructions null check prologues are assembled from
#[derive(Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Load a reference from a local variable slot
    ALoad(u16),

    /// Invoke a static method
    InvokeStatic(MethodRefConstantIndex),

    /// Discard the top of the operand stack
    Pop,

    /// Do nothing (alignment filler)
    Nop,
}

impl Serialize for Instruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            Instruction::ALoad(slot) => match slot {
                0..=3 => (0x2A + *slot as u8).serialize(writer)?,
                4..=255 => {
                    0x19u8.serialize(writer)?;
                    (*slot as u8).serialize(writer)?;
                }
                _ => {
                    // wide prefix
                    0xC4u8.serialize(writer)?;
                    0x19u8.serialize(writer)?;
                    slot.serialize(writer)?;
                }
            },
            Instruction::InvokeStatic(method) => {
                0xB8u8.serialize(writer)?;
                method.serialize(writer)?;
            }
            Instruction::Pop => 0x57u8.serialize(writer)?,
            Instruction::Nop => 0x00u8.serialize(writer)?,
        }
        Ok(())
    }
}

/// Assemble the bytecode prepended to a method body to null check its planned parameters
///
/// Each check loads the parameter, calls `Objects.requireNonNull`, and discards the returned
/// reference, so the whole prologue is stack neutral and falls through into the original first
/// instruction.
///
/// A non-empty prologue is padded with `nop` to a multiple of four bytes: `tableswitch` and
/// `lookupswitch` operands are aligned relative to the start of the code array, so shifting the
/// original body by anything else would invalidate their padding.
pub fn null_check_prologue(
    plan: &InstrumentationPlan,
    signature: &MethodDescriptor,
    is_static: bool,
    require_non_null: MethodRefConstantIndex,
) -> Result<Vec<u8>> {
    let mut prologue = vec![];
    for &parameter in &plan.parameters {
        let slot = signature.parameter_slot(parameter as usize, is_static);
        Instruction::ALoad(slot).serialize(&mut prologue)?;
        Instruction::InvokeStatic(require_non_null).serialize(&mut prologue)?;
        Instruction::Pop.serialize(&mut prologue)?;
    }
    while prologue.len() % 4 != 0 {
        Instruction::Nop.serialize(&mut prologue)?;
    }
    Ok(prologue)
}

#[cfg(test)]
mod encoding_tests {
    use super::*;
    use crate::jvm::ConstantIndex;

    fn encoded(instruction: Instruction) -> Vec<u8> {
        let mut bytes = vec![];
        instruction.serialize(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn aload_picks_shortest_form() {
        assert_eq!(encoded(Instruction::ALoad(0)), vec![0x2A]);
        assert_eq!(encoded(Instruction::ALoad(3)), vec![0x2D]);
        assert_eq!(encoded(Instruction::ALoad(4)), vec![0x19, 4]);
        assert_eq!(encoded(Instruction::ALoad(255)), vec![0x19, 255]);
        assert_eq!(encoded(Instruction::ALoad(256)), vec![0xC4, 0x19, 1, 0]);
    }

    #[test]
    fn invoke_and_pop() {
        let method = MethodRefConstantIndex(ConstantIndex(0x0102));
        assert_eq!(encoded(Instruction::InvokeStatic(method)), vec![0xB8, 1, 2]);
        assert_eq!(encoded(Instruction::Pop), vec![0x57]);
        assert_eq!(encoded(Instruction::Nop), vec![0x00]);
    }

    #[test]
    fn prologue_pads_to_a_four_byte_multiple() {
        use crate::jvm::ParseDescriptor;

        let method = MethodRefConstantIndex(ConstantIndex(7));
        let signature =
            crate::jvm::MethodDescriptor::parse("(Ljava/lang/String;)V").unwrap();

        let plan = InstrumentationPlan { parameters: vec![0] };
        let prologue = null_check_prologue(&plan, &signature, true, method).unwrap();
        // One 5-byte check, then three nops of filler
        assert_eq!(prologue, vec![0x2A, 0xB8, 0, 7, 0x57, 0x00, 0x00, 0x00]);

        let empty = InstrumentationPlan { parameters: vec![] };
        let prologue = null_check_prologue(&empty, &signature, true, method).unwrap();
        assert!(prologue.is_empty());
    }
}
