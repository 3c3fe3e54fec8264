//! Defines the [`Instruction`] type, responsible for representing a single Cairo bytecode
//! instruction, eventually including immediate values.
//!
//! # Bit layout
//!
//! The 63 low bits of an instruction word are laid out as, from the least significant bit:
//!
//! ```text
//! [0..16)   dst_offset  (biased by 2^15)
//! [16..32)  op0_offset  (biased by 2^15)
//! [32..48)  op1_offset  (biased by 2^15)
//! [48..64)  flags, with bit 63 required to be zero
//! ```
//!
//! Within the flags word (bit 48 is flag bit 0):
//!
//! ```text
//! 0      dst_reg
//! 1      op0_reg
//! 2..4   op1_src
//! 5..6   res_logic
//! 7..9   pc_update
//! 10..11 ap_update
//! 12..14 opcode
//! 15     must be zero
//! ```

use std::fmt;

use crate::error::Error;

/// A register the destination part of an instruction can be relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DstRegister {
    /// The **Allocation Pointer**.
    AP = 0,
    /// The **Frame Pointer**.
    FP = 1,
}

/// A register the first operand of an instruction can be relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op0Register {
    /// The **Allocation Pointer**.
    AP = 0,
    /// The **Frame Pointer**.
    FP = 1,
}

/// A register/object the second operand of an instruction can be relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op1Source {
    /// The address resulting from the first operand of the instruction.
    Op0 = 0,
    /// The **Program Counter**.
    PC = 1,
    /// The **Frame Pointer**.
    FP = 2,
    /// The **Allocation Pointer**.
    AP = 4,
}

/// A possible result logic to be applied to the first and second operands of an instruction.
///
/// # Representation
///
/// The discriminants of this enum are deliberately kept out of the bit range used by
/// [`OpCode`] (bits 0..2), occupying bits 3..4 instead. This lets a caller combine
/// `opcode as u8 | result_logic as u8` into a single collision-free discriminant if it wants
/// to, without the interpreter needing to do so itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultLogic {
    /// The result is simply the value of the second operand.
    Op1 = 0 << 3,
    /// The result is the addition of the first and second operands.
    Add = 1 << 3,
    /// The result is the multiplication of the first and second operands.
    Mul = 2 << 3,
    /// The result is not used by the instruction (a conditional jump reads `dst`/`op1`
    /// directly instead).
    Unused = 3 << 3,
}

/// A possible way to update the **Program Counter** after the instruction has been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PcUpdate {
    /// The size of the instruction is added to the **Program Counter**.
    Regular = 0,
    /// The **Program Counter** is set to the result of the instruction.
    AbsoluteJump = 1,
    /// The result of the instruction is added to the **Program Counter**.
    RelativeJump = 2,
    /// If the destination part of the instruction is zero, then the **Program Counter** is
    /// simply updated according to the [`PcUpdate::Regular`] update rule. Otherwise, the
    /// second part of the instruction is added to it.
    ConditionalJump = 4,
}

/// A possible way to update the **Allocation Pointer** after the instruction has been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ApUpdate {
    /// The **Allocation Pointer** remains unchanged.
    Ap = 0,
    /// The result of the instruction is added to the **Allocation Pointer**.
    AddResult = 1,
    /// The **Allocation Pointer** is incremented by one.
    Increment = 2,
    /// The **Allocation Pointer** is incremented by two.
    ///
    /// Never encoded directly: this is what `ap_update = 0` means when the instruction's
    /// [`OpCode`] is [`OpCode::Call`]. See [`Instruction::ap_update`].
    Add2 = 3,
}

/// The OP code of an instruction.
///
/// # Representation
///
/// See the note on [`ResultLogic`]: this enum's discriminants occupy bits 0..2, disjoint from
/// `ResultLogic`'s bits 3..4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// The instruction does nothing specific.
    None = 0,
    /// The instruction is calling into a subroutine.
    Call = 1,
    /// The instruction is returning from a subroutine.
    Ret = 2,
    /// The instruction is asserting a specific memory cell to a specific value.
    AssertEq = 4,
}

/// The update rule to apply to the **Frame Pointer** after an instruction executes.
///
/// Unlike the other update rules, `fp_update` is never encoded in the instruction word: it is
/// entirely determined by the instruction's [`OpCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpUpdate {
    /// The **Frame Pointer** remains unchanged.
    Fp,
    /// The **Frame Pointer** is set to `ap + 2`, computed before `ap` itself is updated.
    ApPlus2,
    /// The **Frame Pointer** is set to the destination operand of the instruction.
    Dst,
}

const OFFSET_BIAS: i32 = 1 << 15;

/// A single Cairo bytecode instruction.
///
/// This contains most of the information required to execute the instruction, but some
/// things might be missing, such as an eventual immediate value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u64);

impl Instruction {
    /// Returns the offset applied to the destination part of the instruction.
    #[inline(always)]
    pub fn dst_offset(&self) -> i16 {
        bias(self.0 as u16)
    }

    /// Returns the offset applied to the first operand of the instruction.
    #[inline(always)]
    pub fn op0_offset(&self) -> i16 {
        bias((self.0 >> 16) as u16)
    }

    /// Returns the offset applied to the second operand of the instruction.
    #[inline(always)]
    pub fn op1_offset(&self) -> i16 {
        bias((self.0 >> 32) as u16)
    }

    /// The register that the destination part of the instruction is relative to.
    #[inline(always)]
    pub fn dst_register(&self) -> DstRegister {
        if self.0 & 0x0001_0000_0000_0000 != 0 {
            DstRegister::FP
        } else {
            DstRegister::AP
        }
    }

    /// The register that the first operand of the instruction is relative to.
    #[inline(always)]
    pub fn op0_register(&self) -> Op0Register {
        if self.0 & 0x0002_0000_0000_0000 != 0 {
            Op0Register::FP
        } else {
            Op0Register::AP
        }
    }

    /// The source of the second operand of the instruction.
    #[inline(always)]
    pub fn op1_source(&self) -> Result<Op1Source, Error> {
        match self.0 & 0x001C_0000_0000_0000 {
            0x0000_0000_0000_0000 => Ok(Op1Source::Op0),
            0x0004_0000_0000_0000 => Ok(Op1Source::PC),
            0x0008_0000_0000_0000 => Ok(Op1Source::FP),
            0x0010_0000_0000_0000 => Ok(Op1Source::AP),
            _ => Err(Error::UndefinedOp1Source),
        }
    }

    /// The result logic to be applied to the first and second operands of the instruction.
    #[inline]
    pub fn result_logic(&self) -> Result<ResultLogic, Error> {
        let raw = match self.0 & 0x0060_0000_0000_0000 {
            0x0000_0000_0000_0000 => ResultLogic::Op1,
            0x0020_0000_0000_0000 => ResultLogic::Add,
            0x0040_0000_0000_0000 => ResultLogic::Mul,
            _ => return Err(Error::UndefinedResultLogic),
        };

        if raw == ResultLogic::Op1 && self.pc_update()? == PcUpdate::ConditionalJump {
            Ok(ResultLogic::Unused)
        } else {
            Ok(raw)
        }
    }

    /// Returns the update rule to be applied to the **Program Counter** after the instruction
    #[inline(always)]
    pub fn pc_update(&self) -> Result<PcUpdate, Error> {
        match self.0 & 0x0380_0000_0000_0000 {
            0x0000_0000_0000_0000 => Ok(PcUpdate::Regular),
            0x0080_0000_0000_0000 => Ok(PcUpdate::AbsoluteJump),
            0x0100_0000_0000_0000 => Ok(PcUpdate::RelativeJump),
            0x0200_0000_0000_0000 => Ok(PcUpdate::ConditionalJump),
            _ => Err(Error::UndefinedPcUpdate),
        }
    }

    /// Returns the update rule to be applied to the **Allocation Pointer** after the
    /// instruction.
    ///
    /// When the raw `ap_update` bits are `0` and the instruction's [`OpCode`] is
    /// [`OpCode::Call`], this resolves to [`ApUpdate::Add2`] rather than [`ApUpdate::Ap`]: a
    /// `Call` always pushes two words (the old `fp` and the return address) and must bump `ap`
    /// past both of them. Other raw values decode unconditionally regardless of `op_code`; any
    /// further cross-field legality (e.g. whether a given `op_code` may actually pair with a
    /// given `ap_update`) is left to execution time, not the decoder.
    #[inline]
    pub fn ap_update(&self) -> Result<ApUpdate, Error> {
        let raw = match self.0 & 0x0C00_0000_0000_0000 {
            0x0000_0000_0000_0000 => ApUpdate::Ap,
            0x0400_0000_0000_0000 => ApUpdate::AddResult,
            0x0800_0000_0000_0000 => ApUpdate::Increment,
            _ => return Err(Error::UndefinedApUpdate),
        };

        if raw == ApUpdate::Ap && self.op_code()? == OpCode::Call {
            Ok(ApUpdate::Add2)
        } else {
            Ok(raw)
        }
    }

    /// Returns the OP code of the instruction.
    #[inline(always)]
    pub fn op_code(&self) -> Result<OpCode, Error> {
        match self.0 & 0x7000_0000_0000_0000 {
            0x0000_0000_0000_0000 => Ok(OpCode::None),
            0x1000_0000_0000_0000 => Ok(OpCode::Call),
            0x2000_0000_0000_0000 => Ok(OpCode::Ret),
            0x4000_0000_0000_0000 => Ok(OpCode::AssertEq),
            _ => Err(Error::UndefinedOpCode),
        }
    }

    /// Returns the update rule to be applied to the **Frame Pointer** after the instruction.
    ///
    /// Unlike the other update rules, this is never encoded: it is entirely determined by
    /// [`Instruction::op_code`].
    #[inline]
    pub fn fp_update(&self) -> Result<FpUpdate, Error> {
        Ok(match self.op_code()? {
            OpCode::Call => FpUpdate::ApPlus2,
            OpCode::Ret => FpUpdate::Dst,
            OpCode::None | OpCode::AssertEq => FpUpdate::Fp,
        })
    }

    /// Returns whether the last bit of the instruction representation is set or not.
    ///
    /// Normally, a properly encoded instruction should have this bit set to zero.
    #[inline(always)]
    pub fn is_last_bit_set(&self) -> bool {
        self.0 & 0x8000_0000_0000_0000 != 0
    }

    /// The size, in memory cells, of this instruction.
    ///
    /// This is `2` when the second operand is sourced from an immediate value following the
    /// instruction word (i.e. `op1_source() == Ok(Op1Source::PC)`), and `1` otherwise.
    #[inline]
    pub fn size(&self) -> Result<usize, Error> {
        Ok(if self.op1_source()? == Op1Source::PC { 2 } else { 1 })
    }

    /// Validates every field of the instruction, returning the first error encountered.
    ///
    /// This is a convenience for callers that want to fully validate an instruction word
    /// up-front rather than lazily, one accessor at a time.
    pub fn validate(&self) -> Result<(), Error> {
        if self.is_last_bit_set() {
            return Err(Error::HighBitSet);
        }

        self.op1_source()?;
        self.result_logic()?;
        self.pc_update()?;
        self.ap_update()?;
        self.op_code()?;

        Ok(())
    }
}

/// Applies the Cairo bytecode's offset bias (`biased - 2^15`) to a raw 16-bit field.
#[inline(always)]
fn bias(raw: u16) -> i16 {
    (raw as i32 - OFFSET_BIAS) as i16
}

/// Undoes [`bias`], turning a signed offset back into its biased, wire-format representation.
#[inline(always)]
fn unbias(offset: i16) -> u16 {
    (offset as i32 + OFFSET_BIAS) as u16
}

/// The semantic fields of an [`Instruction`], used to build a raw instruction word without
/// having to hand-assemble the bit pattern.
///
/// This is mostly useful for tests and for any future assembler built on top of this crate.
#[derive(Debug, Clone, Copy)]
pub struct InstructionFields {
    /// See [`Instruction::dst_offset`].
    pub dst_offset: i16,
    /// See [`Instruction::op0_offset`].
    pub op0_offset: i16,
    /// See [`Instruction::op1_offset`].
    pub op1_offset: i16,
    /// See [`Instruction::dst_register`].
    pub dst_register: DstRegister,
    /// See [`Instruction::op0_register`].
    pub op0_register: Op0Register,
    /// See [`Instruction::op1_source`].
    pub op1_source: Op1Source,
    /// See [`Instruction::result_logic`]. Pass [`ResultLogic::Op1`] together with
    /// [`PcUpdate::ConditionalJump`] to get back [`ResultLogic::Unused`] from the decoder.
    pub result_logic: ResultLogic,
    /// See [`Instruction::pc_update`].
    pub pc_update: PcUpdate,
    /// See [`Instruction::ap_update`]. Pass [`ApUpdate::Ap`] together with [`OpCode::Call`]
    /// to get back [`ApUpdate::Add2`] from the decoder.
    pub ap_update: ApUpdate,
    /// See [`Instruction::op_code`].
    pub op_code: OpCode,
}

impl InstructionFields {
    /// Assembles these fields into a raw [`Instruction`] word.
    pub fn encode(&self) -> Instruction {
        let mut word: u64 = 0;

        word |= unbias(self.dst_offset) as u64;
        word |= (unbias(self.op0_offset) as u64) << 16;
        word |= (unbias(self.op1_offset) as u64) << 32;

        if self.dst_register == DstRegister::FP {
            word |= 0x0001_0000_0000_0000;
        }
        if self.op0_register == Op0Register::FP {
            word |= 0x0002_0000_0000_0000;
        }

        word |= (self.op1_source as u64) << 50;

        let result_logic_raw: u64 = match self.result_logic {
            ResultLogic::Unused | ResultLogic::Op1 => 0,
            ResultLogic::Add => 1,
            ResultLogic::Mul => 2,
        };
        word |= result_logic_raw << 53;

        word |= (self.pc_update as u64) << 55;

        let ap_update_raw: u64 = match self.ap_update {
            ApUpdate::Add2 | ApUpdate::Ap => 0,
            ApUpdate::AddResult => 1,
            ApUpdate::Increment => 2,
        };
        word |= ap_update_raw << 58;

        word |= (self.op_code as u64) << 60;

        Instruction(word)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("dst_offset", &self.dst_offset())
            .field("op0_offset", &self.op0_offset())
            .field("op1_offset", &self.op1_offset())
            .field("dst_register", &self.dst_register())
            .field("op0_register", &self.op0_register())
            .field("op1_source", &self.op1_source())
            .field("result_logic", &self.result_logic())
            .field("pc_update", &self.pc_update())
            .field("ap_update", &self.ap_update())
            .field("op_code", &self.op_code())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_fields() -> InstructionFields {
        InstructionFields {
            dst_offset: -1,
            op0_offset: 0,
            op1_offset: 1,
            dst_register: DstRegister::FP,
            op0_register: Op0Register::FP,
            op1_source: Op1Source::FP,
            result_logic: ResultLogic::Op1,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Ap,
            op_code: OpCode::Call,
        }
    }

    #[test]
    fn round_trip_decode() {
        let fields = call_fields();
        let instr = fields.encode();

        assert!(!instr.is_last_bit_set());
        assert_eq!(instr.dst_offset(), fields.dst_offset);
        assert_eq!(instr.op0_offset(), fields.op0_offset);
        assert_eq!(instr.op1_offset(), fields.op1_offset);
        assert_eq!(instr.dst_register(), fields.dst_register);
        assert_eq!(instr.op0_register(), fields.op0_register);
        assert_eq!(instr.op1_source().unwrap(), fields.op1_source);
        assert_eq!(instr.result_logic().unwrap(), fields.result_logic);
        assert_eq!(instr.pc_update().unwrap(), fields.pc_update);
        assert_eq!(instr.op_code().unwrap(), fields.op_code);
        assert_eq!(instr.fp_update().unwrap(), FpUpdate::ApPlus2);
        // ap_update = 0 with OpCode::Call resolves to Add2, not Ap.
        assert_eq!(instr.ap_update().unwrap(), ApUpdate::Add2);
    }

    #[test]
    fn offset_bias_matches_spec() {
        // Raw 0 decodes to the most negative offset, raw 2^15 decodes to zero, raw u16::MAX
        // decodes to the most positive offset.
        let instr = Instruction(0);
        assert_eq!(instr.dst_offset(), -(1 << 15));

        let instr = Instruction(1 << 15);
        assert_eq!(instr.dst_offset(), 0);

        let instr = Instruction(u16::MAX as u64);
        assert_eq!(instr.dst_offset(), (1 << 15) - 1);
    }

    #[test]
    fn high_bit_set_is_rejected() {
        let instr = Instruction(1 << 63);
        assert!(instr.is_last_bit_set());
        assert!(matches!(instr.validate(), Err(Error::HighBitSet)));
    }

    #[test]
    fn invalid_op1_src() {
        // op1_src bits = 3 (0b011) is not one of the legal one-hot encodings.
        let instr = Instruction(0b011 << 50);
        assert!(matches!(instr.op1_source(), Err(Error::UndefinedOp1Source)));
    }

    #[test]
    fn ap_update_decodes_unconditionally_outside_the_zero_case() {
        // Only raw ap_update = 0 is special-cased for Call (resolving to Add2). Raw 1 (AddResult)
        // and raw 2 (Increment) decode the same regardless of op_code: the decoder does not
        // reject any op_code/ap_update combination, per the cross-field legality rules being an
        // execution-time concern.
        let mut fields = call_fields();
        fields.ap_update = ApUpdate::AddResult;
        assert_eq!(fields.encode().ap_update().unwrap(), ApUpdate::AddResult);

        fields.ap_update = ApUpdate::Increment;
        assert_eq!(fields.encode().ap_update().unwrap(), ApUpdate::Increment);
    }

    #[test]
    fn invalid_res_logic_and_pc_update() {
        let instr = Instruction(0b11 << 53);
        assert!(matches!(
            instr.result_logic(),
            Err(Error::UndefinedResultLogic)
        ));

        let instr = Instruction(0b111 << 55);
        assert!(matches!(instr.pc_update(), Err(Error::UndefinedPcUpdate)));
    }

    #[test]
    fn jnz_result_logic_is_unused() {
        let mut fields = call_fields();
        fields.op_code = OpCode::None;
        fields.pc_update = PcUpdate::ConditionalJump;
        fields.result_logic = ResultLogic::Op1;
        fields.ap_update = ApUpdate::Increment;

        let instr = fields.encode();
        assert_eq!(instr.result_logic().unwrap(), ResultLogic::Unused);
    }

    #[test]
    fn disjoint_opcode_and_result_logic_bits() {
        assert_eq!(OpCode::AssertEq as u8 & (ResultLogic::Add as u8), 0);
        assert_eq!(OpCode::Call as u8 & (ResultLogic::Mul as u8), 0);
    }
}
