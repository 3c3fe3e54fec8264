//! # cairo-vm-core
//!
//! The core execution engine of a Cairo virtual machine: memory, registers, the instruction
//! decoder and the single-step interpreter.
//!
//! # Documentation
//!
//! - [The Cairo Whitepaper](https://www.cairo-lang.org/cairo-whitepaper/).

#![warn(missing_docs, missing_debug_implementations)]
#![deny(unsafe_op_in_unsafe_fn)]

use std::fmt;

use bitflags::bitflags;
use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;

use builtin::Builtin;
use cpu::Cpu;
use error::Error;
use instr::{ApUpdate, FpUpdate, Instruction, OpCode, PcUpdate, ResultLogic};
use memory::{Memory, Pointer, Value};
use trace::Trace;

pub mod builtin;
pub mod builtins;
pub mod cpu;
pub mod error;
pub mod instr;
pub mod memory;
pub mod trace;

/// Contains the full state of a Cairo virtual machine.
///
/// This includes memory, registers, builtins, etc. It can be used to execute a Cairo program
/// and gather execution statistics, traces and other related information.
///
/// # Field
///
/// Technically, the Cairo language allows any prime field to be used as the underlying field
/// for the virtual machine. However, in practice, the only field that this crate is meant to
/// be used is the Starknet field element [`Felt`]. For this reason, it is not possible to change
/// the underlying field of the virtual machine.
///
/// # Components
///
/// The [`CairoVM`] is composed of two main components:
///
/// - [`Cpu`]: The central processing unit of the virtual machine, responsible for holding registers
///   and interacting with the memory.
///
/// - [`Memory`]: The memory associated with the virtual machine. Instructions and working memory
///   are stored here.
#[derive(Debug)]
pub struct CairoVM {
    /// The central processing unit of the virtual machine, responsible for holding registers
    /// and interacting with the memory.
    cpu: Cpu,
    /// The memory associated with the virtual machine.
    ///
    /// Instructions and working memory are stored here.
    memory: Memory,

    /// The built-in functions that the virtual machine can execute.
    builtins: BuiltinManager,
}

impl CairoVM {
    /// Creates a new virtual machine with the given builtins.
    ///
    /// Two segments are always allocated up front: segment `0` is conventionally used as the
    /// program segment (where the bytecode to execute is loaded) and segment `1` as the
    /// execution segment (where `ap`/`fp` initially point). Each builtin is then assigned its
    /// own, immediately following segment, in the order provided.
    ///
    /// `pc`, `ap` and `fp` are initialized to `(0, 0)`, `(1, 0)` and `(1, 0)` respectively; the
    /// caller is expected to relocate them (and populate the program segment) before calling
    /// [`CairoVM::step`].
    pub fn new(builtins: Vec<Box<dyn Builtin>>) -> Self {
        let mut memory = Memory::new();
        let program_segment = memory.add_segment();
        let execution_segment = memory.add_segment();

        let min_segment = memory.segment_count();
        for _ in &builtins {
            memory.add_segment();
        }
        let max_segment = memory.segment_count();

        Self {
            cpu: Cpu {
                pc: Pointer {
                    segment: program_segment,
                    offset: 0,
                },
                ap: Pointer {
                    segment: execution_segment,
                    offset: 0,
                },
                fp: Pointer {
                    segment: execution_segment,
                    offset: 0,
                },
            },
            memory,
            builtins: BuiltinManager {
                min_segment,
                max_segment,
                builtins: builtins.into_boxed_slice(),
            },
        }
    }

    /// Returns the current state of the [`Cpu`].
    #[inline(always)]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Returns a mutable reference to the [`Cpu`], for relocating registers before execution
    /// starts.
    #[inline(always)]
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Returns the current state of the [`Memory`].
    #[inline(always)]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Returns a mutable reference to the [`Memory`], for loading a program and initial inputs
    /// before execution starts.
    #[inline(always)]
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Advances the virtual machine by a single step, reporting committed memory cells and
    /// register updates to the provided [`Trace`] implementation.
    ///
    /// On success, every memory cell the step decided to assert has been committed and
    /// `(pc, ap, fp)` reflect the post-step registers. On failure, memory and registers are left
    /// entirely untouched: every fallible computation in this function runs to completion
    /// before any mutation happens.
    pub fn step<T>(&mut self, trace: &mut T) -> Result<(), Error>
    where
        T: ?Sized + Trace,
    {
        let pc = self.cpu.pc;

        // SAFETY:
        //  We make sure when updating the program counter of the `CPU` that the segment it points
        //  to remains valid.
        let instruction = unsafe { fetch_instruction(&self.cpu, &self.memory)? };

        if instruction.is_last_bit_set() {
            return Err(Error::HighBitSet);
        }

        tracing::trace!(segment = pc.segment, offset = pc.offset, word = instruction.0, "fetch");

        let mut ctx = StepContext::initial(instruction);
        compute_dst(&mut ctx, self);
        compute_op0(&mut ctx, self);
        compute_op1(&mut ctx, self)?;
        run_builtins(&mut ctx, self)?;
        deduce_from_op_code(&mut ctx, self)?;
        compute_res(&mut ctx)?;
        apply_op_code_effects(&mut ctx)?;

        let (next_pc, next_ap, next_fp) = compute_register_updates(&ctx, self)?;

        // Every fallible computation has already run to completion: from this point on, commit
        // unconditionally.
        let writes = ctx.deduced_writes();
        for &(addr, value) in &writes {
            self.memory.insert(addr, value.as_ref())?;
        }

        self.cpu.pc = next_pc;
        self.cpu.ap = next_ap;
        self.cpu.fp = next_fp;

        for (addr, value) in writes {
            trace.cell_written(addr, value);
        }
        trace.step_committed(self.cpu.pc, self.cpu.ap, self.cpu.fp);

        tracing::trace!(
            pc = ?self.cpu.pc,
            ap = ?self.cpu.ap,
            fp = ?self.cpu.fp,
            written = writes.len(),
            "commit"
        );

        Ok(())
    }
}

/// The builtin manager is responsible for holding a collection of [`Builtin`]s implementations
/// and running them when necessary.
///
/// # Segments
///
/// Each builtin is assigned a segment, which is used to store the mapped I/O data that it will
/// used as an input of its execution. The builtin manager is responsible for keeping track
/// of which segment is assigned to which builtin, and efficiently running them when necessary.
struct BuiltinManager {
    /// The first segment allocated for the builtins managed by this [`BuiltinManager`].
    min_segment: usize,
    /// The first segment not allocated for the builtins managed by this [`BuiltinManager`].
    max_segment: usize,
    /// The builtins managed by this [`BuiltinManager`].
    builtins: Box<[Box<dyn Builtin>]>,
}

impl BuiltinManager {
    /// Attempts to get the [`BuiltinRunner`] suitable for deducing a memory cell in the provided
    /// segment.
    pub fn get_runner(&self, segment: usize) -> Option<&dyn Builtin> {
        if segment < self.min_segment || segment >= self.max_segment {
            None
        } else {
            let index = segment - self.min_segment;

            // SAFETY:
            //  We know that `segment` is within the bounds of `self.builtins` because
            //  we checked its value against `self.min_segment` and `self.max_segment`.
            Some(unsafe { &**self.builtins.get_unchecked(index) })
        }
    }
}

impl fmt::Debug for BuiltinManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinManager")
            .field("min_segment", &self.min_segment)
            .field("max_segment", &self.max_segment)
            .field("builtins", &self.builtins.len())
            .finish()
    }
}

/// Attempts to fetch an instruction from the provided [`Memory`].
///
/// The returned instruction is the one directly referenced by the **Program Counter** of the
/// [`Cpu`] instance. Note that the instruction is not actually decoded in any way, meaning
/// that it might be missing an eventual associated immediate value.
///
/// # Safety
///
/// The program counter of the [`Cpu`] instance must reference a valid segment within [`Memory`].
#[inline]
unsafe fn fetch_instruction(cpu: &Cpu, memory: &Memory) -> Result<Instruction, Error> {
    // SAFETY:
    //  The caller must make sure that `memory` contains a segment at the index pointed to by
    //  `cpu.pc.segment`.
    let segment = unsafe { memory.segment_unchecked(cpu.pc.segment) };

    let instr_cell = segment
        .get(cpu.pc.offset)
        .ok_or(Error::ProgramCounterLost)?
        .scalar()
        .ok_or(Error::ProgramCounterLost)?;

    let instr = Instruction(instr_cell.to_u64().ok_or(Error::UndefinedInstruction)?);

    Ok(instr)
}

/// Determines the address of the destination of an instruction.
#[inline]
fn compute_dst(ctx: &mut StepContext, vm: &CairoVM) {
    ctx.dst_addr = match ctx.instruction.dst_register() {
        instr::DstRegister::AP => vm.cpu.ap,
        instr::DstRegister::FP => vm.cpu.fp,
    };

    // We know that this operation won't ever overflow because `ap` and `fp` must
    // both reference values within a segment, which cannot overflow `isize`.
    ctx.dst_addr.offset = ctx
        .dst_addr
        .offset
        .wrapping_add(ctx.instruction.dst_offset() as isize as usize);

    // SAFETY:
    //  We know by invariant of `CairoVM` that the segment referenced by `ap` and `fp`
    //  is always valid.
    let segment = unsafe { vm.memory.segment_unchecked(ctx.dst_addr.segment) };

    if let Some(val) = segment.get(ctx.dst_addr.offset) {
        ctx.dst = val.copied();
        ctx.flags.insert(StepContextFlags::DST_ASSERTED);
    }
}

/// Determines the address of the first operand of an instruction.
#[inline]
fn compute_op0(ctx: &mut StepContext, vm: &CairoVM) {
    ctx.op0_addr = match ctx.instruction.op0_register() {
        instr::Op0Register::AP => vm.cpu.ap,
        instr::Op0Register::FP => vm.cpu.fp,
    };

    // We know that this operation won't ever overflow because `ap` and `fp` must
    // both reference values within a segment, which cannot overflow `isize`.
    ctx.op0_addr.offset = ctx
        .op0_addr
        .offset
        .wrapping_add(ctx.instruction.op0_offset() as isize as usize);

    // SAFETY:
    //  We know by invariant of `CairoVM` that the segment referenced by `ap` and `fp`
    //  is always valid.
    let segment = unsafe { vm.memory.segment_unchecked(ctx.op0_addr.segment) };

    if let Some(val) = segment.get(ctx.op0_addr.offset) {
        ctx.op0 = val.copied();
        ctx.flags.insert(StepContextFlags::OP0_ASSERTED);
    }
}

/// Determines the address of the second operand of an instruction.
#[inline]
fn compute_op1(ctx: &mut StepContext, vm: &CairoVM) -> Result<(), Error> {
    match ctx.instruction.op1_source()? {
        instr::Op1Source::Op0 => {
            // `op1_addr = M[op0_addr] + op1_offset`: the first operand must already be known
            // and must be a pointer.
            if !ctx.flags.has_op0() {
                return Err(Error::CantDeduceOp0);
            }

            ctx.op1_addr = ctx.op0.as_pointer(ctx.op0_addr)?;
        }
        instr::Op1Source::PC => ctx.op1_addr = vm.cpu.pc,
        instr::Op1Source::FP => ctx.op1_addr = vm.cpu.fp,
        instr::Op1Source::AP => ctx.op1_addr = vm.cpu.ap,
    }

    // We know that this operation won't ever overflow because `ap` and `fp` must
    // both reference values within a segment, which cannot overflow `isize`.
    ctx.op1_addr.offset = ctx
        .op1_addr
        .offset
        .wrapping_add(ctx.instruction.op1_offset() as isize as usize);

    // SAFETY:
    //  We know by invariant of `CairoVM` that the segment referenced by `ap` and `fp`
    //  is always valid.
    let segment = unsafe { vm.memory.segment_unchecked(ctx.op1_addr.segment) };

    if let Some(val) = segment.get(ctx.op1_addr.offset) {
        ctx.op1 = val.copied();
        ctx.flags.insert(StepContextFlags::OP1_ASSERTED);
    }

    Ok(())
}

/// Attempts to deduce the value of a memory cell using one of the registered builtins.
///
/// # Returns
///
/// - `Err(_)` if the choosen builtin failed to run correctly.
///
/// - `Ok(true)` if the value was successfully deduced with a builtin.
///
/// - `Ok(false)` if the value could not be deduced because no builtin was registered for the
///   provided segment.
fn deduce_with_builtin(p: Pointer, vm: &CairoVM, result: &mut Value) -> Result<bool, Error> {
    let Some(runner) = vm.builtins.get_runner(p.segment) else {
        return Ok(false);
    };

    // SAFETY:
    //  We know by invariant of the `CairoVM` that the segments for which a builtin
    //  is registered are always present.
    let segment = unsafe { vm.memory.segment_unchecked(p.segment) };

    match runner.deduce(p.offset, segment, result) {
        Ok(()) => Ok(true),
        Err(err) => Err(err.into()),
    }
}

/// Runs the builtins when applicable to deduce the missing operands of an instruction.
///
/// This covers `dst` as well as `op0`/`op1`: a builtin's output cells are a pure function of
/// its input cells regardless of which instruction field happens to address them, so `dst`
/// landing on an unwritten output cell must be memoized the same way, rather than falling
/// through to `AssertEq`'s generic deduction and letting an arbitrary `res` be written over it.
///
/// Deduced values are only recorded in `ctx`; they are committed to [`Memory`] (subject to
/// write-once) by the caller once the whole step has succeeded.
fn run_builtins(ctx: &mut StepContext, vm: &CairoVM) -> Result<(), Error> {
    if !ctx.flags.has_dst() && deduce_with_builtin(ctx.dst_addr, vm, &mut ctx.dst)? {
        ctx.flags.insert(StepContextFlags::DST_DEDUCED);
    }

    if !ctx.flags.has_op0() && deduce_with_builtin(ctx.op0_addr, vm, &mut ctx.op0)? {
        ctx.flags.insert(StepContextFlags::OP0_DEDUCED);
    }

    if !ctx.flags.has_op1() && deduce_with_builtin(ctx.op1_addr, vm, &mut ctx.op1)? {
        ctx.flags.insert(StepContextFlags::OP1_DEDUCED);
    }

    Ok(())
}

/// Attempts to deduce the value of `op1` given a result logic and the values of `op0` and `dst`.
fn deduce_op1_from_op0(
    res_logic: ResultLogic,
    op0: Option<&Value>,
    dst: &Value,
    op1: &mut Value,
) -> Result<bool, Error> {
    match res_logic {
        ResultLogic::Op1 | ResultLogic::Unused => {
            //    dst = op1
            *op1 = *dst;
            Ok(true)
        }
        ResultLogic::Add => {
            let Some(op0) = op0 else { return Ok(false) };

            //     dst = op0 + op1
            // =>  op1 = dst - op0
            *op1 = dst.subtract(op0)?;
            Ok(true)
        }
        ResultLogic::Mul => {
            let Some(op0) = op0 else { return Ok(false) };

            //     dst = op0 * op1
            // =>  op1 = dst / op0
            *op1 = dst.divide(op0)?;
            Ok(true)
        }
    }
}

/// Attempts to deduce the value of `op0` given a result logic and the values of `op1` and `dst`.
fn deduce_op0_from_op1(
    res_logic: ResultLogic,
    op1: &Value,
    dst: &Value,
    op0: &mut Value,
) -> Result<bool, Error> {
    match res_logic {
        ResultLogic::Op1 | ResultLogic::Unused => Ok(false),
        ResultLogic::Add => {
            //     dst = op0 + op1
            // =>  op0 = dst - op1
            *op0 = dst.subtract(op1)?;
            Ok(true)
        }
        ResultLogic::Mul => {
            //     dst = op0 * op1
            // =>  op0 = dst / op1
            *op0 = dst.divide(op1)?;
            Ok(true)
        }
    }
}

/// Attempt to deduce missing operands from the OP-Code of the instruction.
///
/// This runs before [`compute_res`]: it only handles the deductions that don't themselves
/// depend on `res` (`Call`'s `op0`/`dst`, and `AssertEq`'s reverse deduction of a missing
/// operand from an already-known `dst`). The forward direction of `AssertEq` (deducing `dst`
/// from a fully-known `res`) is handled by [`apply_op_code_effects`].
fn deduce_from_op_code(ctx: &mut StepContext, vm: &CairoVM) -> Result<(), Error> {
    match ctx.instruction.op_code()? {
        instr::OpCode::Call => {
            // `op0` must be asserted to `pc + instruction_size` (the return address).
            let return_addr = vm.cpu.pc.wrapping_add(ctx.instruction.size()?);
            if ctx.flags.has_op0() {
                if ctx.op0 != return_addr {
                    return Err(Error::Contradiction { addr: ctx.op0_addr });
                }
            } else {
                ctx.op0 = return_addr.into();
                ctx.flags.insert(StepContextFlags::OP0_DEDUCED);
            }

            // `dst` must be asserted to the current `fp` (the saved frame pointer).
            if ctx.flags.has_dst() {
                if ctx.dst != vm.cpu.fp {
                    return Err(Error::Contradiction { addr: ctx.dst_addr });
                }
            } else {
                ctx.dst = vm.cpu.fp.into();
                ctx.flags.insert(StepContextFlags::DST_DEDUCED);
            }
        }
        instr::OpCode::AssertEq => {
            // With this op-code, we know that the result of the instruction must be
            // asserted to be equal to `dst`.
            // Of course, this is only relevant if we already have the value of
            // both `dst` and `op0` or `op1`.
            if ctx.flags.has_dst() {
                let res_logic = ctx.instruction.result_logic()?;

                if !ctx.flags.has_op1() {
                    let op0 = if ctx.flags.has_op0() {
                        Some(&ctx.op0)
                    } else {
                        None
                    };

                    // We can deduce `op1`.
                    if deduce_op1_from_op0(res_logic, op0, &ctx.dst, &mut ctx.op1)? {
                        ctx.flags.insert(StepContextFlags::OP1_DEDUCED);
                    }
                }

                if ctx.flags.has_op1() && !ctx.flags.has_op0() {
                    // We can deduce `op0`.
                    if deduce_op0_from_op1(res_logic, &ctx.op1, &ctx.dst, &mut ctx.op0)? {
                        ctx.flags.insert(StepContextFlags::OP0_DEDUCED);
                    }
                }
            }
        }
        _ => (),
    }

    Ok(())
}

/// Computes the `res` operand of the instruction from its `res_logic` and its (by now fully
/// resolved, except for the `AssertEq` forward-deduction case) `op0`/`op1`.
///
/// Stores the result (or its absence, for [`ResultLogic::Unused`]) into `ctx.res`.
fn compute_res(ctx: &mut StepContext) -> Result<(), Error> {
    let res_logic = ctx.instruction.result_logic()?;

    ctx.res = match res_logic {
        ResultLogic::Unused => None,
        ResultLogic::Op1 => {
            if !ctx.flags.has_op1() {
                return Err(Error::CantDeduceOp1);
            }
            Some(ctx.op1)
        }
        ResultLogic::Add => {
            if !ctx.flags.has_op0() {
                return Err(Error::CantDeduceOp0);
            }
            if !ctx.flags.has_op1() {
                return Err(Error::CantDeduceOp1);
            }
            Some(ctx.op0.add(&ctx.op1)?)
        }
        ResultLogic::Mul => {
            if !ctx.flags.has_op0() {
                return Err(Error::CantDeduceOp0);
            }
            if !ctx.flags.has_op1() {
                return Err(Error::CantDeduceOp1);
            }
            Some(ctx.op0.multiply(&ctx.op1)?)
        }
    };

    Ok(())
}

/// Applies the memory-affecting side effects of the instruction's OP-Code, now that `res` is
/// known.
///
/// `Call`'s frame cells and `AssertEq`'s reverse deduction were already handled by
/// [`deduce_from_op_code`]; this only covers `AssertEq`'s forward direction (`dst` deduced from
/// a fully-known `res`) and its final consistency check.
fn apply_op_code_effects(ctx: &mut StepContext) -> Result<(), Error> {
    if ctx.instruction.op_code()? == OpCode::AssertEq {
        if let Some(res) = ctx.res {
            if ctx.flags.has_dst() {
                if ctx.dst != res {
                    return Err(Error::Contradiction { addr: ctx.dst_addr });
                }
            } else {
                ctx.dst = res;
                ctx.flags.insert(StepContextFlags::DST_DEDUCED);
            }
        }
    }

    Ok(())
}

/// Computes the post-step `(pc, ap, fp)` register tuple from the pre-step registers of `vm` and
/// the fully resolved `ctx`.
fn compute_register_updates(
    ctx: &StepContext,
    vm: &CairoVM,
) -> Result<(Pointer, Pointer, Pointer), Error> {
    let size = ctx.instruction.size()?;

    // `fp` is always derived from the pre-update `ap`, per the distilled spec's tie-break rule.
    let next_fp = match ctx.instruction.fp_update()? {
        FpUpdate::Fp => vm.cpu.fp,
        FpUpdate::ApPlus2 => vm.cpu.ap.wrapping_add(2),
        FpUpdate::Dst => ctx.require_dst()?.as_pointer(ctx.dst_addr)?,
    };

    let next_pc = match ctx.instruction.pc_update()? {
        PcUpdate::Regular => vm.cpu.pc.wrapping_add(size),
        PcUpdate::AbsoluteJump => match ctx.require_res()? {
            Value::Pointer(p) => p,
            Value::Scalar(f) => Pointer {
                segment: vm.cpu.pc.segment,
                offset: f.to_usize().ok_or(Error::PointerTooLarge)?,
            },
        },
        PcUpdate::RelativeJump => {
            let res = ctx.require_res()?.as_scalar(ctx.op1_addr)?;
            vm.cpu.pc.add_felt(&res)?
        }
        PcUpdate::ConditionalJump => {
            let dst = ctx.require_dst()?;
            let dst_is_zero = matches!(dst, Value::Scalar(f) if f == Felt::ZERO);

            if dst_is_zero {
                vm.cpu.pc.wrapping_add(size)
            } else {
                let op1 = ctx.require_op1()?.as_scalar(ctx.op1_addr)?;
                vm.cpu.pc.add_felt(&op1)?
            }
        }
    };

    let next_ap = match ctx.instruction.ap_update()? {
        ApUpdate::Ap => vm.cpu.ap,
        ApUpdate::Increment => vm.cpu.ap.wrapping_add(1),
        ApUpdate::Add2 => vm.cpu.ap.wrapping_add(2),
        ApUpdate::AddResult => {
            let res = ctx.require_res()?.as_scalar(ctx.op1_addr)?;
            vm.cpu.ap.add_felt(&res)?
        }
    };

    Ok((next_pc, next_ap, next_fp))
}

bitflags! {
    /// Some flags associated with a [`StepContext`].
    #[derive(Clone, Copy)]
    struct StepContextFlags: u8 {
        /// Whether the destination of the instruction was deduced from the other
        /// operands.
        const DST_DEDUCED = 1 << 0;
        /// Whether the destination of the instruction was asserted by some
        /// already existing memory cell.
        const DST_ASSERTED = 1 << 1;
        /// Whether the first operand of the instruction was deduced from the
        /// other operands.
        const OP0_DEDUCED = 1 << 2;
        /// Whether the first operand of the instruction was asserted by some
        /// already existing memory cell.
        const OP0_ASSERTED = 1 << 3;
        /// Whether the second operand of the instruction was deduced from the
        /// other operands.
        const OP1_DEDUCED = 1 << 4;
        /// Whether the second operand of the instruction was asserted by some
        /// already existing memory cell.
        const OP1_ASSERTED = 1 << 5;
    }
}

impl StepContextFlags {
    /// Returns whether the destination of the instruction is known.
    #[inline(always)]
    pub const fn has_dst(self) -> bool {
        self.contains(Self::DST_ASSERTED.union(Self::DST_DEDUCED))
    }

    /// Returns whether the first operand of the instruction is known.
    #[inline(always)]
    pub const fn has_op0(self) -> bool {
        self.contains(Self::OP0_ASSERTED.union(Self::OP0_DEDUCED))
    }

    /// Returns whether the second operand of the instruction is known.
    #[inline(always)]
    pub const fn has_op1(self) -> bool {
        self.contains(Self::OP1_ASSERTED.union(Self::OP1_DEDUCED))
    }
}

/// Stores a state that must be kept around while decoding and executing an instruction.
struct StepContext {
    /// The instruction being decoded.
    pub instruction: Instruction,
    /// The destination address of the instruction being decoded.
    pub dst_addr: Pointer,
    /// The value of the destination of the instruction being decoded, if known.
    ///
    /// Only holds a meaningful value if the `DST_ASSERTED` flag or the `DST_DEDUCED` flag is set.
    pub dst: Value,
    /// The address of the first operand of the instruction being decoded.
    pub op0_addr: Pointer,
    /// The value of the first operand of the instruction being decoded, if known.
    ///
    /// Only holds a meaningful value if the `OP0_ASSERTED` flag or the `OP0_DEDUCED` flag is set.
    pub op0: Value,
    /// The address of the second operand of the instruction being decoded.
    pub op1_addr: Pointer,
    /// The value of the second operand of the instruction being decoded, if known.
    ///
    /// Only holds a meaningful value if the `OP1_ASSERTED` flag or the `OP1_DEDUCED` flag is set.
    pub op1: Value,
    /// Some flags associated with the context.
    pub flags: StepContextFlags,
    /// The result of the instruction, computed by [`compute_res`].
    ///
    /// `None` if and only if `result_logic() == ResultLogic::Unused`.
    pub res: Option<Value>,
}

impl StepContext {
    /// Creates a new [`StepContext`] with the provided instruction.
    ///
    /// All fields besides `instruction` are initialized to dummy values and should be properly
    /// set before using the context.
    #[inline]
    pub const fn initial(instruction: Instruction) -> Self {
        Self {
            instruction,
            dst_addr: Pointer {
                segment: 0,
                offset: 0,
            },
            dst: Value::Scalar(Felt::ZERO),
            op0_addr: Pointer {
                segment: 0,
                offset: 0,
            },
            op0: Value::Scalar(Felt::ZERO),
            op1_addr: Pointer {
                segment: 0,
                offset: 0,
            },
            op1: Value::Scalar(Felt::ZERO),
            flags: StepContextFlags::empty(),
            res: None,
        }
    }

    /// Returns `dst`, failing with [`Error::UndefinedValue`] if it was never resolved.
    fn require_dst(&self) -> Result<Value, Error> {
        if self.flags.has_dst() {
            Ok(self.dst)
        } else {
            Err(Error::UndefinedValue { addr: self.dst_addr })
        }
    }

    /// Returns `op1`, failing with [`Error::UndefinedValue`] if it was never resolved.
    fn require_op1(&self) -> Result<Value, Error> {
        if self.flags.has_op1() {
            Ok(self.op1)
        } else {
            Err(Error::UndefinedValue { addr: self.op1_addr })
        }
    }

    /// Returns `res`, failing with [`Error::CantDeduceOp1`] if `result_logic()` was `Unused`.
    ///
    /// This can only happen for a `Jnz` instruction misusing a register update rule that
    /// requires `res`; regular decoding never produces that combination.
    fn require_res(&self) -> Result<Value, Error> {
        self.res.ok_or(Error::CantDeduceOp1)
    }

    /// Returns the list of `(address, value)` pairs this step decided to newly assert, in a
    /// stable order (`op0`, `op1`, `dst`), ready to be committed through [`Memory::insert`].
    fn deduced_writes(&self) -> Vec<(Pointer, Value)> {
        let mut writes = Vec::with_capacity(3);

        if self.flags.contains(StepContextFlags::OP0_DEDUCED) {
            writes.push((self.op0_addr, self.op0));
        }
        if self.flags.contains(StepContextFlags::OP1_DEDUCED) {
            writes.push((self.op1_addr, self.op1));
        }
        if self.flags.contains(StepContextFlags::DST_DEDUCED) {
            writes.push((self.dst_addr, self.dst));
        }

        writes
    }
}
