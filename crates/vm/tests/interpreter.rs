//! Integration tests exercising [`CairoVM::step`] end to end.

use cairo_vm_core::builtin::Builtin;
use cairo_vm_core::builtins::BitwiseBuiltin;
use cairo_vm_core::error::Error;
use cairo_vm_core::instr::{
    ApUpdate, DstRegister, Instruction, InstructionFields, Op0Register, Op1Source, OpCode,
    PcUpdate, ResultLogic,
};
use cairo_vm_core::memory::{Pointer, Value, ValueRef};
use cairo_vm_core::trace::{NoopTrace, Trace};
use cairo_vm_core::CairoVM;

use starknet_types_core::felt::Felt;

fn addr(segment: usize, offset: usize) -> Pointer {
    Pointer { segment, offset }
}

fn write_word(vm: &mut CairoVM, at: Pointer, instr: Instruction) {
    let word = Felt::from(instr.0);
    vm.memory_mut().insert(at, ValueRef::Scalar(&word)).unwrap();
}

fn write_scalar(vm: &mut CairoVM, at: Pointer, value: u64) {
    let felt = Felt::from(value);
    vm.memory_mut().insert(at, ValueRef::Scalar(&felt)).unwrap();
}

#[test]
fn high_bit_error() {
    let mut vm = CairoVM::new(Vec::new());
    write_word(&mut vm, addr(0, 0), Instruction(1 << 63));

    let err = vm.step(&mut NoopTrace).unwrap_err();
    assert!(matches!(err, Error::HighBitSet));
}

#[test]
fn invalid_op1_src() {
    let mut vm = CairoVM::new(Vec::new());
    // op1_src bits = 3 (0b011), not one of the legal one-hot encodings.
    write_word(&mut vm, addr(0, 0), Instruction(0b011 << 50));

    let err = vm.step(&mut NoopTrace).unwrap_err();
    assert!(matches!(err, Error::UndefinedOp1Source));
}

#[test]
fn call_semantics() {
    let mut vm = CairoVM::new(Vec::new());

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 2),
        fp: addr(1, 0),
    };

    let fields = InstructionFields {
        dst_offset: 0,
        op0_offset: 1,
        op1_offset: 1,
        dst_register: DstRegister::AP,
        op0_register: Op0Register::AP,
        op1_source: Op1Source::PC,
        result_logic: ResultLogic::Op1,
        pc_update: PcUpdate::AbsoluteJump,
        ap_update: ApUpdate::Ap,
        op_code: OpCode::Call,
    };
    let instr = fields.encode();
    assert_eq!(instr.size().unwrap(), 2);

    write_word(&mut vm, addr(0, 0), instr);

    let target = addr(0, 10);
    vm.memory_mut()
        .insert(addr(0, 1), ValueRef::Pointer(&target))
        .unwrap();

    vm.step(&mut NoopTrace).unwrap();

    assert_eq!(
        vm.memory().get_required(addr(1, 2)).unwrap().copied(),
        Value::Pointer(addr(1, 0))
    );
    assert_eq!(
        vm.memory().get_required(addr(1, 3)).unwrap().copied(),
        Value::Pointer(addr(0, 2))
    );
    assert_eq!(vm.cpu().pc, addr(0, 10));
    assert_eq!(vm.cpu().ap, addr(1, 4));
    assert_eq!(vm.cpu().fp, addr(1, 4));
}

fn assert_eq_fields() -> InstructionFields {
    InstructionFields {
        dst_offset: 0,
        op0_offset: 0,
        op1_offset: 1,
        dst_register: DstRegister::AP,
        op0_register: Op0Register::FP,
        op1_source: Op1Source::FP,
        result_logic: ResultLogic::Add,
        pc_update: PcUpdate::Regular,
        ap_update: ApUpdate::Ap,
        op_code: OpCode::AssertEq,
    }
}

#[test]
fn assert_eq_deduces_unknown_destination() {
    let mut vm = CairoVM::new(Vec::new());

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 10),
        fp: addr(1, 0),
    };

    let instr = assert_eq_fields().encode();
    write_word(&mut vm, addr(0, 0), instr);
    write_scalar(&mut vm, addr(1, 0), 3); // op0
    write_scalar(&mut vm, addr(1, 1), 4); // op1

    vm.step(&mut NoopTrace).unwrap();

    assert_eq!(
        vm.memory().get_required(addr(1, 10)).unwrap().copied(),
        Value::Scalar(Felt::from(7u64))
    );
}

#[test]
fn assert_eq_rejects_contradicting_destination() {
    let mut vm = CairoVM::new(Vec::new());

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 10),
        fp: addr(1, 0),
    };

    let instr = assert_eq_fields().encode();
    write_word(&mut vm, addr(0, 0), instr);
    write_scalar(&mut vm, addr(1, 0), 3); // op0
    write_scalar(&mut vm, addr(1, 1), 4); // op1
    write_scalar(&mut vm, addr(1, 10), 8); // dst, contradicts 3 + 4 = 7

    let err = vm.step(&mut NoopTrace).unwrap_err();
    assert!(matches!(err, Error::Contradiction { addr: a } if a == addr(1, 10)));
}

fn jnz_fields() -> InstructionFields {
    InstructionFields {
        dst_offset: 0,
        op0_offset: 0,
        op1_offset: 1,
        dst_register: DstRegister::AP,
        op0_register: Op0Register::AP,
        op1_source: Op1Source::PC,
        result_logic: ResultLogic::Op1,
        pc_update: PcUpdate::ConditionalJump,
        ap_update: ApUpdate::Ap,
        op_code: OpCode::None,
    }
}

#[test]
fn jnz_fallthrough_when_dst_is_zero() {
    let mut vm = CairoVM::new(Vec::new());

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 0),
        fp: addr(1, 0),
    };

    let instr = jnz_fields().encode();
    assert_eq!(instr.size().unwrap(), 2);
    write_word(&mut vm, addr(0, 0), instr);
    write_scalar(&mut vm, addr(0, 1), 5); // op1 immediate
    write_scalar(&mut vm, addr(1, 0), 0); // dst

    vm.step(&mut NoopTrace).unwrap();

    assert_eq!(vm.cpu().pc, addr(0, 2));
}

#[test]
fn jnz_taken_when_dst_is_nonzero() {
    let mut vm = CairoVM::new(Vec::new());

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 0),
        fp: addr(1, 0),
    };

    let instr = jnz_fields().encode();
    write_word(&mut vm, addr(0, 0), instr);
    write_scalar(&mut vm, addr(0, 1), 5); // op1 immediate
    write_scalar(&mut vm, addr(1, 0), 9); // dst, nonzero

    vm.step(&mut NoopTrace).unwrap();

    assert_eq!(vm.cpu().pc, addr(0, 5));
}

#[test]
fn step_atomicity_on_error_leaves_state_untouched() {
    let mut vm = CairoVM::new(Vec::new());

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 10),
        fp: addr(1, 0),
    };

    // An AssertEq instruction whose op0/op1 are both unknown: compute_res cannot succeed,
    // so the step must fail without touching memory or registers.
    let instr = assert_eq_fields().encode();
    write_word(&mut vm, addr(0, 0), instr);

    let pre_pc = vm.cpu().pc;
    let pre_ap = vm.cpu().ap;
    let pre_fp = vm.cpu().fp;

    let err = vm.step(&mut NoopTrace).unwrap_err();
    assert!(matches!(err, Error::CantDeduceOp0));

    assert_eq!(vm.cpu().pc, pre_pc);
    assert_eq!(vm.cpu().ap, pre_ap);
    assert_eq!(vm.cpu().fp, pre_fp);
    assert!(vm.memory().get(addr(1, 10)).unwrap().is_none());
}

/// A [`Trace`] that just counts how many cells were committed by the last step.
#[derive(Default)]
struct CountingTrace {
    writes: usize,
}

impl Trace for CountingTrace {
    fn cell_written(&mut self, _addr: Pointer, _value: Value) {
        self.writes += 1;
    }
}

#[test]
fn bitwise_output_cell_is_memoized_through_step() {
    // Builtin segment 2 (0 = program, 1 = execution, 2 = the registered bitwise builtin).
    let mut vm = CairoVM::new(vec![Box::new(BitwiseBuiltin::new()) as Box<dyn Builtin>]);

    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 0),
        fp: addr(1, 0),
    };

    // Block base (2, 0): input cells at offsets 0/1, AND output at offset 2.
    write_scalar(&mut vm, addr(2, 0), 0b1100);
    write_scalar(&mut vm, addr(2, 1), 0b1010);

    // op0 (and dst, incidentally, since both resolve to ap+0) holds a pointer to the block base;
    // op1_src = Op0 with op1_offset = 2 makes op1_addr = M[op0_addr] + 2, i.e. the AND cell.
    let target = addr(2, 0);
    vm.memory_mut()
        .insert(addr(1, 0), ValueRef::Pointer(&target))
        .unwrap();

    let fields = InstructionFields {
        dst_offset: 0,
        op0_offset: 0,
        op1_offset: 2,
        dst_register: DstRegister::AP,
        op0_register: Op0Register::AP,
        op1_source: Op1Source::Op0,
        result_logic: ResultLogic::Op1,
        pc_update: PcUpdate::Regular,
        ap_update: ApUpdate::Increment,
        op_code: OpCode::None,
    };
    let instr = fields.encode();
    write_word(&mut vm, addr(0, 0), instr);

    let mut trace = CountingTrace::default();
    vm.step(&mut trace).unwrap();

    // The builtin's output cell was deduced and memoized through the normal write-once path.
    assert_eq!(
        vm.memory().get_required(addr(2, 2)).unwrap().copied(),
        Value::Scalar(Felt::from(0b1000u64))
    );
    assert_eq!(trace.writes, 1);

    // A conflicting direct write to the now-memoized output cell is rejected.
    let wrong = Felt::from(0u64);
    let err = vm
        .memory_mut()
        .insert(addr(2, 2), ValueRef::Scalar(&wrong))
        .unwrap_err();
    assert!(matches!(err, Error::Contradiction { addr: a } if a == addr(2, 2)));

    // Re-running the same instruction from the same registers reads the memoized cell directly
    // (it is now asserted, not re-deduced), so the step commits no new writes.
    *vm.cpu_mut() = cairo_vm_core::cpu::Cpu {
        pc: addr(0, 0),
        ap: addr(1, 0),
        fp: addr(1, 0),
    };
    let mut trace = CountingTrace::default();
    vm.step(&mut trace).unwrap();
    assert_eq!(trace.writes, 0);
}
