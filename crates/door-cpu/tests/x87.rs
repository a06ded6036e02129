mod common;

use common::{setup, step, DATA_SEG};
use door_cpu::CpuFault;
use door_mem::GuestMemory;

fn write_f32(mem: &mut door_mem::ProtectedMemory, off: u16, v: f32) {
    mem.write_u32(DATA_SEG, off, v.to_bits()).unwrap();
}

fn write_f64(mem: &mut door_mem::ProtectedMemory, off: u16, v: f64) {
    mem.write_bytes(DATA_SEG, off, &v.to_le_bytes()).unwrap();
}

#[test]
fn fadd_m32_adds_into_st0_without_changing_depth() {
    // fld dword [4]; fadd dword [0]
    let (mut cpu, mut mem) = setup(&[0xD9, 0x06, 0x04, 0x00, 0xD8, 0x06, 0x00, 0x00]);
    write_f32(&mut mem, 0, 1.5);
    write_f32(&mut mem, 4, 0.5);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.depth(), 1);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.st(0).unwrap(), 2.0);
    assert_eq!(cpu.fpu.depth(), 1, "FADD must not push or pop");
}

#[test]
fn fadd_m64_uses_double_precision() {
    // fld qword [0]; fadd qword [8]
    let (mut cpu, mut mem) = setup(&[0xDD, 0x06, 0x00, 0x00, 0xDC, 0x06, 0x08, 0x00]);
    write_f64(&mut mem, 0, 1.0e10);
    write_f64(&mut mem, 8, 0.25);
    step(&mut cpu, &mut mem);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.st(0).unwrap(), 1.0e10 + 0.25);
}

#[test]
fn fsub_and_fdiv_memory_forms_keep_operand_order() {
    // fld dword [0]; fsub dword [4]; fdiv dword [8]
    let (mut cpu, mut mem) = setup(&[
        0xD9, 0x06, 0x00, 0x00, 0xD8, 0x26, 0x04, 0x00, 0xD8, 0x36, 0x08, 0x00,
    ]);
    write_f32(&mut mem, 0, 10.0);
    write_f32(&mut mem, 4, 4.0);
    write_f32(&mut mem, 8, 2.0);
    step(&mut cpu, &mut mem);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.st(0).unwrap(), 6.0);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.st(0).unwrap(), 3.0);
}

#[test]
fn faddp_adds_and_pops() {
    // fld1; fld1; faddp
    let (mut cpu, mut mem) = setup(&[0xD9, 0xE8, 0xD9, 0xE8, 0xDE, 0xC1]);
    step(&mut cpu, &mut mem);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.depth(), 2);
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.depth(), 1);
    assert_eq!(cpu.fpu.st(0).unwrap(), 2.0);
}

#[test]
fn fild_and_fistp_round_trip_integers() {
    // fild word [0]; fchs; fistp word [2]
    let (mut cpu, mut mem) = setup(&[0xDF, 0x06, 0x00, 0x00, 0xD9, 0xE0, 0xDF, 0x1E, 0x02, 0x00]);
    mem.write_u16(DATA_SEG, 0, (-7i16) as u16).unwrap();
    step(&mut cpu, &mut mem);
    assert_eq!(cpu.fpu.st(0).unwrap(), -7.0);
    step(&mut cpu, &mut mem);
    step(&mut cpu, &mut mem);
    assert_eq!(mem.read_u16(DATA_SEG, 2).unwrap(), 7);
    assert_eq!(cpu.fpu.depth(), 0, "FISTP pops");
}

#[test]
fn fstp_m32_rounds_through_single_precision() {
    // fld qword [0]; fstp dword [8]
    let (mut cpu, mut mem) = setup(&[0xDD, 0x06, 0x00, 0x00, 0xD9, 0x1E, 0x08, 0x00]);
    write_f64(&mut mem, 0, 0.1);
    step(&mut cpu, &mut mem);
    step(&mut cpu, &mut mem);
    let bits = mem.read_u32(DATA_SEG, 8).unwrap();
    assert_eq!(f32::from_bits(bits), 0.1f32);
    assert_eq!(cpu.fpu.depth(), 0);
}

#[test]
fn fsqrt_and_fabs_operate_in_place() {
    // fld dword [0]; fchs; fabs; fsqrt
    let (mut cpu, mut mem) = setup(&[0xD9, 0x06, 0x00, 0x00, 0xD9, 0xE0, 0xD9, 0xE1, 0xD9, 0xFA]);
    write_f32(&mut mem, 0, 2.25);
    for _ in 0..4 {
        step(&mut cpu, &mut mem);
    }
    assert_eq!(cpu.fpu.st(0).unwrap(), 1.5);
    assert_eq!(cpu.fpu.depth(), 1);
}

#[test]
fn fcompp_sets_condition_codes_readable_via_fnstsw() {
    // fld1; fldz; fcompp; fnstsw ax
    let (mut cpu, mut mem) = setup(&[0xD9, 0xE8, 0xD9, 0xEE, 0xDE, 0xD9, 0xDF, 0xE0]);
    for _ in 0..4 {
        step(&mut cpu, &mut mem);
    }
    // ST(0) = 0.0 < ST(1) = 1.0: C0 set, C3 clear.
    assert_ne!(cpu.regs.ax() & 0x0100, 0, "C0");
    assert_eq!(cpu.regs.ax() & 0x4000, 0, "C3");
    assert_eq!(cpu.fpu.depth(), 0, "FCOMPP pops twice");
}

#[test]
fn fxch_swaps_with_st1() {
    // fld1; fldz; fxch
    let (mut cpu, mut mem) = setup(&[0xD9, 0xE8, 0xD9, 0xEE, 0xD9, 0xC9]);
    for _ in 0..3 {
        step(&mut cpu, &mut mem);
    }
    assert_eq!(cpu.fpu.st(0).unwrap(), 1.0);
    assert_eq!(cpu.fpu.st(1).unwrap(), 0.0);
}

#[test]
fn fpu_stack_overflow_is_a_fault() {
    let code: Vec<u8> = [0xD9, 0xE8].repeat(9); // fld1 x 9
    let (mut cpu, mut mem) = setup(&code);
    for _ in 0..8 {
        step(&mut cpu, &mut mem);
    }
    assert!(matches!(
        cpu.tick(&mut mem).unwrap_err(),
        CpuFault::FpuStack { .. }
    ));
}

#[test]
fn fstp_of_an_empty_stack_is_a_fault() {
    // fstp dword [0]
    let (mut cpu, mut mem) = setup(&[0xD9, 0x1E, 0x00, 0x00]);
    assert!(matches!(
        cpu.tick(&mut mem).unwrap_err(),
        CpuFault::FpuStack { .. }
    ));
}
