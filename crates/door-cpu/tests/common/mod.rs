#![allow(dead_code)]

use door_cpu::{Cpu, TickEvent};
use door_mem::{GuestMemory, ProtectedMemory};
use door_types::Segment;

pub const CODE_SEG: u16 = 0x0001;
pub const DATA_SEG: u16 = 0x0002;

/// A CPU at CS:0 of `code`, with an empty data segment in DS/ES and the
/// stack in segment 0.
pub fn setup(code: &[u8]) -> (Cpu, ProtectedMemory) {
    let mut mem = ProtectedMemory::new();
    mem.add_segment(Segment::code(CODE_SEG, code.to_vec()).unwrap())
        .unwrap();
    mem.allocate_segment(DATA_SEG).unwrap();
    let mut cpu = Cpu::new();
    cpu.regs.cs = CODE_SEG;
    cpu.regs.ip = 0;
    cpu.regs.ds = DATA_SEG;
    cpu.regs.es = DATA_SEG;
    (cpu, mem)
}

pub fn step(cpu: &mut Cpu, mem: &mut ProtectedMemory) -> TickEvent {
    cpu.tick(mem).expect("tick faulted")
}

/// Tick until HLT, with a runaway guard.
pub fn run_to_halt(cpu: &mut Cpu, mem: &mut ProtectedMemory) {
    for _ in 0..10_000 {
        if step(cpu, mem) == TickEvent::Halted {
            return;
        }
    }
    panic!("program did not halt");
}
