use crate::fpu::StackFault;
use crate::state::Registers;
use door_mem::MemoryError;
use door_x86::Mnemonic;
use thiserror::Error;

/// A fault raised mid-tick. Every variant carries the faulting CS:IP and a
/// register snapshot so the host can log enough context to diagnose the
/// guest before terminating it.
#[derive(Debug, Error)]
pub enum CpuFault {
    #[error("undefined opcode {bytes:02X?} at {cs:04X}:{ip:04X}\n{registers}")]
    Decode {
        cs: u16,
        ip: u16,
        bytes: Vec<u8>,
        registers: Registers,
    },

    #[error("memory fault at {cs:04X}:{ip:04X}: {source}\n{registers}")]
    Memory {
        cs: u16,
        ip: u16,
        #[source]
        source: MemoryError,
        registers: Registers,
    },

    #[error("integer division by zero at {cs:04X}:{ip:04X}\n{registers}")]
    DivideByZero {
        cs: u16,
        ip: u16,
        registers: Registers,
    },

    #[error("divide quotient overflow at {cs:04X}:{ip:04X}\n{registers}")]
    DivideOverflow {
        cs: u16,
        ip: u16,
        registers: Registers,
    },

    #[error("x87 stack {fault} at {cs:04X}:{ip:04X}\n{registers}")]
    FpuStack {
        fault: StackFault,
        cs: u16,
        ip: u16,
        registers: Registers,
    },

    #[error("unimplemented instruction {mnemonic:?} at {cs:04X}:{ip:04X}\n{registers}")]
    Unsupported {
        mnemonic: Mnemonic,
        cs: u16,
        ip: u16,
        registers: Registers,
    },
}
