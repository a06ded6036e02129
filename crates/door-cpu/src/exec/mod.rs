mod alu;
mod flow;
mod string;
mod transfer;
mod x87;

use crate::{Cpu, CpuFault, TickEvent};
use door_mem::GuestMemory;
use door_x86::{Instruction, MemorySize, Mnemonic, OpKind, Register};

/// Operand width of the integer ALU paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    pub(crate) fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Dword => 0xFFFF_FFFF,
        }
    }

    pub(crate) fn msb(self) -> u32 {
        match self {
            Width::Byte => 0x80,
            Width::Word => 0x8000,
            Width::Dword => 0x8000_0000,
        }
    }

    pub(crate) fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Dword => 32,
        }
    }

    fn from_bytes(bytes: usize) -> Option<Width> {
        match bytes {
            1 => Some(Width::Byte),
            2 => Some(Width::Word),
            4 => Some(Width::Dword),
            _ => None,
        }
    }
}

pub(crate) fn memory_width(size: MemorySize) -> Option<Width> {
    match size {
        MemorySize::UInt8 | MemorySize::Int8 => Some(Width::Byte),
        MemorySize::UInt16 | MemorySize::Int16 | MemorySize::WordOffset => Some(Width::Word),
        MemorySize::UInt32 | MemorySize::Int32 | MemorySize::DwordOffset => Some(Width::Dword),
        _ => None,
    }
}

impl Cpu {
    pub(crate) fn execute(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<TickEvent, CpuFault> {
        use Mnemonic::*;
        match instr.mnemonic() {
            // Control transfer; CALL is the one path that can yield to the
            // host, so it returns its own event.
            Call => return self.exec_call(mem, instr),
            Jmp => self.exec_jmp(mem, instr)?,
            Ja | Jae | Jb | Jbe | Je | Jne | Jg | Jge | Jl | Jle | Jo | Jno | Jp | Jnp | Js
            | Jns | Jcxz => self.exec_jcc(instr)?,
            Loop | Loope | Loopne => self.exec_loop(instr)?,
            Ret => self.exec_ret_near(mem, instr)?,
            Retf => self.exec_ret_far(mem, instr)?,

            // Data movement.
            Mov => self.exec_mov(mem, instr)?,
            Movsx => self.exec_movsx(mem, instr)?,
            Movzx => self.exec_movzx(mem, instr)?,
            Xchg => self.exec_xchg(mem, instr)?,
            Lea => self.exec_lea(instr)?,
            Lds | Les => self.exec_load_far_pointer(mem, instr)?,
            Push => self.exec_push(mem, instr)?,
            Pop => self.exec_pop(mem, instr)?,
            Pusha => self.exec_pusha(mem)?,
            Popa => self.exec_popa(mem)?,
            Pushf => self.exec_pushf(mem)?,
            Popf => self.exec_popf(mem)?,
            Cbw => self.exec_cbw(),
            Cwd => self.exec_cwd(),
            Enter => self.exec_enter(mem, instr)?,
            Leave => self.exec_leave(mem)?,

            // ALU.
            Add | Adc | Sub | Sbb | Cmp => self.exec_arith(mem, instr)?,
            And | Or | Xor | Test => self.exec_logic(mem, instr)?,
            Not => self.exec_not(mem, instr)?,
            Neg => self.exec_neg(mem, instr)?,
            Inc | Dec => self.exec_inc_dec(mem, instr)?,
            Mul => self.exec_mul(mem, instr)?,
            Imul => self.exec_imul(mem, instr)?,
            Div | Idiv => self.exec_div(mem, instr)?,
            Shl | Shr | Sar | Rol | Ror | Rcl | Rcr => self.exec_shift(mem, instr)?,

            // String ops.
            Movsb | Movsw => self.exec_movs(mem, instr)?,
            Stosb | Stosw => self.exec_stos(mem, instr)?,
            Lodsb | Lodsw => self.exec_lods(mem, instr)?,
            Scasb | Scasw => self.exec_scas(mem, instr)?,
            Cmpsb | Cmpsw => self.exec_cmps(mem, instr)?,

            // Flag housekeeping.
            Clc => self.regs.flags.remove(crate::Flags::CF),
            Stc => self.regs.flags.insert(crate::Flags::CF),
            Cmc => self.regs.flags.toggle(crate::Flags::CF),
            Cld => self.regs.flags.remove(crate::Flags::DF),
            Std => self.regs.flags.insert(crate::Flags::DF),
            Cli => self.regs.flags.remove(crate::Flags::IF),
            Sti => self.regs.flags.insert(crate::Flags::IF),
            Sahf => self.exec_sahf(),
            Lahf => self.exec_lahf(),

            // x87.
            Fld | Fild | Fld1 | Fldz | Fldpi => self.exec_fpu_load(mem, instr)?,
            Fst | Fstp | Fist | Fistp => self.exec_fpu_store(mem, instr)?,
            Fadd | Faddp | Fsub | Fsubr | Fsubp | Fsubrp | Fmul | Fmulp | Fdiv | Fdivr
            | Fdivp | Fdivrp => self.exec_fpu_arith(mem, instr)?,
            Fchs | Fabs | Fsqrt | Frndint => self.exec_fpu_unary(instr)?,
            Fxch => self.exec_fxch(instr)?,
            Fcom | Fcomp | Fcompp => self.exec_fcom(mem, instr)?,
            Fnstsw => self.exec_fnstsw(mem, instr)?,
            Fnstcw => self.exec_fnstcw(mem, instr)?,
            Fldcw => self.exec_fldcw(mem, instr)?,
            Fnclex => self.fpu.clear_exceptions(),

            Nop | Wait => {}

            Hlt => {
                self.set_halt();
                return Ok(TickEvent::Halted);
            }

            _ => return Err(self.unsupported(instr)),
        }
        Ok(TickEvent::Continue)
    }

    pub(crate) fn unsupported(&self, instr: &Instruction) -> CpuFault {
        CpuFault::Unsupported {
            mnemonic: instr.mnemonic(),
            cs: self.cur_cs,
            ip: self.cur_ip,
            registers: self.regs,
        }
    }

    /// Effective address of the instruction's memory operand, honoring the
    /// active segment override (the decoder reports the effective segment
    /// register per operand).
    pub(crate) fn ea(&self, instr: &Instruction) -> Result<(u16, u16), CpuFault> {
        let segment = self
            .regs
            .try_read(instr.memory_segment())
            .ok_or_else(|| self.unsupported(instr))? as u16;
        let mut offset = instr.memory_displacement32() as u16;
        if instr.memory_base() != Register::None {
            let base = self
                .regs
                .try_read(instr.memory_base())
                .ok_or_else(|| self.unsupported(instr))?;
            offset = offset.wrapping_add(base as u16);
        }
        if instr.memory_index() != Register::None {
            let index = self
                .regs
                .try_read(instr.memory_index())
                .ok_or_else(|| self.unsupported(instr))?;
            offset = offset.wrapping_add(index as u16);
        }
        Ok((segment, offset))
    }

    /// Width shared by the instruction's operands: the first register
    /// operand decides, else the memory operand.
    pub(crate) fn operand_width(&self, instr: &Instruction) -> Result<Width, CpuFault> {
        for op in 0..instr.op_count() {
            if instr.op_kind(op) == OpKind::Register {
                if let Some(w) =
                    crate::state::register_width(instr.op_register(op)).and_then(Width::from_bytes)
                {
                    return Ok(w);
                }
            }
        }
        memory_width(instr.memory_size()).ok_or_else(|| self.unsupported(instr))
    }

    pub(crate) fn read_mem(
        &self,
        mem: &dyn GuestMemory,
        seg: u16,
        off: u16,
        width: Width,
    ) -> Result<u32, CpuFault> {
        match width {
            Width::Byte => self.mem(mem.read_u8(seg, off)).map(u32::from),
            Width::Word => self.mem(mem.read_u16(seg, off)).map(u32::from),
            Width::Dword => self.mem(mem.read_u32(seg, off)),
        }
    }

    pub(crate) fn write_mem(
        &self,
        mem: &mut dyn GuestMemory,
        seg: u16,
        off: u16,
        width: Width,
        value: u32,
    ) -> Result<(), CpuFault> {
        match width {
            Width::Byte => self.mem(mem.write_u8(seg, off, value as u8)),
            Width::Word => self.mem(mem.write_u16(seg, off, value as u16)),
            Width::Dword => self.mem(mem.write_u32(seg, off, value)),
        }
    }

    /// Read operand `op`, zero-extended to 32 bits.
    pub(crate) fn read_operand(
        &self,
        mem: &dyn GuestMemory,
        instr: &Instruction,
        op: u32,
    ) -> Result<u32, CpuFault> {
        match instr.op_kind(op) {
            OpKind::Register => self
                .regs
                .try_read(instr.op_register(op))
                .ok_or_else(|| self.unsupported(instr)),
            OpKind::Memory => {
                let (seg, off) = self.ea(instr)?;
                let width =
                    memory_width(instr.memory_size()).ok_or_else(|| self.unsupported(instr))?;
                self.read_mem(mem, seg, off, width)
            }
            OpKind::Immediate8 => Ok(instr.immediate8() as u32),
            OpKind::Immediate16 => Ok(instr.immediate16() as u32),
            OpKind::Immediate32 => Ok(instr.immediate32()),
            OpKind::Immediate8to16 => Ok(instr.immediate8to16() as u16 as u32),
            OpKind::Immediate8to32 => Ok(instr.immediate8to32() as u32),
            OpKind::NearBranch16 => Ok(instr.near_branch16() as u32),
            _ => Err(self.unsupported(instr)),
        }
    }

    /// Write operand `op` (register or memory destination).
    pub(crate) fn write_operand(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
        op: u32,
        value: u32,
    ) -> Result<(), CpuFault> {
        match instr.op_kind(op) {
            OpKind::Register => self
                .regs
                .try_write(instr.op_register(op), value)
                .ok_or_else(|| self.unsupported(instr)),
            OpKind::Memory => {
                let (seg, off) = self.ea(instr)?;
                let width =
                    memory_width(instr.memory_size()).ok_or_else(|| self.unsupported(instr))?;
                self.write_mem(mem, seg, off, width, value)
            }
            _ => Err(self.unsupported(instr)),
        }
    }
}
