use super::{memory_width, Width};
use crate::state::register_width;
use crate::{Cpu, CpuFault, Flags};
use door_mem::GuestMemory;
use door_x86::{Instruction, Mnemonic, OpKind};

impl Cpu {
    fn source_width(&self, instr: &Instruction, op: u32) -> Result<Width, CpuFault> {
        match instr.op_kind(op) {
            OpKind::Register => register_width(instr.op_register(op))
                .and_then(|b| match b {
                    1 => Some(Width::Byte),
                    2 => Some(Width::Word),
                    4 => Some(Width::Dword),
                    _ => None,
                })
                .ok_or_else(|| self.unsupported(instr)),
            OpKind::Memory => {
                memory_width(instr.memory_size()).ok_or_else(|| self.unsupported(instr))
            }
            _ => Err(self.unsupported(instr)),
        }
    }

    pub(crate) fn exec_mov(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let value = self.read_operand(mem, instr, 1)?;
        self.write_operand(mem, instr, 0, value)
    }

    /// Sign-extending move: replicate the source MSB through the wider
    /// destination.
    pub(crate) fn exec_movsx(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let src_width = self.source_width(instr, 1)?;
        let dst_width = self.source_width(instr, 0)?;
        let value = self.read_operand(mem, instr, 1)?;
        let extended = if value & src_width.msb() != 0 {
            value | (dst_width.mask() & !src_width.mask())
        } else {
            value
        };
        self.write_operand(mem, instr, 0, extended)
    }

    pub(crate) fn exec_movzx(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        // `read_operand` already zero-extends to 32 bits.
        let value = self.read_operand(mem, instr, 1)?;
        self.write_operand(mem, instr, 0, value)
    }

    pub(crate) fn exec_xchg(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let a = self.read_operand(mem, instr, 0)?;
        let b = self.read_operand(mem, instr, 1)?;
        self.write_operand(mem, instr, 0, b)?;
        self.write_operand(mem, instr, 1, a)
    }

    pub(crate) fn exec_lea(&mut self, instr: &Instruction) -> Result<(), CpuFault> {
        let (_, offset) = self.ea(instr)?;
        self.regs
            .try_write(instr.op_register(0), offset as u32)
            .ok_or_else(|| self.unsupported(instr))
    }

    /// LDS/LES: load a full far pointer from memory into DS/ES plus a
    /// general register.
    pub(crate) fn exec_load_far_pointer(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let (seg, off) = self.ea(instr)?;
        let pointer = self.mem(mem.read_far_ptr(seg, off))?;
        self.regs
            .try_write(instr.op_register(0), pointer.offset as u32)
            .ok_or_else(|| self.unsupported(instr))?;
        match instr.mnemonic() {
            Mnemonic::Lds => self.regs.ds = pointer.segment,
            Mnemonic::Les => self.regs.es = pointer.segment,
            _ => return Err(self.unsupported(instr)),
        }
        Ok(())
    }

    pub(crate) fn exec_push(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let value = self.read_operand(mem, instr, 0)?;
        self.push16(mem, value as u16)
    }

    pub(crate) fn exec_pop(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let value = self.pop16(mem)?;
        self.write_operand(mem, instr, 0, value as u32)
    }

    pub(crate) fn exec_pusha(&mut self, mem: &mut dyn GuestMemory) -> Result<(), CpuFault> {
        let sp = self.regs.sp();
        for value in [
            self.regs.ax(),
            self.regs.cx(),
            self.regs.dx(),
            self.regs.bx(),
            sp,
            self.regs.bp(),
            self.regs.si(),
            self.regs.di(),
        ] {
            self.push16(mem, value)?;
        }
        Ok(())
    }

    pub(crate) fn exec_popa(&mut self, mem: &mut dyn GuestMemory) -> Result<(), CpuFault> {
        let di = self.pop16(mem)?;
        let si = self.pop16(mem)?;
        let bp = self.pop16(mem)?;
        let _sp = self.pop16(mem)?;
        let bx = self.pop16(mem)?;
        let dx = self.pop16(mem)?;
        let cx = self.pop16(mem)?;
        let ax = self.pop16(mem)?;
        self.regs.set_di(di);
        self.regs.set_si(si);
        self.regs.set_bp(bp);
        self.regs.set_bx(bx);
        self.regs.set_dx(dx);
        self.regs.set_cx(cx);
        self.regs.set_ax(ax);
        Ok(())
    }

    pub(crate) fn exec_pushf(&mut self, mem: &mut dyn GuestMemory) -> Result<(), CpuFault> {
        self.push16(mem, self.regs.flags.bits())
    }

    pub(crate) fn exec_popf(&mut self, mem: &mut dyn GuestMemory) -> Result<(), CpuFault> {
        let value = self.pop16(mem)?;
        self.regs.flags = Flags::from_bits_truncate(value);
        Ok(())
    }

    pub(crate) fn exec_cbw(&mut self) {
        self.regs.set_ax(self.regs.al() as i8 as i16 as u16);
    }

    /// Sign-extend AX into DX:AX. Flags are untouched.
    pub(crate) fn exec_cwd(&mut self) {
        let dx = if self.regs.ax() & 0x8000 != 0 {
            0xFFFF
        } else {
            0x0000
        };
        self.regs.set_dx(dx);
    }

    pub(crate) fn exec_enter(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let frame_size = instr.immediate16();
        let level = instr.immediate8_2nd() & 0x1F;
        if level != 0 {
            // Nested display frames never show up in compiled door code.
            return Err(self.unsupported(instr));
        }
        self.push16(mem, self.regs.bp())?;
        let bp = self.regs.sp();
        self.regs.set_bp(bp);
        self.regs.set_sp(bp.wrapping_sub(frame_size));
        Ok(())
    }

    pub(crate) fn exec_leave(&mut self, mem: &mut dyn GuestMemory) -> Result<(), CpuFault> {
        self.regs.set_sp(self.regs.bp());
        let bp = self.pop16(mem)?;
        self.regs.set_bp(bp);
        Ok(())
    }

    pub(crate) fn exec_sahf(&mut self) {
        let ah = self.regs.ah() as u16;
        for flag in [Flags::CF, Flags::PF, Flags::AF, Flags::ZF, Flags::SF] {
            self.regs.flags.set(flag, ah & flag.bits() != 0);
        }
    }

    pub(crate) fn exec_lahf(&mut self) {
        // Bit 1 of the low flags byte always reads as set.
        let low = (self.regs.flags.bits() as u8 & 0b1101_0101) | 0b10;
        self.regs.set_ah(low);
    }
}
