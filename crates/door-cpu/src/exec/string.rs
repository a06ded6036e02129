use super::Width;
use crate::{Cpu, CpuFault, Flags};
use door_mem::GuestMemory;
use door_x86::{Instruction, Mnemonic};

#[derive(Clone, Copy, PartialEq)]
enum Repeat {
    None,
    /// REP/REPE: repeat while CX != 0 (and ZF set, for SCAS/CMPS).
    WhileEqual,
    /// REPNE: repeat while CX != 0 and ZF clear.
    WhileNotEqual,
}

fn repeat_of(instr: &Instruction) -> Repeat {
    if instr.has_repne_prefix() {
        Repeat::WhileNotEqual
    } else if instr.has_rep_prefix() {
        Repeat::WhileEqual
    } else {
        Repeat::None
    }
}

fn width_of(mnemonic: Mnemonic) -> Width {
    match mnemonic {
        Mnemonic::Movsw | Mnemonic::Stosw | Mnemonic::Lodsw | Mnemonic::Scasw
        | Mnemonic::Cmpsw => Width::Word,
        _ => Width::Byte,
    }
}

impl Cpu {
    fn step_index(&self, index: u16, width: Width) -> u16 {
        let delta = width.bits() as u16 / 8;
        if self.regs.flags.contains(Flags::DF) {
            index.wrapping_sub(delta)
        } else {
            index.wrapping_add(delta)
        }
    }

    /// Source segment of a string op: DS unless an override prefix says
    /// otherwise (the decoder resolves that on the SI-side operand).
    fn string_source_segment(&self, instr: &Instruction) -> Result<u16, CpuFault> {
        self.regs
            .try_read(instr.memory_segment())
            .map(|v| v as u16)
            .ok_or_else(|| self.unsupported(instr))
    }

    pub(crate) fn exec_movs(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let width = width_of(instr.mnemonic());
        let src_seg = self.string_source_segment(instr)?;
        let rep = repeat_of(instr) != Repeat::None;
        loop {
            if rep && self.regs.cx() == 0 {
                break;
            }
            let value = self.read_mem(mem, src_seg, self.regs.si(), width)?;
            self.write_mem(mem, self.regs.es, self.regs.di(), width, value)?;
            let si = self.step_index(self.regs.si(), width);
            let di = self.step_index(self.regs.di(), width);
            self.regs.set_si(si);
            self.regs.set_di(di);
            if !rep {
                break;
            }
            let cx = self.regs.cx() - 1;
            self.regs.set_cx(cx);
        }
        Ok(())
    }

    pub(crate) fn exec_stos(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let width = width_of(instr.mnemonic());
        let value = match width {
            Width::Byte => self.regs.al() as u32,
            _ => self.regs.ax() as u32,
        };
        let rep = repeat_of(instr) != Repeat::None;
        loop {
            if rep && self.regs.cx() == 0 {
                break;
            }
            self.write_mem(mem, self.regs.es, self.regs.di(), width, value)?;
            let di = self.step_index(self.regs.di(), width);
            self.regs.set_di(di);
            if !rep {
                break;
            }
            let cx = self.regs.cx() - 1;
            self.regs.set_cx(cx);
        }
        Ok(())
    }

    pub(crate) fn exec_lods(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let width = width_of(instr.mnemonic());
        let src_seg = self.string_source_segment(instr)?;
        let rep = repeat_of(instr) != Repeat::None;
        loop {
            if rep && self.regs.cx() == 0 {
                break;
            }
            let value = self.read_mem(mem, src_seg, self.regs.si(), width)?;
            match width {
                Width::Byte => self.regs.set_al(value as u8),
                _ => self.regs.set_ax(value as u16),
            }
            let si = self.step_index(self.regs.si(), width);
            self.regs.set_si(si);
            if !rep {
                break;
            }
            let cx = self.regs.cx() - 1;
            self.regs.set_cx(cx);
        }
        Ok(())
    }

    pub(crate) fn exec_scas(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let width = width_of(instr.mnemonic());
        let needle = match width {
            Width::Byte => self.regs.al() as u32,
            _ => self.regs.ax() as u32,
        };
        let rep = repeat_of(instr);
        loop {
            if rep != Repeat::None && self.regs.cx() == 0 {
                break;
            }
            let probe = self.read_mem(mem, self.regs.es, self.regs.di(), width)?;
            self.sub_with_flags(width, needle, probe, false);
            let di = self.step_index(self.regs.di(), width);
            self.regs.set_di(di);
            match rep {
                Repeat::None => break,
                _ => {
                    let cx = self.regs.cx() - 1;
                    self.regs.set_cx(cx);
                }
            }
            let zf = self.regs.flags.contains(Flags::ZF);
            if (rep == Repeat::WhileEqual && !zf) || (rep == Repeat::WhileNotEqual && zf) {
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn exec_cmps(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let width = width_of(instr.mnemonic());
        let src_seg = self.string_source_segment(instr)?;
        let rep = repeat_of(instr);
        loop {
            if rep != Repeat::None && self.regs.cx() == 0 {
                break;
            }
            let lhs = self.read_mem(mem, src_seg, self.regs.si(), width)?;
            let rhs = self.read_mem(mem, self.regs.es, self.regs.di(), width)?;
            self.sub_with_flags(width, lhs, rhs, false);
            let si = self.step_index(self.regs.si(), width);
            let di = self.step_index(self.regs.di(), width);
            self.regs.set_si(si);
            self.regs.set_di(di);
            match rep {
                Repeat::None => break,
                _ => {
                    let cx = self.regs.cx() - 1;
                    self.regs.set_cx(cx);
                }
            }
            let zf = self.regs.flags.contains(Flags::ZF);
            if (rep == Repeat::WhileEqual && !zf) || (rep == Repeat::WhileNotEqual && zf) {
                break;
            }
        }
        Ok(())
    }
}
