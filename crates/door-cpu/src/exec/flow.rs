use crate::{Cpu, CpuFault, Flags, TickEvent};
use door_mem::GuestMemory;
use door_x86::{Instruction, MemorySize, Mnemonic, OpKind};

impl Cpu {
    pub(crate) fn exec_jmp(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        match instr.op0_kind() {
            OpKind::NearBranch16 => {
                self.regs.ip = instr.near_branch16();
            }
            OpKind::FarBranch16 => {
                self.regs.cs = instr.far_branch_selector();
                self.regs.ip = instr.far_branch16() as u16;
            }
            OpKind::Register => {
                let target = self
                    .regs
                    .try_read(instr.op_register(0))
                    .ok_or_else(|| self.unsupported(instr))?;
                self.regs.ip = target as u16;
            }
            OpKind::Memory if instr.memory_size() == MemorySize::SegPtr16 => {
                let (seg, off) = self.ea(instr)?;
                let target = self.mem(mem.read_far_ptr(seg, off))?;
                self.regs.cs = target.segment;
                self.regs.ip = target.offset;
            }
            OpKind::Memory => {
                let (seg, off) = self.ea(instr)?;
                self.regs.ip = self.mem(mem.read_u16(seg, off))?;
            }
            _ => return Err(self.unsupported(instr)),
        }
        Ok(())
    }

    fn condition(&self, mnemonic: Mnemonic) -> bool {
        let f = self.regs.flags;
        let (cf, zf, sf, of, pf) = (
            f.contains(Flags::CF),
            f.contains(Flags::ZF),
            f.contains(Flags::SF),
            f.contains(Flags::OF),
            f.contains(Flags::PF),
        );
        match mnemonic {
            Mnemonic::Ja => !cf && !zf,
            Mnemonic::Jae => !cf,
            Mnemonic::Jb => cf,
            Mnemonic::Jbe => cf || zf,
            Mnemonic::Je => zf,
            Mnemonic::Jne => !zf,
            Mnemonic::Jg => !zf && sf == of,
            Mnemonic::Jge => sf == of,
            Mnemonic::Jl => sf != of,
            Mnemonic::Jle => zf || sf != of,
            Mnemonic::Jo => of,
            Mnemonic::Jno => !of,
            Mnemonic::Jp => pf,
            Mnemonic::Jnp => !pf,
            Mnemonic::Js => sf,
            Mnemonic::Jns => !sf,
            Mnemonic::Jcxz => self.regs.cx() == 0,
            _ => false,
        }
    }

    pub(crate) fn exec_jcc(&mut self, instr: &Instruction) -> Result<(), CpuFault> {
        if self.condition(instr.mnemonic()) {
            self.regs.ip = instr.near_branch16();
        }
        Ok(())
    }

    pub(crate) fn exec_loop(&mut self, instr: &Instruction) -> Result<(), CpuFault> {
        let cx = self.regs.cx().wrapping_sub(1);
        self.regs.set_cx(cx);
        let zf = self.regs.flags.contains(Flags::ZF);
        let taken = match instr.mnemonic() {
            Mnemonic::Loop => cx != 0,
            Mnemonic::Loope => cx != 0 && zf,
            Mnemonic::Loopne => cx != 0 && !zf,
            _ => return Err(self.unsupported(instr)),
        };
        if taken {
            self.regs.ip = instr.near_branch16();
        }
        Ok(())
    }

    pub(crate) fn exec_call(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<TickEvent, CpuFault> {
        match instr.op0_kind() {
            OpKind::NearBranch16 => {
                let return_ip = self.regs.ip;
                self.push16(mem, return_ip)?;
                self.regs.ip = instr.near_branch16();
                Ok(TickEvent::Continue)
            }
            OpKind::Register => {
                let target = self
                    .regs
                    .try_read(instr.op_register(0))
                    .ok_or_else(|| self.unsupported(instr))?;
                let return_ip = self.regs.ip;
                self.push16(mem, return_ip)?;
                self.regs.ip = target as u16;
                Ok(TickEvent::Continue)
            }
            OpKind::FarBranch16 => {
                self.far_call(mem, instr.far_branch_selector(), instr.far_branch16() as u16)
            }
            OpKind::Memory if instr.memory_size() == MemorySize::SegPtr16 => {
                let (seg, off) = self.ea(instr)?;
                let target = self.mem(mem.read_far_ptr(seg, off))?;
                self.far_call(mem, target.segment, target.offset)
            }
            OpKind::Memory => {
                let (seg, off) = self.ea(instr)?;
                let target = self.mem(mem.read_u16(seg, off))?;
                let return_ip = self.regs.ip;
                self.push16(mem, return_ip)?;
                self.regs.ip = target;
                Ok(TickEvent::Continue)
            }
            _ => Err(self.unsupported(instr)),
        }
    }

    /// Push the return far pointer and transfer. Calls into a registered
    /// host-API segment never fetch from it: they yield to the driver with
    /// the ordinal taken from the target offset, and IP stays at the
    /// fall-through instruction so execution resumes there after
    /// [`Cpu::finish_host_call`].
    fn far_call(
        &mut self,
        mem: &mut dyn GuestMemory,
        segment: u16,
        offset: u16,
    ) -> Result<TickEvent, CpuFault> {
        self.push16(mem, self.regs.cs)?;
        let return_ip = self.regs.ip;
        self.push16(mem, return_ip)?;
        if self.is_import_segment(segment) {
            Ok(TickEvent::HostCall(crate::HostCall {
                segment,
                ordinal: offset,
            }))
        } else {
            self.regs.cs = segment;
            self.regs.ip = offset;
            Ok(TickEvent::Continue)
        }
    }

    pub(crate) fn exec_ret_near(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        self.regs.ip = self.pop16(mem)?;
        if instr.op_count() == 1 {
            let sp = self.regs.sp().wrapping_add(instr.immediate16());
            self.regs.set_sp(sp);
        }
        Ok(())
    }

    pub(crate) fn exec_ret_far(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        self.regs.ip = self.pop16(mem)?;
        self.regs.cs = self.pop16(mem)?;
        if instr.op_count() == 1 {
            let sp = self.regs.sp().wrapping_add(instr.immediate16());
            self.regs.set_sp(sp);
        }
        Ok(())
    }
}
