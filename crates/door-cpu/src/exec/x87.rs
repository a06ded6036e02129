use crate::fpu::StackFault;
use crate::{Cpu, CpuFault};
use door_mem::GuestMemory;
use door_x86::{Instruction, MemorySize, Mnemonic, OpKind, Register};

fn st_index(reg: Register) -> Option<u8> {
    match reg {
        Register::ST0 => Some(0),
        Register::ST1 => Some(1),
        Register::ST2 => Some(2),
        Register::ST3 => Some(3),
        Register::ST4 => Some(4),
        Register::ST5 => Some(5),
        Register::ST6 => Some(6),
        Register::ST7 => Some(7),
        _ => None,
    }
}

impl Cpu {
    pub(crate) fn fpu_fault(&self, fault: StackFault) -> CpuFault {
        CpuFault::FpuStack {
            fault,
            cs: self.cur_cs,
            ip: self.cur_ip,
            registers: self.regs,
        }
    }

    fn st(&mut self, i: u8) -> Result<f64, CpuFault> {
        self.fpu.st(i).map_err(|f| self.fpu_fault(f))
    }

    fn read_float_mem(
        &self,
        mem: &dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<f64, CpuFault> {
        let (seg, off) = self.ea(instr)?;
        match instr.memory_size() {
            MemorySize::Float32 => {
                let bits = self.mem(mem.read_u32(seg, off))?;
                Ok(f32::from_bits(bits) as f64)
            }
            MemorySize::Float64 => {
                let b = self.mem(mem.read_bytes(seg, off, 8))?;
                Ok(f64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            _ => Err(self.unsupported(instr)),
        }
    }

    pub(crate) fn exec_fpu_load(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let value = match instr.mnemonic() {
            Mnemonic::Fld1 => 1.0,
            Mnemonic::Fldz => 0.0,
            Mnemonic::Fldpi => std::f64::consts::PI,
            Mnemonic::Fld => match instr.op0_kind() {
                // Read before the push shifts the stack indices.
                OpKind::Register => {
                    let i = st_index(instr.op_register(0))
                        .ok_or_else(|| self.unsupported(instr))?;
                    self.st(i)?
                }
                OpKind::Memory => self.read_float_mem(mem, instr)?,
                _ => return Err(self.unsupported(instr)),
            },
            Mnemonic::Fild => {
                let (seg, off) = self.ea(instr)?;
                match instr.memory_size() {
                    MemorySize::Int16 => self.mem(mem.read_u16(seg, off))? as i16 as f64,
                    MemorySize::Int32 => self.mem(mem.read_u32(seg, off))? as i32 as f64,
                    MemorySize::Int64 => {
                        let b = self.mem(mem.read_bytes(seg, off, 8))?;
                        i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
                            as f64
                    }
                    _ => return Err(self.unsupported(instr)),
                }
            }
            _ => return Err(self.unsupported(instr)),
        };
        self.fpu.push(value).map_err(|f| self.fpu_fault(f))
    }

    pub(crate) fn exec_fpu_store(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let value = self.st(0)?;
        match instr.mnemonic() {
            Mnemonic::Fst | Mnemonic::Fstp => match instr.op0_kind() {
                OpKind::Register => {
                    let i = st_index(instr.op_register(0))
                        .ok_or_else(|| self.unsupported(instr))?;
                    self.fpu.set_st(i, value).map_err(|f| self.fpu_fault(f))?;
                }
                OpKind::Memory => {
                    let (seg, off) = self.ea(instr)?;
                    match instr.memory_size() {
                        MemorySize::Float32 => {
                            self.mem(mem.write_u32(seg, off, (value as f32).to_bits()))?
                        }
                        MemorySize::Float64 => {
                            self.mem(mem.write_bytes(seg, off, &value.to_le_bytes()))?
                        }
                        _ => return Err(self.unsupported(instr)),
                    }
                }
                _ => return Err(self.unsupported(instr)),
            },
            Mnemonic::Fist | Mnemonic::Fistp => {
                let rounded = self.fpu.round(value);
                let (seg, off) = self.ea(instr)?;
                match instr.memory_size() {
                    MemorySize::Int16 => {
                        // Out-of-range stores the integer indefinite.
                        let v = if rounded.is_nan()
                            || rounded < i16::MIN as f64
                            || rounded > i16::MAX as f64
                        {
                            i16::MIN
                        } else {
                            rounded as i16
                        };
                        self.mem(mem.write_u16(seg, off, v as u16))?;
                    }
                    MemorySize::Int32 => {
                        let v = if rounded.is_nan()
                            || rounded < i32::MIN as f64
                            || rounded > i32::MAX as f64
                        {
                            i32::MIN
                        } else {
                            rounded as i32
                        };
                        self.mem(mem.write_u32(seg, off, v as u32))?;
                    }
                    MemorySize::Int64 => {
                        let v = if rounded.is_nan()
                            || rounded < i64::MIN as f64
                            || rounded >= i64::MAX as f64
                        {
                            i64::MIN
                        } else {
                            rounded as i64
                        };
                        self.mem(mem.write_bytes(seg, off, &v.to_le_bytes()))?;
                    }
                    _ => return Err(self.unsupported(instr)),
                }
            }
            _ => return Err(self.unsupported(instr)),
        }
        if matches!(instr.mnemonic(), Mnemonic::Fstp | Mnemonic::Fistp) {
            self.fpu.pop().map_err(|f| self.fpu_fault(f))?;
        }
        Ok(())
    }

    pub(crate) fn exec_fpu_arith(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        use Mnemonic::*;
        let mnemonic = instr.mnemonic();
        let pop_after = matches!(mnemonic, Faddp | Fsubp | Fsubrp | Fmulp | Fdivp | Fdivrp);
        let reversed = matches!(mnemonic, Fsubr | Fsubrp | Fdivr | Fdivrp);

        let (dst, dst_val, src_val) = if instr.op0_kind() == OpKind::Memory {
            // Memory form: ST(0) := ST(0) op m32/m64; depth unchanged.
            (0u8, self.st(0)?, self.read_float_mem(mem, instr)?)
        } else {
            let dst = st_index(instr.op_register(0)).ok_or_else(|| self.unsupported(instr))?;
            let src = st_index(instr.op_register(1)).ok_or_else(|| self.unsupported(instr))?;
            (dst, self.st(dst)?, self.st(src)?)
        };

        let (a, b) = if reversed {
            (src_val, dst_val)
        } else {
            (dst_val, src_val)
        };
        let result = match mnemonic {
            Fadd | Faddp => a + b,
            Fsub | Fsubp | Fsubr | Fsubrp => a - b,
            Fmul | Fmulp => a * b,
            Fdiv | Fdivp | Fdivr | Fdivrp => a / b,
            _ => return Err(self.unsupported(instr)),
        };
        self.fpu
            .set_st(dst, result)
            .map_err(|f| self.fpu_fault(f))?;
        if pop_after {
            self.fpu.pop().map_err(|f| self.fpu_fault(f))?;
        }
        Ok(())
    }

    pub(crate) fn exec_fpu_unary(&mut self, instr: &Instruction) -> Result<(), CpuFault> {
        let value = self.st(0)?;
        let result = match instr.mnemonic() {
            Mnemonic::Fchs => -value,
            Mnemonic::Fabs => value.abs(),
            Mnemonic::Fsqrt => value.sqrt(),
            Mnemonic::Frndint => self.fpu.round(value),
            _ => return Err(self.unsupported(instr)),
        };
        self.fpu.set_st(0, result).map_err(|f| self.fpu_fault(f))
    }

    pub(crate) fn exec_fxch(&mut self, instr: &Instruction) -> Result<(), CpuFault> {
        let i = if instr.op_count() == 0 {
            1
        } else {
            st_index(instr.op_register(instr.op_count() - 1))
                .ok_or_else(|| self.unsupported(instr))?
        };
        let a = self.st(0)?;
        let b = self.st(i)?;
        self.fpu.set_st(0, b).map_err(|f| self.fpu_fault(f))?;
        self.fpu.set_st(i, a).map_err(|f| self.fpu_fault(f))
    }

    pub(crate) fn exec_fcom(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let a = self.st(0)?;
        let b = if instr.mnemonic() == Mnemonic::Fcompp || instr.op_count() == 0 {
            self.st(1)?
        } else {
            match instr.op_kind(instr.op_count() - 1) {
                OpKind::Memory => self.read_float_mem(mem, instr)?,
                OpKind::Register => {
                    let i = st_index(instr.op_register(instr.op_count() - 1))
                        .ok_or_else(|| self.unsupported(instr))?;
                    self.st(i)?
                }
                _ => return Err(self.unsupported(instr)),
            }
        };
        self.fpu.set_comparison_codes(a, b);
        match instr.mnemonic() {
            Mnemonic::Fcomp => {
                self.fpu.pop().map_err(|f| self.fpu_fault(f))?;
            }
            Mnemonic::Fcompp => {
                self.fpu.pop().map_err(|f| self.fpu_fault(f))?;
                self.fpu.pop().map_err(|f| self.fpu_fault(f))?;
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn exec_fnstsw(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let status = self.fpu.status_word();
        match instr.op0_kind() {
            OpKind::Register => {
                self.regs.set_ax(status);
                Ok(())
            }
            OpKind::Memory => {
                let (seg, off) = self.ea(instr)?;
                self.mem(mem.write_u16(seg, off, status))
            }
            _ => Err(self.unsupported(instr)),
        }
    }

    pub(crate) fn exec_fnstcw(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let (seg, off) = self.ea(instr)?;
        self.mem(mem.write_u16(seg, off, self.fpu.control_word()))
    }

    pub(crate) fn exec_fldcw(
        &mut self,
        mem: &mut dyn GuestMemory,
        instr: &Instruction,
    ) -> Result<(), CpuFault> {
        let (seg, off) = self.ea(instr)?;
        let value = self.mem(mem.read_u16(seg, off))?;
        self.fpu.set_control_word(value);
        Ok(())
    }
}
