mod common;

use common::setup;
use door_cpu::Flags;
use proptest::prelude::*;

proptest! {
    #[test]
    fn cwd_replicates_the_sign_of_ax(ax in any::<u16>(), dx in any::<u16>()) {
        let (mut cpu, mut mem) = setup(&[0x99]);
        cpu.regs.set_ax(ax);
        cpu.regs.set_dx(dx);
        cpu.tick(&mut mem).unwrap();

        let expected = if ax & 0x8000 != 0 { 0xFFFF } else { 0x0000 };
        prop_assert_eq!(cpu.regs.dx(), expected);
        prop_assert_eq!(cpu.regs.ax(), ax);
        for flag in [Flags::CF, Flags::ZF, Flags::SF, Flags::OF] {
            prop_assert!(!cpu.regs.flags.contains(flag));
        }
    }

    #[test]
    fn movsx_extends_the_source_msb(v in any::<u16>()) {
        // movsx eax, bx
        let (mut cpu, mut mem) = setup(&[0x66, 0x0F, 0xBF, 0xC3]);
        cpu.regs.set_bx(v);
        cpu.tick(&mut mem).unwrap();

        let expected = if v & 0x8000 != 0 {
            v as u32 | 0xFFFF_0000
        } else {
            v as u32
        };
        prop_assert_eq!(cpu.regs.eax, expected);
    }

    #[test]
    fn add_matches_a_wide_reference(a in any::<u16>(), b in any::<u16>()) {
        // add ax, bx
        let (mut cpu, mut mem) = setup(&[0x01, 0xD8]);
        cpu.regs.set_ax(a);
        cpu.regs.set_bx(b);
        cpu.tick(&mut mem).unwrap();

        let wide = a as u32 + b as u32;
        prop_assert_eq!(cpu.regs.ax(), wide as u16);
        prop_assert_eq!(cpu.regs.flags.contains(Flags::CF), wide > 0xFFFF);
        prop_assert_eq!(cpu.regs.flags.contains(Flags::ZF), wide as u16 == 0);
        prop_assert_eq!(cpu.regs.flags.contains(Flags::SF), wide as u16 & 0x8000 != 0);
        let overflow = ((a ^ b) & 0x8000 == 0) && ((a ^ wide as u16) & 0x8000 != 0);
        prop_assert_eq!(cpu.regs.flags.contains(Flags::OF), overflow);
    }

    #[test]
    fn sub_then_add_restores_ax(a in any::<u16>(), b in any::<u16>()) {
        // sub ax, bx; add ax, bx
        let (mut cpu, mut mem) = setup(&[0x29, 0xD8, 0x01, 0xD8]);
        cpu.regs.set_ax(a);
        cpu.regs.set_bx(b);
        cpu.tick(&mut mem).unwrap();
        cpu.tick(&mut mem).unwrap();
        prop_assert_eq!(cpu.regs.ax(), a);
    }
}
