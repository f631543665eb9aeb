//! UAL-style rendering of decoded instructions, used by instruction traces.

use std::fmt;

use crate::alu::{ImmShift, SrType};
use crate::decode::{Instr, InstrFlags};

struct Reg(u8);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            13 => write!(f, "sp"),
            14 => write!(f, "lr"),
            15 => write!(f, "pc"),
            r => write!(f, "r{r}"),
        }
    }
}

struct Shift(ImmShift);

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0.srtype {
            SrType::Lsl => "lsl",
            SrType::Lsr => "lsr",
            SrType::Asr => "asr",
            SrType::Ror => "ror",
            SrType::Rrx => return write!(f, ", rrx"),
        };
        if self.0.amount == 0 {
            return Ok(());
        }
        write!(f, ", {name} #{}", self.0.amount)
    }
}

struct RegList(u32);

impl fmt::Display for RegList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for i in 0..16u8 {
            if self.0 >> i & 1 != 0 {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{}", Reg(i))?;
                first = false;
            }
        }
        write!(f, "}}")
    }
}

fn s(flags: InstrFlags) -> &'static str {
    if flags.contains(InstrFlags::SETFLAGS) {
        "s"
    } else {
        ""
    }
}

fn cond_str(cond: u8) -> &'static str {
    match cond & 0xF {
        0b0000 => "eq",
        0b0001 => "ne",
        0b0010 => "cs",
        0b0011 => "cc",
        0b0100 => "mi",
        0b0101 => "pl",
        0b0110 => "vs",
        0b0111 => "vc",
        0b1000 => "hi",
        0b1001 => "ls",
        0b1010 => "ge",
        0b1011 => "lt",
        0b1100 => "gt",
        0b1101 => "le",
        _ => "",
    }
}

/// Renders the IT suffix pattern: one `t`/`e` per additional instruction,
/// ending at the lowest set mask bit.
fn it_pattern(mask: u8, firstcond: u8) -> String {
    let stop = mask.trailing_zeros().min(3) as usize;
    (0..3 - stop)
        .map(|i| {
            let bit = mask >> (3 - i) & 1;
            if bit == firstcond & 1 {
                't'
            } else {
                'e'
            }
        })
        .collect()
}

/// Renders the address operand of the immediate-offset forms.
struct AddrImm {
    n: u8,
    imm32: u32,
    flags: InstrFlags,
}

impl fmt::Display for AddrImm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.flags.contains(InstrFlags::ADD) { "" } else { "-" };
        if self.flags.contains(InstrFlags::INDEX) {
            if self.flags.contains(InstrFlags::WBACK) {
                write!(f, "[{}, #{sign}{}]!", Reg(self.n), self.imm32)
            } else if self.imm32 == 0 {
                write!(f, "[{}]", Reg(self.n))
            } else {
                write!(f, "[{}, #{sign}{}]", Reg(self.n), self.imm32)
            }
        } else {
            write!(f, "[{}], #{sign}{}", Reg(self.n), self.imm32)
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instr::Nop { .. } => write!(f, "nop"),
            Instr::Dmb { .. } => write!(f, "dmb"),
            Instr::Dsb { .. } => write!(f, "dsb"),
            Instr::Isb { .. } => write!(f, "isb"),
            Instr::It { firstcond, mask, .. } => {
                write!(f, "it{} {}", it_pattern(mask, firstcond), cond_str(firstcond))
            }

            Instr::MovImmediate { flags, d, imm } => {
                write!(f, "mov{} {}, #{}", s(flags), Reg(d), imm.imm32)
            }
            Instr::MvnImmediate { flags, d, imm } => {
                write!(f, "mvn{} {}, #{}", s(flags), Reg(d), imm.imm32)
            }
            Instr::Movt { d, imm16, .. } => write!(f, "movt {}, #{}", Reg(d), imm16),
            Instr::MovRegister { flags, d, m } => {
                write!(f, "mov{} {}, {}", s(flags), Reg(d), Reg(m))
            }
            Instr::MvnRegister { flags, d, m, shift } => {
                write!(f, "mvn{} {}, {}{}", s(flags), Reg(d), Reg(m), Shift(shift))
            }
            Instr::LslImmediate { flags, d, m, shift } => {
                write!(f, "lsl{} {}, {}, #{}", s(flags), Reg(d), Reg(m), shift.amount)
            }
            Instr::LsrImmediate { flags, d, m, shift } => {
                write!(f, "lsr{} {}, {}, #{}", s(flags), Reg(d), Reg(m), shift.amount)
            }
            Instr::AsrImmediate { flags, d, m, shift } => {
                write!(f, "asr{} {}, {}, #{}", s(flags), Reg(d), Reg(m), shift.amount)
            }
            Instr::RorImmediate { flags, d, m, shift } => {
                write!(f, "ror{} {}, {}, #{}", s(flags), Reg(d), Reg(m), shift.amount)
            }
            Instr::Rrx { flags, d, m } => write!(f, "rrx{} {}, {}", s(flags), Reg(d), Reg(m)),
            Instr::LslRegister { flags, d, n, m } => {
                write!(f, "lsl{} {}, {}, {}", s(flags), Reg(d), Reg(n), Reg(m))
            }
            Instr::LsrRegister { flags, d, n, m } => {
                write!(f, "lsr{} {}, {}, {}", s(flags), Reg(d), Reg(n), Reg(m))
            }
            Instr::AsrRegister { flags, d, n, m } => {
                write!(f, "asr{} {}, {}, {}", s(flags), Reg(d), Reg(n), Reg(m))
            }
            Instr::RorRegister { flags, d, n, m } => {
                write!(f, "ror{} {}, {}, {}", s(flags), Reg(d), Reg(n), Reg(m))
            }

            Instr::AddImmediate { flags, d, n, imm32 } => {
                write!(f, "add{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm32)
            }
            Instr::AdcImmediate { flags, d, n, imm32 } => {
                write!(f, "adc{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm32)
            }
            Instr::SubImmediate { flags, d, n, imm32 } => {
                write!(f, "sub{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm32)
            }
            Instr::SbcImmediate { flags, d, n, imm32 } => {
                write!(f, "sbc{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm32)
            }
            Instr::RsbImmediate { flags, d, n, imm32 } => {
                write!(f, "rsb{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm32)
            }
            Instr::AddRegister { flags, d, n, m, shift } => {
                write!(f, "add{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::AdcRegister { flags, d, n, m, shift } => {
                write!(f, "adc{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::SubRegister { flags, d, n, m, shift } => {
                write!(f, "sub{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::SbcRegister { flags, d, n, m, shift } => {
                write!(f, "sbc{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::RsbRegister { flags, d, n, m, shift } => {
                write!(f, "rsb{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::AddSpPlusImmediate { d, imm32, .. } => {
                write!(f, "add {}, sp, #{}", Reg(d), imm32)
            }
            Instr::SubSpMinusImmediate { d, imm32, .. } => {
                write!(f, "sub {}, sp, #{}", Reg(d), imm32)
            }
            Instr::Adr { d, imm32, .. } => write!(f, "adr {}, #{}", Reg(d), imm32),

            Instr::AndImmediate { flags, d, n, imm } => {
                write!(f, "and{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm.imm32)
            }
            Instr::OrrImmediate { flags, d, n, imm } => {
                write!(f, "orr{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm.imm32)
            }
            Instr::EorImmediate { flags, d, n, imm } => {
                write!(f, "eor{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm.imm32)
            }
            Instr::BicImmediate { flags, d, n, imm } => {
                write!(f, "bic{} {}, {}, #{}", s(flags), Reg(d), Reg(n), imm.imm32)
            }
            Instr::AndRegister { flags, d, n, m, shift } => {
                write!(f, "and{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::OrrRegister { flags, d, n, m, shift } => {
                write!(f, "orr{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::EorRegister { flags, d, n, m, shift } => {
                write!(f, "eor{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }
            Instr::BicRegister { flags, d, n, m, shift } => {
                write!(f, "bic{} {}, {}, {}{}", s(flags), Reg(d), Reg(n), Reg(m), Shift(shift))
            }

            Instr::CmpImmediate { n, imm32, .. } => write!(f, "cmp {}, #{}", Reg(n), imm32),
            Instr::CmnImmediate { n, imm32, .. } => write!(f, "cmn {}, #{}", Reg(n), imm32),
            Instr::CmpRegister { n, m, shift, .. } => {
                write!(f, "cmp {}, {}{}", Reg(n), Reg(m), Shift(shift))
            }
            Instr::CmnRegister { n, m, shift, .. } => {
                write!(f, "cmn {}, {}{}", Reg(n), Reg(m), Shift(shift))
            }
            Instr::TstImmediate { n, imm, .. } => write!(f, "tst {}, #{}", Reg(n), imm.imm32),
            Instr::TeqImmediate { n, imm, .. } => write!(f, "teq {}, #{}", Reg(n), imm.imm32),
            Instr::TstRegister { n, m, shift, .. } => {
                write!(f, "tst {}, {}{}", Reg(n), Reg(m), Shift(shift))
            }
            Instr::TeqRegister { n, m, shift, .. } => {
                write!(f, "teq {}, {}{}", Reg(n), Reg(m), Shift(shift))
            }

            Instr::Sxtb { d, m, .. } => write!(f, "sxtb {}, {}", Reg(d), Reg(m)),
            Instr::Sxth { d, m, .. } => write!(f, "sxth {}, {}", Reg(d), Reg(m)),
            Instr::Uxtb { d, m, .. } => write!(f, "uxtb {}, {}", Reg(d), Reg(m)),
            Instr::Uxth { d, m, .. } => write!(f, "uxth {}, {}", Reg(d), Reg(m)),
            Instr::Clz { d, m, .. } => write!(f, "clz {}, {}", Reg(d), Reg(m)),
            Instr::Bfi { d, n, lsbit, msbit, .. } => {
                write!(f, "bfi {}, {}, #{}, #{}", Reg(d), Reg(n), lsbit, msbit - lsbit + 1)
            }
            Instr::Ubfx { d, n, lsbit, widthminus1, .. } => {
                write!(f, "ubfx {}, {}, #{}, #{}", Reg(d), Reg(n), lsbit, widthminus1 + 1)
            }
            Instr::Sbfx { d, n, lsbit, widthminus1, .. } => {
                write!(f, "sbfx {}, {}, #{}, #{}", Reg(d), Reg(n), lsbit, widthminus1 + 1)
            }

            Instr::Mul { flags, d, n, m } => {
                write!(f, "mul{} {}, {}, {}", s(flags), Reg(d), Reg(n), Reg(m))
            }
            Instr::Mla { d, n, m, a, .. } => {
                write!(f, "mla {}, {}, {}, {}", Reg(d), Reg(n), Reg(m), Reg(a))
            }
            Instr::Mls { d, n, m, a, .. } => {
                write!(f, "mls {}, {}, {}, {}", Reg(d), Reg(n), Reg(m), Reg(a))
            }
            Instr::Umull { dlo, dhi, n, m, .. } => {
                write!(f, "umull {}, {}, {}, {}", Reg(dlo), Reg(dhi), Reg(n), Reg(m))
            }
            Instr::Smull { dlo, dhi, n, m, .. } => {
                write!(f, "smull {}, {}, {}, {}", Reg(dlo), Reg(dhi), Reg(n), Reg(m))
            }
            Instr::Umlal { dlo, dhi, n, m, .. } => {
                write!(f, "umlal {}, {}, {}, {}", Reg(dlo), Reg(dhi), Reg(n), Reg(m))
            }
            Instr::Smlal { dlo, dhi, n, m, .. } => {
                write!(f, "smlal {}, {}, {}, {}", Reg(dlo), Reg(dhi), Reg(n), Reg(m))
            }
            Instr::Udiv { d, n, m, .. } => {
                write!(f, "udiv {}, {}, {}", Reg(d), Reg(n), Reg(m))
            }
            Instr::Sdiv { d, n, m, .. } => {
                write!(f, "sdiv {}, {}, {}", Reg(d), Reg(n), Reg(m))
            }

            Instr::LdrImmediate { flags, t, n, imm32 } => {
                write!(f, "ldr {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::LdrbImmediate { flags, t, n, imm32 } => {
                write!(f, "ldrb {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::LdrhImmediate { flags, t, n, imm32 } => {
                write!(f, "ldrh {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::LdrsbImmediate { flags, t, n, imm32 } => {
                write!(f, "ldrsb {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::LdrshImmediate { flags, t, n, imm32 } => {
                write!(f, "ldrsh {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::LdrLiteral { t, imm32, .. } => {
                write!(f, "ldr {}, [pc, #{}]", Reg(t), imm32)
            }
            Instr::LdrRegister { t, n, m, shift, .. } => {
                write!(f, "ldr {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::LdrbRegister { t, n, m, shift, .. } => {
                write!(f, "ldrb {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::LdrhRegister { t, n, m, shift, .. } => {
                write!(f, "ldrh {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::LdrsbRegister { t, n, m, shift, .. } => {
                write!(f, "ldrsb {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::LdrshRegister { t, n, m, shift, .. } => {
                write!(f, "ldrsh {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::StrImmediate { flags, t, n, imm32 } => {
                write!(f, "str {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::StrbImmediate { flags, t, n, imm32 } => {
                write!(f, "strb {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::StrhImmediate { flags, t, n, imm32 } => {
                write!(f, "strh {}, {}", Reg(t), AddrImm { n, imm32, flags })
            }
            Instr::StrRegister { t, n, m, shift, .. } => {
                write!(f, "str {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::StrbRegister { t, n, m, shift, .. } => {
                write!(f, "strb {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::StrhRegister { t, n, m, shift, .. } => {
                write!(f, "strh {}, [{}, {}{}]", Reg(t), Reg(n), Reg(m), Shift(shift))
            }
            Instr::LdrdImmediate { flags, t, t2, n, imm32 } => {
                write!(f, "ldrd {}, {}, {}", Reg(t), Reg(t2), AddrImm { n, imm32, flags })
            }
            Instr::StrdImmediate { flags, t, t2, n, imm32 } => {
                write!(f, "strd {}, {}, {}", Reg(t), Reg(t2), AddrImm { n, imm32, flags })
            }
            Instr::Ldrex { t, n, imm32, .. } => {
                write!(f, "ldrex {}, [{}, #{}]", Reg(t), Reg(n), imm32)
            }
            Instr::Strex { d, t, n, imm32, .. } => {
                write!(f, "strex {}, {}, [{}, #{}]", Reg(d), Reg(t), Reg(n), imm32)
            }

            Instr::Push { registers, .. } => write!(f, "push {}", RegList(registers)),
            Instr::Pop { registers, .. } => write!(f, "pop {}", RegList(registers)),
            Instr::Stm { flags, n, registers } => {
                let wb = if flags.contains(InstrFlags::WBACK) { "!" } else { "" };
                write!(f, "stm {}{wb}, {}", Reg(n), RegList(registers))
            }
            Instr::Stmdb { flags, n, registers } => {
                let wb = if flags.contains(InstrFlags::WBACK) { "!" } else { "" };
                write!(f, "stmdb {}{wb}, {}", Reg(n), RegList(registers))
            }
            Instr::Ldm { flags, n, registers } => {
                let wb = if flags.contains(InstrFlags::WBACK) { "!" } else { "" };
                write!(f, "ldm {}{wb}, {}", Reg(n), RegList(registers))
            }
            Instr::Ldmdb { flags, n, registers } => {
                let wb = if flags.contains(InstrFlags::WBACK) { "!" } else { "" };
                write!(f, "ldmdb {}{wb}, {}", Reg(n), RegList(registers))
            }

            Instr::B { imm32, .. } => write!(f, "b #{imm32}"),
            Instr::BCond { cond, imm32, .. } => write!(f, "b{} #{imm32}", cond_str(cond)),
            Instr::Bl { imm32, .. } => write!(f, "bl #{imm32}"),
            Instr::Bx { m, .. } => write!(f, "bx {}", Reg(m)),
            Instr::Blx { m, .. } => write!(f, "blx {}", Reg(m)),
            Instr::CbNZ { flags, n, imm32 } => {
                let nz = if flags.contains(InstrFlags::NONZERO) { "cbnz" } else { "cbz" };
                write!(f, "{nz} {}, #{imm32}", Reg(n))
            }
            Instr::TbbH { flags, n, m } => {
                if flags.contains(InstrFlags::TBH) {
                    write!(f, "tbh [{}, {}, lsl #1]", Reg(n), Reg(m))
                } else {
                    write!(f, "tbb [{}, {}]", Reg(n), Reg(m))
                }
            }

            Instr::Svc { imm32, .. } => write!(f, "svc #{imm32}"),
            Instr::Bkpt { imm32, .. } => write!(f, "bkpt #{imm32}"),
            Instr::Msr { n, sysm, .. } => write!(f, "msr #{sysm}, {}", Reg(n)),
            Instr::Mrs { d, sysm, .. } => write!(f, "mrs {}, #{sysm}", Reg(d)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::ImmCarry;

    #[test]
    fn renders_common_forms() {
        let mov = Instr::MovImmediate {
            flags: InstrFlags::SETFLAGS,
            d: 0,
            imm: ImmCarry { imm32: 42, carry: false },
        };
        assert_eq!(mov.to_string(), "movs r0, #42");

        let push = Instr::Push {
            flags: InstrFlags::empty(),
            registers: (1 << 4) | (1 << 5) | (1 << 14),
        };
        assert_eq!(push.to_string(), "push {r4, r5, lr}");

        let ldr = Instr::LdrImmediate {
            flags: InstrFlags::INDEX | InstrFlags::ADD,
            t: 1,
            n: 13,
            imm32: 8,
        };
        assert_eq!(ldr.to_string(), "ldr r1, [sp, #8]");
    }
}
