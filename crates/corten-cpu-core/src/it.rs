//! Condition-code evaluation and IT-block state.
//!
//! The packed `Istate` byte keeps `ITSTATE[3:0]` (the countdown mask) in the
//! low nibble and the cached `firstcond` in the high nibble, the same layout
//! the EPSR IT/ICI bits unpack to on exception entry/return.

use crate::state::{CpuState, SpecialReg, APSR_C, APSR_N, APSR_V, APSR_Z};

/// The 4-bit condition codes.
pub mod cond {
    pub const EQ: u8 = 0b0000;
    pub const NE: u8 = 0b0001;
    pub const CS: u8 = 0b0010;
    pub const CC: u8 = 0b0011;
    pub const MI: u8 = 0b0100;
    pub const PL: u8 = 0b0101;
    pub const VS: u8 = 0b0110;
    pub const VC: u8 = 0b0111;
    pub const HI: u8 = 0b1000;
    pub const LS: u8 = 0b1001;
    pub const GE: u8 = 0b1010;
    pub const LT: u8 = 0b1011;
    pub const GT: u8 = 0b1100;
    pub const LE: u8 = 0b1101;
    pub const AL: u8 = 0b1110;
}

pub fn in_it_block(state: &CpuState) -> bool {
    state.read_special(SpecialReg::Istate) & 0xF != 0
}

pub fn last_in_it_block(state: &CpuState) -> bool {
    state.read_special(SpecialReg::Istate) & 0xF == 0b1000
}

/// Enters an IT block: `firstcond` cached in the high nibble, mask in the
/// low nibble.
pub fn it_init(state: &mut CpuState, firstcond: u8, mask: u8) {
    let istate = (u32::from(firstcond) << 4) | u32::from(mask);
    state.write_special(SpecialReg::Istate, istate);
}

/// Shifts `ITSTATE[4:0]` left by one within its 5-bit field; when
/// `ITSTATE[2:0]` reaches zero the whole state clears and the block ends.
pub fn it_advance(state: &mut CpuState) {
    let mut istate = state.read_special(SpecialReg::Istate);
    if istate & 0b111 == 0 {
        istate = 0;
    } else {
        let next = (istate << 1) & 0x1F;
        istate = (istate & !0x1F) | next;
    }
    state.write_special(SpecialReg::Istate, istate);
}

/// The condition governing the current instruction: the cached firstcond
/// inside an IT block, AL outside, `None` for the unpredictable leftover
/// states.
pub fn current_cond(state: &CpuState) -> Option<u8> {
    let istate = state.read_special(SpecialReg::Istate);
    if istate & 0xF != 0 {
        return Some(((istate >> 4) & 0xF) as u8);
    }
    if istate == 0 {
        return Some(cond::AL);
    }
    None
}

/// The standard condition table keyed on bits [3:1]; bit [0] inverts the
/// result except for the `0b1111` encoding.
pub fn condition_passed(state: &CpuState, cond: u8) -> bool {
    let apsr = state.read_special(SpecialReg::Apsr);
    let n = apsr & APSR_N != 0;
    let z = apsr & APSR_Z != 0;
    let c = apsr & APSR_C != 0;
    let v = apsr & APSR_V != 0;

    let mut result = match (cond >> 1) & 0x7 {
        0b000 => z,
        0b001 => c,
        0b010 => n,
        0b011 => v,
        0b100 => c && !z,
        0b101 => n == v,
        0b110 => n == v && !z,
        _ => true,
    };
    if cond & 1 != 0 && cond != 0b1111 {
        result = !result;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::APSR_Z;

    #[test]
    fn it_block_advances_and_terminates() {
        let mut state = CpuState::new();
        // ITTE EQ: firstcond=0000, mask=0110 -> three-instruction block.
        it_init(&mut state, cond::EQ, 0b0110);
        assert!(in_it_block(&state));
        assert_eq!(current_cond(&state), Some(cond::EQ));

        it_advance(&mut state);
        assert!(in_it_block(&state));
        assert_eq!(current_cond(&state), Some(cond::EQ));

        it_advance(&mut state);
        assert!(last_in_it_block(&state));

        it_advance(&mut state);
        assert!(!in_it_block(&state));
        assert_eq!(current_cond(&state), Some(cond::AL));
    }

    #[test]
    fn condition_table_matches_flags() {
        let mut state = CpuState::new();
        state.write_special(SpecialReg::Apsr, APSR_Z | APSR_C);
        assert!(condition_passed(&state, cond::EQ));
        assert!(!condition_passed(&state, cond::NE));
        assert!(condition_passed(&state, cond::CS));
        // HI needs C && !Z.
        assert!(!condition_passed(&state, cond::HI));
        assert!(condition_passed(&state, cond::LS));
        // N == V (both clear) -> GE.
        assert!(condition_passed(&state, cond::GE));
        assert!(!condition_passed(&state, cond::GT)); // Z set
        assert!(condition_passed(&state, cond::AL));
        // 0b1111 never inverts.
        assert!(condition_passed(&state, 0b1111));
    }
}
