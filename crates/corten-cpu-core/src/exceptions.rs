//! The exception subsystem: pending/active bookkeeping, priority
//! arbitration at the three per-instruction check points, stack framing on
//! entry and the EXC_RETURN-driven return path.

use tracing::trace;

use crate::error::CoreError;
use crate::mem::{BusFaultKind, SystemBus};
use crate::state::{
    reg, CpuState, Mode, SpecialReg, APSR_MASK, CCR_STKALIGN, EPSR_IT_MASK, EPSR_T,
    HFSR_FORCED, IPSR_EXC_MASK, SYSCTRL_SPSEL,
};

pub const NUM_IRQS: usize = 32;
/// 16 internal exception numbers plus the external interrupt lines.
pub const NUM_EXCEPTIONS: usize = 16 + NUM_IRQS;

/// One lower than any configurable priority; Thread mode executes at
/// `LOWEST_PRIORITY + 1`.
pub const LOWEST_PRIORITY: i16 = 255;

/// Exception kinds, identified by their architectural number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Reset,
    Nmi,
    HardFault,
    MemManage,
    BusFault,
    UsageFault,
    SvCall,
    DebugMonitor,
    PendSv,
    SysTick,
    /// External interrupt line 0..31, exception number 16 + n.
    Irq(u8),
}

impl Exception {
    pub fn number(self) -> u16 {
        match self {
            Exception::Reset => 1,
            Exception::Nmi => 2,
            Exception::HardFault => 3,
            Exception::MemManage => 4,
            Exception::BusFault => 5,
            Exception::UsageFault => 6,
            Exception::SvCall => 11,
            Exception::DebugMonitor => 12,
            Exception::PendSv => 14,
            Exception::SysTick => 15,
            Exception::Irq(n) => 16 + u16::from(n),
        }
    }

    pub fn from_number(number: u16) -> Option<Exception> {
        match number {
            1 => Some(Exception::Reset),
            2 => Some(Exception::Nmi),
            3 => Some(Exception::HardFault),
            4 => Some(Exception::MemManage),
            5 => Some(Exception::BusFault),
            6 => Some(Exception::UsageFault),
            11 => Some(Exception::SvCall),
            12 => Some(Exception::DebugMonitor),
            14 => Some(Exception::PendSv),
            15 => Some(Exception::SysTick),
            n if (16..16 + NUM_IRQS as u16).contains(&n) => Some(Exception::Irq((n - 16) as u8)),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExcFlags: u8 {
        const PENDING = 1 << 0;
        const ACTIVE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionEntry {
    pub priority: i16,
    pub number: u8,
    flags: ExcFlags,
}

/// Fixed-size table indexed by exception number, with a scalar mirror of
/// how many entries are pending.
#[derive(Clone)]
pub struct ExceptionBank {
    entries: [ExceptionEntry; NUM_EXCEPTIONS],
    pending_count: u32,
}

impl Default for ExceptionBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionBank {
    pub fn new() -> Self {
        let mut bank = Self {
            entries: [ExceptionEntry {
                priority: 0,
                number: 0,
                flags: ExcFlags::empty(),
            }; NUM_EXCEPTIONS],
            pending_count: 0,
        };
        bank.reset();
        bank
    }

    /// Restores the architectural defaults: everything inactive, priorities
    /// zero except the three fixed negative ones.
    pub fn reset(&mut self) {
        self.pending_count = 0;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let number = (i + 1) as u16;
            entry.number = number as u8;
            entry.flags = ExcFlags::empty();
            entry.priority = match Exception::from_number(number) {
                Some(Exception::Reset) => -3,
                Some(Exception::Nmi) => -2,
                Some(Exception::HardFault) => -1,
                _ => 0,
            };
        }
    }

    fn idx(exception: Exception) -> usize {
        usize::from(exception.number()) - 1
    }

    pub fn is_pending(&self, exception: Exception) -> bool {
        self.entries[Self::idx(exception)].flags.contains(ExcFlags::PENDING)
    }

    pub fn is_active(&self, exception: Exception) -> bool {
        self.entries[Self::idx(exception)].flags.contains(ExcFlags::ACTIVE)
    }

    pub fn set_pending(&mut self, exception: Exception) {
        let entry = &mut self.entries[Self::idx(exception)];
        // A pending exception of the same kind does not pend twice.
        if !entry.flags.contains(ExcFlags::PENDING) {
            self.pending_count += 1;
            entry.flags.insert(ExcFlags::PENDING);
        }
    }

    pub fn clear_pending(&mut self, exception: Exception) {
        let entry = &mut self.entries[Self::idx(exception)];
        debug_assert!(entry.flags.contains(ExcFlags::PENDING));
        entry.flags.remove(ExcFlags::PENDING);
        self.pending_count -= 1;
    }

    pub fn set_active(&mut self, exception: Exception) {
        let entry = &mut self.entries[Self::idx(exception)];
        debug_assert!(!entry.flags.contains(ExcFlags::ACTIVE));
        entry.flags.insert(ExcFlags::ACTIVE);
    }

    pub fn clear_active(&mut self, exception: Exception) {
        let entry = &mut self.entries[Self::idx(exception)];
        debug_assert!(entry.flags.contains(ExcFlags::ACTIVE));
        entry.flags.remove(ExcFlags::ACTIVE);
    }

    pub fn priority(&self, exception: Exception) -> i16 {
        self.entries[Self::idx(exception)].priority
    }

    pub fn set_priority(&mut self, exception: Exception, priority: i16) {
        self.entries[Self::idx(exception)].priority = priority;
    }

    pub fn pending_count(&self) -> u32 {
        self.pending_count
    }

    fn priority_of_number(&self, number: u16) -> i16 {
        self.entries[usize::from(number) - 1].priority
    }
}

/// The instant within a step at which a check point runs; it constrains
/// which exception kinds may be taken and how the return address is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instant {
    PreFetch,
    PostFetch,
    PostExecute,
}

/// Which exceptions a check point may deliver.
fn can_take(exception: Exception, instant: Instant) -> bool {
    match instant {
        Instant::PreFetch => matches!(
            exception,
            Exception::Nmi
                | Exception::SvCall
                | Exception::PendSv
                | Exception::SysTick
                | Exception::Irq(_)
        ),
        Instant::PostFetch => matches!(
            exception,
            Exception::MemManage | Exception::BusFault | Exception::UsageFault
        ),
        Instant::PostExecute => matches!(
            exception,
            Exception::HardFault
                | Exception::MemManage
                | Exception::BusFault
                | Exception::UsageFault
                | Exception::DebugMonitor
        ),
    }
}

/// The address pushed as the stacked return address.
///
/// Asynchronous exceptions (pre-fetch) and fetch-time faults resume at the
/// instruction itself; post-execute faults report the fault and resume at
/// the following instruction.
fn return_address(instant: Instant, instr_addr: u32, next_instr_addr: u32) -> u32 {
    match instant {
        Instant::PreFetch | Instant::PostFetch => instr_addr,
        Instant::PostExecute => next_instr_addr,
    }
}

/// Evaluates pending exceptions at one check point. Returns `true` when an
/// exception preempted (entry has been performed and the PC now points at
/// the handler).
pub fn check_exceptions(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    instant: Instant,
    instr_addr: u32,
    next_instr_addr: u32,
) -> Result<bool, CoreError> {
    if state.exceptions.pending_count() == 0 {
        return Ok(false);
    }

    // The executing priority is that of the IPSR-identified exception, or
    // just below the lowest configurable priority in Thread mode.
    let executing_number = (state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK) as u16;
    let executing_priority = if executing_number != 0 {
        state.exceptions.priority_of_number(executing_number)
    } else {
        LOWEST_PRIORITY + 1
    };

    let mut preempt: Option<(Exception, i16)> = None;
    for number in 1..=NUM_EXCEPTIONS as u16 {
        let exception = match Exception::from_number(number) {
            Some(e) => e,
            None => continue,
        };
        if !state.exceptions.is_pending(exception) || state.exceptions.is_active(exception) {
            continue;
        }
        let priority = state.exceptions.priority(exception);
        if priority >= executing_priority {
            continue;
        }
        // Ascending number order makes a strict comparison the
        // smallest-number tie-break.
        match preempt {
            Some((_, best)) if priority >= best => {}
            _ => preempt = Some((exception, priority)),
        }
    }

    let Some((exception, _)) = preempt else {
        return Ok(false);
    };
    if !can_take(exception, instant) {
        return Ok(false);
    }

    let return_addr = return_address(instant, instr_addr, next_instr_addr);
    state.exceptions.clear_pending(exception);
    exception_entry(state, bus, exception, return_addr)?;

    // Stacking faults nest one level: a push failure pends a BusFault that
    // the next check point delivers. When the BusFault entry itself fails
    // to stack, it escalates to HardFault; a HardFault that cannot stack
    // either is a lockup.
    if exception == Exception::BusFault && state.exceptions.is_pending(Exception::BusFault) {
        trace!("bus fault while entering the bus-fault handler; escalating");
        state.exceptions.clear_pending(Exception::BusFault);
        let hfsr = state.read_special(SpecialReg::Hfsr) | HFSR_FORCED;
        state.write_special(SpecialReg::Hfsr, hfsr);
        exception_entry(state, bus, Exception::HardFault, return_addr)?;
        if state.exceptions.is_pending(Exception::BusFault) {
            return Err(CoreError::Unexpected);
        }
    }
    Ok(true)
}

/// PushStack followed by ExceptionTaken.
pub fn exception_entry(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    exception: Exception,
    return_addr: u32,
) -> Result<(), CoreError> {
    trace!(
        number = exception.number(),
        return_addr = format_args!("{return_addr:#010x}"),
        "exception entry"
    );
    push_stack(state, bus, return_addr)?;
    exception_taken(state, bus, exception)
}

/// Pushes the eight-word frame and loads EXC_RETURN into LR.
fn push_stack(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    return_addr: u32,
) -> Result<(), CoreError> {
    let frame_size = 0x20u32;
    let force_align = state.read_special(SpecialReg::Ccr) & CCR_STKALIGN != 0;
    let sp_mask = if force_align { !0x4u32 } else { !0u32 };

    let sp_reg = if state.mode() == Mode::Thread && !state.is_main_stack() {
        SpecialReg::SpProcess
    } else {
        SpecialReg::SpMain
    };
    let sp = state.read_special(sp_reg);
    let frame_ptr_align = force_align && sp & 0x4 != 0;
    let frame_ptr = sp.wrapping_sub(frame_size) & sp_mask;
    state.write_special(sp_reg, frame_ptr);

    // Architecturally only the slot locations are mandated; writing in
    // increasing frame offset keeps bus traces deterministic.
    let r0 = state.read_reg(0);
    let r1 = state.read_reg(1);
    let r2 = state.read_reg(2);
    let r3 = state.read_reg(3);
    let r12 = state.read_reg(12);
    let lr = state.read_reg(reg::LR);
    bus.write_u32_or_raise(state, frame_ptr, r0, BusFaultKind::Stack);
    bus.write_u32_or_raise(state, frame_ptr + 0x4, r1, BusFaultKind::Stack);
    bus.write_u32_or_raise(state, frame_ptr + 0x8, r2, BusFaultKind::Stack);
    bus.write_u32_or_raise(state, frame_ptr + 0xC, r3, BusFaultKind::Stack);
    bus.write_u32_or_raise(state, frame_ptr + 0x10, r12, BusFaultKind::Stack);
    bus.write_u32_or_raise(state, frame_ptr + 0x14, lr, BusFaultKind::Stack);
    bus.write_u32_or_raise(state, frame_ptr + 0x18, return_addr, BusFaultKind::Stack);
    let xpsr = state.read_special(SpecialReg::Xpsr);
    let xpsr_stacked =
        (xpsr & 0xFFFF_FC00) | (u32::from(frame_ptr_align) << 9) | (xpsr & 0x1FF);
    bus.write_u32_or_raise(state, frame_ptr + 0x1C, xpsr_stacked, BusFaultKind::Stack);

    let exc_return = match state.mode() {
        Mode::Handler => 0xFFFF_FFF1,
        Mode::Thread => {
            if state.is_main_stack() {
                0xFFFF_FFF9
            } else {
                0xFFFF_FFFD
            }
        }
    };
    state.write_reg(reg::LR, exc_return);
    Ok(())
}

/// Vector fetch and the switch into Handler mode.
fn exception_taken(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    exception: Exception,
) -> Result<(), CoreError> {
    let vector_table = state.read_special(SpecialReg::Vtor) & !0x7F;
    let vector_addr = vector_table + 4 * u32::from(exception.number());
    let target = bus.read_u32_or_raise(state, vector_addr, BusFaultKind::Precise);

    state.branch_to(target & !1);
    state.set_mode(Mode::Handler);

    let ipsr = u32::from(exception.number()) & IPSR_EXC_MASK;
    state.write_special(SpecialReg::Ipsr, ipsr);

    let mut epsr = state.read_special(SpecialReg::Epsr);
    epsr &= !(EPSR_T | EPSR_IT_MASK);
    epsr |= (target & 1) << 24;
    state.write_special(SpecialReg::Epsr, epsr);

    // Handlers run on the main stack; nPRIV is unchanged.
    let sys_ctrl = state.read_special(SpecialReg::SysCtrl) & !SYSCTRL_SPSEL;
    state.write_special(SpecialReg::SysCtrl, sys_ctrl);

    state.exceptions.set_active(exception);
    trace!(
        number = exception.number(),
        handler = format_args!("{:#010x}", target & !1),
        "exception taken"
    );
    Ok(())
}

/// Dispatched from `bx_write_pc` when Handler mode branches to an
/// `0xFxxxxxxx` address.
pub fn exception_return(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    exc_return: u32,
) -> Result<(), CoreError> {
    trace!(exc_return = format_args!("{exc_return:#010x}"), "exception return");
    debug_assert_eq!(state.mode(), Mode::Handler);

    if exc_return & 0x0FFF_FFF0 != 0x0FFF_FFF0 {
        return Err(CoreError::ExecutorUnpredictable);
    }

    let returning_number = (state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK) as u16;
    let returning = Exception::from_number(returning_number).ok_or(CoreError::Unexpected)?;

    let frame_ptr = match exc_return & 0xF {
        0b0001 => {
            state.set_mode(Mode::Handler);
            let sys_ctrl = state.read_special(SpecialReg::SysCtrl) & !SYSCTRL_SPSEL;
            state.write_special(SpecialReg::SysCtrl, sys_ctrl);
            state.read_special(SpecialReg::SpMain)
        }
        0b1001 => {
            state.set_mode(Mode::Thread);
            let sys_ctrl = state.read_special(SpecialReg::SysCtrl) & !SYSCTRL_SPSEL;
            state.write_special(SpecialReg::SysCtrl, sys_ctrl);
            state.read_special(SpecialReg::SpMain)
        }
        0b1101 => {
            state.set_mode(Mode::Thread);
            let sys_ctrl = state.read_special(SpecialReg::SysCtrl) | SYSCTRL_SPSEL;
            state.write_special(SpecialReg::SysCtrl, sys_ctrl);
            state.read_special(SpecialReg::SpProcess)
        }
        _ => return Err(CoreError::UsageFault),
    };

    state.exceptions.clear_active(returning);
    pop_stack(state, bus, frame_ptr, exc_return)?;

    let ipsr = state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK;
    match state.mode() {
        // Returning into Handler mode with a zero IPSR is inconsistent, as
        // is Thread mode with a nonzero one.
        Mode::Handler if ipsr == 0 => Err(CoreError::UsageFault),
        Mode::Thread if ipsr != 0 => Err(CoreError::UsageFault),
        _ => Ok(()),
    }
}

/// Pops the eight-word frame and restores the PSR pieces.
fn pop_stack(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    frame_ptr: u32,
    exc_return: u32,
) -> Result<(), CoreError> {
    let frame_size = 0x20u32;
    let force_align = state.read_special(SpecialReg::Ccr) & CCR_STKALIGN != 0;

    let r0 = bus.read_u32_or_raise(state, frame_ptr, BusFaultKind::Unstack);
    let r1 = bus.read_u32_or_raise(state, frame_ptr + 0x4, BusFaultKind::Unstack);
    let r2 = bus.read_u32_or_raise(state, frame_ptr + 0x8, BusFaultKind::Unstack);
    let r3 = bus.read_u32_or_raise(state, frame_ptr + 0xC, BusFaultKind::Unstack);
    let r12 = bus.read_u32_or_raise(state, frame_ptr + 0x10, BusFaultKind::Unstack);
    let lr = bus.read_u32_or_raise(state, frame_ptr + 0x14, BusFaultKind::Unstack);
    let return_addr = bus.read_u32_or_raise(state, frame_ptr + 0x18, BusFaultKind::Unstack);
    let psr = bus.read_u32_or_raise(state, frame_ptr + 0x1C, BusFaultKind::Unstack);

    state.write_reg(0, r0);
    state.write_reg(1, r1);
    state.write_reg(2, r2);
    state.write_reg(3, r3);
    state.write_reg(12, r12);
    state.write_reg(reg::LR, lr);
    state.branch_to(return_addr);

    let sp_mask = if psr & (1 << 9) != 0 && force_align { 0x4 } else { 0 };
    let sp_reg = match exc_return & 0xF {
        0b0001 | 0b1001 => SpecialReg::SpMain,
        0b1101 => SpecialReg::SpProcess,
        _ => return Err(CoreError::Unexpected),
    };
    let sp = (state.read_special(sp_reg).wrapping_add(frame_size)) | sp_mask;
    state.write_special(sp_reg, sp);

    state.write_special(SpecialReg::Apsr, psr & APSR_MASK);
    state.write_special(SpecialReg::Ipsr, psr & IPSR_EXC_MASK);
    state.write_special(SpecialReg::Epsr, psr & (EPSR_T | EPSR_IT_MASK));
    Ok(())
}
