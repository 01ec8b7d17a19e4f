//! The protocol engine: arbitration, address decode, data transfer, and the
//! end-of-message control-bit exchange, all driven from two edge-handler
//! entry points.
//!
//! Everything here runs from interrupt context. Neither [`MbusEngine::clock_edge`]
//! nor [`MbusEngine::data_edge`] blocks, allocates, or re-enters itself; the
//! host interrupt controller is responsible for masking against re-entry
//! (see the crate's concurrency notes).

use crate::config::MbusConfig;
use crate::consts::{
    BROADCAST_SHORT_PREFIX, DATA_BYTE_BITS, INTERRUPT_THRESHOLD, LONG_ADDR_BITS,
    LONG_ADDR_ESCAPE_NIBBLE, LONG_ADDR_PREFIX_BITS, SHORT_ADDR_BITS, SHORT_ADDR_PREFIX_BITS,
};
use crate::pin::{PinDriver, PinId};
use crate::state::{ErrorKind, ProtocolState, Role};
use core::fmt;

#[cfg(feature = "defmt-0-3")]
use defmt::{debug, trace, warn};
#[cfg(all(feature = "log", not(feature = "defmt-0-3")))]
use log::{debug, trace, warn};

/// Borrowed transmit buffer and the cursor state walking it bit by bit.
///
/// Empty (`len == 0`) when no send is outstanding this transaction; `byte_idx`
/// stays `0` for the lifetime of a transaction this node did not originate,
/// which is exactly the invariant completion dispatch relies on to recognize
/// "this node transmitted" (spec's `tx_byte_idx > 0`).
#[derive(Debug)]
pub struct TxContext<'a> {
    buf: &'a [u8],
    len: u8,
    priority: bool,
    bit_idx: u8,
    byte_idx: u8,
}

impl<'a> TxContext<'a> {
    const fn empty() -> Self {
        Self {
            buf: &[],
            len: 0,
            priority: false,
            bit_idx: 0,
            byte_idx: 0,
        }
    }
}

/// Address shift register and cursor state for an in-progress receive.
#[derive(Clone, Copy, Debug)]
pub struct RxContext {
    addr: u32,
    bit_idx: u8,
    byte_idx: u8,
    long_mode: bool,
    slot: Option<usize>,
}

impl RxContext {
    const fn reset() -> Self {
        Self {
            addr: 0,
            bit_idx: 0,
            byte_idx: 0,
            long_mode: false,
            slot: None,
        }
    }
}

/// Last observed edge levels and the interrupt-sequence detector.
#[derive(Clone, Copy, Debug)]
pub struct EdgeShadow {
    last_clkin: bool,
    last_datain: bool,
    last_dataout: bool,
    interrupt_count: u8,
}

impl EdgeShadow {
    const fn reset() -> Self {
        // Both lines idle high; see init()'s "shadow levels=1" requirement.
        Self {
            last_clkin: true,
            last_datain: true,
            last_dataout: true,
            interrupt_count: 0,
        }
    }
}

/// The bit-banged MBus link-layer protocol engine.
///
/// `P` is the platform's [`PinDriver`]; `N` is the number of receive buffer
/// slots carried by the bound [`MbusConfig`]. One instance owns one node's
/// complete transaction state; nothing here is shared between instances, so
/// unlike the single static C implementation this was distilled from,
/// multiple rings (or multiple nodes simulated in-process, as the test
/// harness does) can each get their own `MbusEngine`.
pub struct MbusEngine<'a, P, const N: usize>
where
    P: PinDriver,
{
    config: MbusConfig<'a, N>,
    pins: P,
    state: ProtocolState,
    role: Role,
    error: ErrorKind,
    ack: bool,
    tx: TxContext<'a>,
    rx: RxContext,
    shadow: EdgeShadow,
}

// `pins: P` carries no `Debug` bound (a `PinDriver` impl need not be
// printable), so this is hand-written rather than derived.
impl<'a, P, const N: usize> fmt::Debug for MbusEngine<'a, P, N>
where
    P: PinDriver,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MbusEngine")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("error", &self.error)
            .field("ack", &self.ack)
            .field("rx", &self.rx)
            .field("shadow", &self.shadow)
            .finish_non_exhaustive()
    }
}

impl<'a, P, const N: usize> MbusEngine<'a, P, N>
where
    P: PinDriver,
{
    /// Binds a pin driver and configuration record and resets all transient
    /// state to its initial value (state=IDLE, role=FORWARD, shadow
    /// levels=1, cursors=0, error=NO_ERROR), per spec §6.
    pub fn init(pins: P, config: MbusConfig<'a, N>) -> Self {
        Self {
            config,
            pins,
            state: ProtocolState::Idle,
            role: Role::Forward,
            error: ErrorKind::NoError,
            ack: false,
            tx: TxContext::empty(),
            rx: RxContext::reset(),
            shadow: EdgeShadow::reset(),
        }
    }

    /// The engine's current state, mostly useful for tests and diagnostics.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// The role this node is currently playing, mostly useful for tests and
    /// diagnostics.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Requests transmission of `buffer` (its first bytes are the
    /// destination address; see spec §3's Transmit Context). If the bus is
    /// not idle the request is rejected synchronously with `BUS_BUSY` and no
    /// state changes; otherwise arbitration begins on the next clock edge.
    pub fn send(&mut self, buffer: &'a [u8], priority: bool) {
        // `state` alone doesn't move off IDLE until the next clock edge, so
        // a pending send (tx already populated) must also count as busy.
        if self.state != ProtocolState::Idle || self.tx.len > 0 {
            (self.config.send_done)(0, ErrorKind::BusBusy);
            return;
        }
        self.role = Role::Transmit;
        self.tx = TxContext {
            buf: buffer,
            len: buffer.len() as u8,
            priority,
            bit_idx: 0,
            byte_idx: 0,
        };
        self.pins.set(PinId::DataOut, false);
        self.shadow.last_dataout = false;
    }

    /// Entry point for clock-in transitions.
    pub fn clock_edge(&mut self, new_level: bool) {
        if self.state == ProtocolState::Error {
            return;
        }
        if new_level == self.shadow.last_clkin {
            self.latch_sync_error(ErrorKind::ClockSynchError);
            return;
        }
        self.shadow.last_clkin = new_level;
        self.shadow.interrupt_count = 0;

        let was_begin_idle = self.state == ProtocolState::BeginIdle;

        match self.state {
            // These three only advance on a falling clock edge (Design
            // Notes: "the condition is subtle", preserved as spec'd).
            ProtocolState::RequestInterrupt if !self.shadow.last_clkin => {
                self.state = ProtocolState::RequestingInterrupt;
            }
            ProtocolState::RequestingInterrupt if !self.shadow.last_clkin => {
                self.state = ProtocolState::RequestedInterrupt;
            }
            ProtocolState::RequestInterrupt
            | ProtocolState::RequestingInterrupt
            | ProtocolState::RequestedInterrupt => {}
            _ => self.step(),
        }

        let clock_out = matches!(
            self.state,
            ProtocolState::RequestInterrupt
                | ProtocolState::RequestingInterrupt
                | ProtocolState::RequestedInterrupt
        );
        self.pins.set(
            PinId::ClockOut,
            if clock_out { true } else { self.shadow.last_clkin },
        );

        if was_begin_idle {
            self.dispatch_completion();
            self.reset_transaction();
        }
    }

    /// Entry point for data-in transitions.
    pub fn data_edge(&mut self, new_level: bool) {
        if self.state == ProtocolState::Error {
            return;
        }
        if new_level == self.shadow.last_datain {
            self.latch_sync_error(ErrorKind::DataSynchError);
            return;
        }
        self.shadow.last_datain = new_level;

        if new_level {
            self.shadow.interrupt_count = self.shadow.interrupt_count.saturating_add(1);
        }
        if self.shadow.interrupt_count >= INTERRUPT_THRESHOLD {
            let originated = self.state == ProtocolState::RequestedInterrupt;
            self.state = ProtocolState::PreBeginControl;
            if originated {
                self.role = Role::Interrupter;
            }
        }

        let contended = matches!(
            self.state,
            ProtocolState::RequestInterrupt
                | ProtocolState::RequestingInterrupt
                | ProtocolState::RequestedInterrupt
                | ProtocolState::PreBeginControl
                | ProtocolState::BeginControl
        );
        if contended || self.role != Role::Transmit {
            self.pins.set(PinId::DataOut, new_level);
            self.shadow.last_dataout = new_level;
        }
    }

    fn latch_sync_error(&mut self, kind: ErrorKind) {
        #[cfg(any(feature = "defmt-0-3", feature = "log"))]
        warn!("synchronization error, latching ERROR state");
        self.state = ProtocolState::Error;
        self.error = kind;
        (self.config.error)(kind);
    }

    /// The per-clock-edge state transition table. Called once per edge for
    /// every state except the three interrupt-request states, which have
    /// their own falling-edge guard in [`MbusEngine::clock_edge`].
    fn step(&mut self) {
        match self.state {
            ProtocolState::Idle => {
                self.state = ProtocolState::Prearb;
            }
            ProtocolState::Prearb => {
                self.state = ProtocolState::Arbitration;
            }
            ProtocolState::Arbitration => {
                let data_in = self.shadow.last_datain;
                // Whether *this* node asked to transmit (send() always
                // drives data-out low as its first act) — not simply
                // whatever this node's data-out shadow last held, which
                // would also be true after an ordinary forward-mirror.
                let drove_low = self.tx.len > 0;
                match (data_in, drove_low) {
                    (false, true) => self.role = Role::Transmit,
                    (true, false) | (false, false) => self.role = Role::Forward,
                    (true, true) => {} // contention the bus cannot physically produce
                }
                self.state = ProtocolState::PrioDrive;
            }
            ProtocolState::PrioDrive => {
                let want = self.role == Role::Transmit && self.tx.priority;
                self.pins.set(PinId::DataOut, want);
                self.shadow.last_dataout = want;
                self.state = ProtocolState::PrioLatch;
            }
            ProtocolState::PrioLatch => {
                let data_in = self.shadow.last_datain;
                match self.role {
                    Role::Transmit if self.tx.priority => {}
                    Role::Transmit => {
                        if data_in {
                            self.role = Role::Forward;
                        }
                    }
                    _ => {
                        if self.tx.len > 0 && self.tx.priority && !data_in {
                            self.role = Role::Transmit;
                        }
                    }
                }
                self.state = if self.role == Role::Transmit {
                    ProtocolState::DriveData
                } else {
                    ProtocolState::ArbReservedDrive
                };
            }
            // Non-transmitters have nothing to contribute to the reserved
            // slot; they release the bus high and move on.
            ProtocolState::ArbReservedDrive => {
                self.pins.set(PinId::DataOut, true);
                self.shadow.last_dataout = true;
                self.state = ProtocolState::ArbReservedLatch;
            }
            ProtocolState::ArbReservedLatch => {
                self.state = ProtocolState::DriveShortAddr;
            }
            ProtocolState::DriveShortAddr => {
                self.state = ProtocolState::LatchShortAddr;
            }
            ProtocolState::LatchShortAddr => self.latch_short_addr(),
            ProtocolState::DriveLongAddr => {
                self.state = ProtocolState::LatchLongAddr;
            }
            ProtocolState::LatchLongAddr => self.latch_long_addr(),
            ProtocolState::DriveData => self.drive_data(),
            ProtocolState::LatchData => self.latch_data(),
            ProtocolState::RequestInterrupt
            | ProtocolState::RequestingInterrupt
            | ProtocolState::RequestedInterrupt => {
                // handled by the falling-edge guard in clock_edge()
            }
            // Intentional fallthrough: the source has no break between
            // PRE_BEGIN_CONTROL and BEGIN_CONTROL, advancing two phases in
            // one edge. Preserved rather than re-engineered (spec §9).
            ProtocolState::PreBeginControl | ProtocolState::BeginControl => {
                self.state = ProtocolState::DriveCb0;
            }
            ProtocolState::DriveCb0 => {
                if self.role == Role::Interrupter {
                    let bit = self.error == ErrorKind::NoError;
                    self.pins.set(PinId::DataOut, bit);
                    self.shadow.last_dataout = bit;
                }
                self.state = ProtocolState::LatchCb0;
            }
            ProtocolState::LatchCb0 => {
                self.ack = self.shadow.last_datain;
                let was_receive = self.role == Role::Receive;
                if was_receive {
                    self.role = Role::Transmit;
                }
                if self.error == ErrorKind::NoError && !was_receive {
                    self.role = Role::Forward;
                }
                self.state = ProtocolState::DriveCb1;
            }
            ProtocolState::DriveCb1 => {
                if self.role == Role::Interrupter {
                    let bit = self.error == ErrorKind::RecvOverflow;
                    self.pins.set(PinId::DataOut, bit);
                    self.shadow.last_dataout = bit;
                } else if self.role == Role::Transmit && self.tx.byte_idx == 0 {
                    let bit = !self.ack;
                    self.pins.set(PinId::DataOut, bit);
                    self.shadow.last_dataout = bit;
                }
                self.state = ProtocolState::LatchCb1;
            }
            ProtocolState::LatchCb1 => {
                if self.tx.byte_idx > 0 {
                    self.ack = self.shadow.last_datain;
                }
                self.state = ProtocolState::DriveIdle;
            }
            ProtocolState::DriveIdle => {
                self.role = Role::Forward;
                self.state = ProtocolState::BeginIdle;
            }
            ProtocolState::BeginIdle => {
                self.state = if self.shadow.last_datain {
                    ProtocolState::Idle
                } else {
                    ProtocolState::Prearb
                };
            }
            ProtocolState::Error => {}
        }
    }

    fn latch_short_addr(&mut self) {
        let bit = self.shadow.last_datain;
        self.rx.addr = (self.rx.addr << 1) | (bit as u32);
        self.rx.bit_idx += 1;

        if self.rx.bit_idx == SHORT_ADDR_PREFIX_BITS {
            let nibble = (self.rx.addr & 0xF) as u8;
            if nibble == LONG_ADDR_ESCAPE_NIBBLE {
                self.rx.long_mode = true;
            } else if nibble == self.config.short_prefix {
                self.role = Role::Receive;
            } else if nibble == BROADCAST_SHORT_PREFIX {
                self.role = Role::ReceiveBroadcast;
            } else {
                self.role = Role::Forward;
            }
        }

        if self.rx.long_mode {
            self.state = ProtocolState::DriveLongAddr;
            return;
        }

        if self.rx.bit_idx < SHORT_ADDR_BITS {
            self.state = ProtocolState::DriveShortAddr;
            return;
        }

        let channel = (self.rx.addr & 0xF) as u8;
        if self.role == Role::ReceiveBroadcast {
            self.role = if self.config.broadcast_channels & (1 << channel) != 0 {
                Role::Receive
            } else {
                Role::Forward
            };
        }
        if self.role == Role::Receive {
            let addr = self.rx.addr;
            self.select_recv_slot(addr << 24);
        }
        self.rx.bit_idx = 0;
        self.state = if self.error == ErrorKind::RecvOverflow {
            ProtocolState::RequestInterrupt
        } else {
            ProtocolState::DriveData
        };
    }

    fn latch_long_addr(&mut self) {
        let bit = self.shadow.last_datain;
        self.rx.addr = (self.rx.addr << 1) | (bit as u32);
        self.rx.bit_idx += 1;

        if self.rx.bit_idx == LONG_ADDR_PREFIX_BITS {
            let prefix = self.rx.addr & 0x00FF_FFFF;
            if prefix == self.config.full_prefix {
                self.role = Role::Receive;
            } else if prefix == 0 {
                self.role = Role::ReceiveBroadcast;
            } else {
                self.role = Role::Forward;
            }
        }

        if self.rx.bit_idx < LONG_ADDR_BITS {
            self.state = ProtocolState::DriveLongAddr;
            return;
        }

        let channel = (self.rx.addr & 0xF) as u8;
        if self.role == Role::ReceiveBroadcast {
            self.role = if self.config.broadcast_channels & (1 << channel) != 0 {
                Role::Receive
            } else {
                Role::Forward
            };
        }
        if self.role == Role::Receive {
            let addr = self.rx.addr;
            self.select_recv_slot(addr);
        }
        self.rx.bit_idx = 0;
        self.state = if self.error == ErrorKind::RecvOverflow {
            ProtocolState::RequestInterrupt
        } else {
            ProtocolState::DriveData
        };
    }

    /// Selects the first available receive slot and records `addr` into it.
    /// On exhaustion, flips to the NAK path per spec §4.3.
    fn select_recv_slot(&mut self, addr: u32) {
        match self.config.recv_slots.select() {
            Some(idx) => {
                self.config.recv_slots.set_addr(idx, addr);
                self.rx.slot = Some(idx);
            }
            None => {
                #[cfg(any(feature = "defmt-0-3", feature = "log"))]
                warn!("no receive slot available, interjecting overflow NAK");
                self.role = Role::Transmit;
                self.error = ErrorKind::RecvOverflow;
            }
        }
    }

    fn drive_data(&mut self) {
        if self.role == Role::Transmit {
            let bit = (self.tx.buf[self.tx.byte_idx as usize] >> self.tx.bit_idx) & 1 != 0;
            self.pins.set(PinId::DataOut, bit);
            self.shadow.last_dataout = bit;
        }
        self.state = ProtocolState::LatchData;
    }

    fn latch_data(&mut self) {
        match self.role {
            Role::Transmit => {
                self.tx.bit_idx += 1;
                if self.tx.bit_idx == DATA_BYTE_BITS {
                    self.tx.bit_idx = 0;
                    self.tx.byte_idx += 1;
                }
                self.state = if self.tx.byte_idx == self.tx.len {
                    self.error = ErrorKind::NoError;
                    ProtocolState::RequestInterrupt
                } else {
                    ProtocolState::DriveData
                };
            }
            Role::Receive => {
                let idx = self
                    .rx
                    .slot
                    .expect("role Receive implies a selected slot (select_recv_slot invariant)");
                // Re-scoped from the C original's off-by-one (spec §9, Design
                // Notes): that check let `byte_idx == capacity` through to an
                // out-of-bounds slice write once translated to safe Rust
                // indexing, which panics instead of interjecting the NAK.
                // `>=` rejects right at capacity instead of one byte later.
                if (self.rx.byte_idx as i16) >= self.config.recv_slots.capacity(idx) {
                    #[cfg(any(feature = "defmt-0-3", feature = "log"))]
                    warn!("receive overflow mid-message, interjecting NAK");
                    self.role = Role::Transmit;
                    self.error = ErrorKind::RecvOverflow;
                    self.state = ProtocolState::RequestInterrupt;
                    return;
                }
                let bit = self.shadow.last_datain;
                self.config
                    .recv_slots
                    .accumulate_bit(idx, self.rx.byte_idx as usize, self.rx.bit_idx, bit);
                self.rx.bit_idx += 1;
                if self.rx.bit_idx == DATA_BYTE_BITS {
                    self.rx.bit_idx = 0;
                    self.rx.byte_idx += 1;
                }
                self.state = ProtocolState::DriveData;
            }
            _ => {
                self.state = ProtocolState::DriveData;
            }
        }
    }

    /// Fires exactly one of `error`, `send_done`, `recv` for the just-ended
    /// transaction, in that precedence order (spec §4.7). For the
    /// transmitted branch, the reported error kind is read off the CB1 ack
    /// bit rather than `self.error`: this node's own error field never
    /// observes a remote receiver's overflow directly.
    fn dispatch_completion(&mut self) {
        #[cfg(any(feature = "defmt-0-3", feature = "log"))]
        debug!("transaction complete, dispatching callback");
        if self.error != ErrorKind::NoError {
            (self.config.error)(self.error);
        } else if self.tx.byte_idx > 0 {
            let reported = if self.ack {
                ErrorKind::RecvOverflow
            } else {
                ErrorKind::NoError
            };
            (self.config.send_done)(self.tx.byte_idx, reported);
        } else if let Some(idx) = self.rx.slot {
            if self.rx.byte_idx > 0 {
                self.config.recv_slots.release(idx, self.rx.byte_idx);
                (self.config.recv)(idx);
            }
        }
    }

    fn reset_transaction(&mut self) {
        #[cfg(any(feature = "defmt-0-3", feature = "log"))]
        trace!("resetting transaction state for next arbitration round");
        self.role = Role::Forward;
        self.error = ErrorKind::NoError;
        self.ack = false;
        self.tx = TxContext::empty();
        self.rx = RxContext::reset();
    }
}
