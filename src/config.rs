//! Configuration record bound to the engine at initialization.
//!
//! The client owns a [`MbusConfig`] and guarantees its lifetime outlasts the
//! [`crate::engine::MbusEngine`] that borrows it. The engine only ever
//! writes into the receive-buffer slots and their length fields it exposes
//! (see [`crate::buffer`]); every other field is read-only from the
//! engine's perspective.

use crate::buffer::RecvBufferPool;
use crate::state::ErrorKind;
use core::fmt;

/// Static node identity and receive resources bound to one [`crate::engine::MbusEngine`].
///
/// `N` is the number of receive buffer slots offered to the engine
/// (`DEFAULT_RECV_SLOTS` = 2, per the protocol's usual budget).
pub struct MbusConfig<'a, const N: usize> {
    /// Low 4 bits matched against short-addressed frames.
    pub short_prefix: u8,
    /// Low 24 bits matched against long-addressed frames.
    pub full_prefix: u32,
    /// Bit *c* set means this node receives broadcasts on channel *c*.
    pub broadcast_channels: u16,
    /// Reserved: receive every frame regardless of address match. Not
    /// enforced by the core state machine (spec §9, Open Questions).
    pub promiscuous_mode: bool,
    /// Reserved: participate in bus enumeration. Not acted on by the core
    /// state machine (spec §9, Open Questions).
    pub participate_in_enumeration: bool,
    /// Receive buffer slots offered to the engine. A slot's `len` field is
    /// the signed ownership token described in [`crate::buffer`].
    pub recv_slots: RecvBufferPool<'a, N>,
    /// Invoked once per accepted send, with the number of bytes actually
    /// sent and the terminal error kind (`NoError` on success).
    pub send_done: &'a mut dyn FnMut(u8, ErrorKind),
    /// Invoked once per accepted receive, with the index of the slot now
    /// holding the message (its length field already rewritten to the
    /// negative byte count).
    pub recv: &'a mut dyn FnMut(usize),
    /// Invoked once per transaction that terminates in error.
    pub error: &'a mut dyn FnMut(ErrorKind),
}

impl<'a, const N: usize> MbusConfig<'a, N> {
    /// Builds a configuration record from its constituent fields.
    ///
    /// This is a plain constructor, not a builder: every field must be
    /// supplied up front, mirroring how the rest of this crate favors
    /// direct construction over staged configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        short_prefix: u8,
        full_prefix: u32,
        broadcast_channels: u16,
        promiscuous_mode: bool,
        participate_in_enumeration: bool,
        recv_slots: RecvBufferPool<'a, N>,
        send_done: &'a mut dyn FnMut(u8, ErrorKind),
        recv: &'a mut dyn FnMut(usize),
        error: &'a mut dyn FnMut(ErrorKind),
    ) -> Self {
        Self {
            short_prefix: short_prefix & 0x0F,
            full_prefix: full_prefix & 0x00FF_FFFF,
            broadcast_channels,
            promiscuous_mode,
            participate_in_enumeration,
            recv_slots,
            send_done,
            recv,
            error,
        }
    }
}

// The three callback fields are `&mut dyn FnMut`, which has no `Debug` impl,
// so this can't be `#[derive(Debug)]`; everything else is printed plainly.
impl<'a, const N: usize> fmt::Debug for MbusConfig<'a, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MbusConfig")
            .field("short_prefix", &self.short_prefix)
            .field("full_prefix", &self.full_prefix)
            .field("broadcast_channels", &self.broadcast_channels)
            .field("promiscuous_mode", &self.promiscuous_mode)
            .field(
                "participate_in_enumeration",
                &self.participate_in_enumeration,
            )
            .field("recv_slots", &self.recv_slots)
            .finish_non_exhaustive()
    }
}
