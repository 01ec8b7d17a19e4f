//! State, role, and error enumerations for the MBus protocol engine.

/// The protocol engine's finite-state-machine position.
///
/// Each bit on the wire occupies a full clock period split into a "drive"
/// half-period and a "latch" half-period; the engine alternates between the
/// `Drive*` and `Latch*` members of a pair accordingly. See
/// [`crate::engine::MbusEngine`] for the transition table.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ProtocolState {
    /// Bus quiescent; no transaction in progress.
    #[default]
    Idle,
    /// One half-period before arbitration begins.
    Prearb,
    /// Sampling dominant/recessive on data-in to resolve ordinary arbitration.
    Arbitration,
    /// Driving the priority-arbitration bit.
    PrioDrive,
    /// Latching the priority-arbitration bit.
    PrioLatch,
    /// Driving the reserved bit slot (non-transmitters only).
    ArbReservedDrive,
    /// Latching the reserved bit slot (non-transmitters only).
    ArbReservedLatch,
    /// Driving a bit of the 4-then-4 short address.
    DriveShortAddr,
    /// Latching a bit of the 4-then-4 short address.
    LatchShortAddr,
    /// Driving a bit of the 28-bit-prefix-then-4-bit-channel long address.
    DriveLongAddr,
    /// Latching a bit of the 28-bit-prefix-then-4-bit-channel long address.
    LatchLongAddr,
    /// Driving a payload bit.
    DriveData,
    /// Latching a payload bit.
    LatchData,
    /// First phase of asserting end-of-message via held clock-out.
    RequestInterrupt,
    /// Second phase of asserting end-of-message via held clock-out.
    RequestingInterrupt,
    /// Third phase of asserting end-of-message via held clock-out.
    RequestedInterrupt,
    /// Transitional state entering the control-bit exchange (falls through
    /// to [`ProtocolState::BeginControl`] within the same edge).
    PreBeginControl,
    /// Settled at the start of the control-bit exchange.
    BeginControl,
    /// Driving the end-of-message control bit (CB0).
    DriveCb0,
    /// Latching the end-of-message control bit (CB0).
    LatchCb0,
    /// Driving the ACK/error control bit (CB1).
    DriveCb1,
    /// Latching the ACK/error control bit (CB1).
    LatchCb1,
    /// Driving the bus back toward idle.
    DriveIdle,
    /// Deciding whether to settle at idle or begin another back-to-back arbitration.
    BeginIdle,
    /// Latched error state; all further edge events are no-ops until reinitialization.
    Error,
}

/// The role this node is currently playing in the transaction.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Role {
    /// Default, non-participating role: mirror data-in to data-out.
    #[default]
    Forward,
    /// Driving the transaction from the local transmit buffer.
    Transmit,
    /// Capturing the transaction into a local receive buffer.
    Receive,
    /// Tentative receive pending broadcast-channel mask match.
    ReceiveBroadcast,
    /// Driving control bits as the node that requested the interrupt.
    Interrupter,
}

/// Outcome classification for a completed or aborted transaction.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ErrorKind {
    /// No error; transaction completed normally.
    #[default]
    #[error("no error")]
    NoError,
    /// `send()` was attempted while the engine was not idle.
    #[error("bus busy")]
    BusBusy,
    /// Two consecutive clock-edge events reported the same level.
    #[error("clock synchronization error")]
    ClockSynchError,
    /// Two consecutive data-edge events reported the same level.
    #[error("data synchronization error")]
    DataSynchError,
    /// A receive exceeded the selected slot's capacity, or no slot was available.
    #[error("receive buffer overflow")]
    RecvOverflow,
    /// Reserved: an externally requested abort.
    #[error("transaction interrupted")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_state_default_is_idle() {
        assert_eq!(ProtocolState::default(), ProtocolState::Idle);
    }

    #[test]
    fn role_default_is_forward() {
        assert_eq!(Role::default(), Role::Forward);
    }

    #[test]
    fn error_kind_default_is_no_error() {
        assert_eq!(ErrorKind::default(), ErrorKind::NoError);
    }

    #[test]
    fn error_kind_display_matches_taxonomy() {
        use core::fmt::Write;
        let mut buf: heapless::String<32> = heapless::String::new();
        write!(buf, "{}", ErrorKind::RecvOverflow).unwrap();
        assert_eq!(buf.as_str(), "receive buffer overflow");

        let mut buf: heapless::String<32> = heapless::String::new();
        write!(buf, "{}", ErrorKind::BusBusy).unwrap();
        assert_eq!(buf.as_str(), "bus busy");
    }
}
