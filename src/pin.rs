//! Pin driver abstraction for the MBus engine.
//!
//! The engine never reads GPIO pins directly — inputs arrive only as edge
//! events delivered by the host interrupt controller (see [`crate::engine`]).
//! The only capability the engine needs from the platform is a way to drive
//! an output pin to a level, which it may do several times per edge. This
//! module defines that one capability as [`PinDriver`].

use embedded_hal::digital::OutputPin;

/// Identifies which of the two MBus output lines is being driven.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PinId {
    /// The clock-out line, mirrored from clock-in except during an
    /// interrupt-request sequence.
    ClockOut,
    /// The data-out line, driven during transmit, forward, and interrupter
    /// roles.
    DataOut,
}

/// A capability to write a boolean level to a named output pin.
///
/// Implementations must be callable from interrupt context and must not
/// block. The engine calls [`PinDriver::set`] directly from both edge
/// handlers; a blocking implementation would stall the bus.
pub trait PinDriver {
    /// Drives `pin` to `level` (`true` = high, `false` = low).
    fn set(&mut self, pin: PinId, level: bool);
}

/// Adapts a pair of [`embedded_hal::digital::OutputPin`] implementations
/// (clock-out, data-out) into a [`PinDriver`].
///
/// This is the straightforward way to plug real microcontroller GPIO pins
/// into the engine without writing a bespoke [`PinDriver`] impl. Pin write
/// errors are ignored: the embedded-hal digital contract models them as
/// infallible on virtually every real platform, and the engine has no
/// mechanism to propagate a GPIO fault back to the caller mid-transaction.
#[derive(Debug)]
pub struct HalPinPair<CLK, DATA>
where
    CLK: OutputPin,
    DATA: OutputPin,
{
    clock_out: CLK,
    data_out: DATA,
}

impl<CLK, DATA> HalPinPair<CLK, DATA>
where
    CLK: OutputPin,
    DATA: OutputPin,
{
    /// Wraps the given clock-out and data-out pins.
    pub fn new(clock_out: CLK, data_out: DATA) -> Self {
        Self {
            clock_out,
            data_out,
        }
    }
}

impl<CLK, DATA> PinDriver for HalPinPair<CLK, DATA>
where
    CLK: OutputPin,
    DATA: OutputPin,
{
    fn set(&mut self, pin: PinId, level: bool) {
        let result = match pin {
            PinId::ClockOut => {
                if level {
                    self.clock_out.set_high()
                } else {
                    self.clock_out.set_low()
                }
            }
            PinId::DataOut => {
                if level {
                    self.data_out.set_high()
                } else {
                    self.data_out.set_low()
                }
            }
        };
        let _ = result;
    }
}
