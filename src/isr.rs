//! Optional global-singleton wiring for firmware that wants one static
//! [`MbusEngine`] shared between two interrupt vectors (clock-in, data-in),
//! guarded by a [`critical_section::Mutex`].
//!
//! The engine itself imposes no such restriction — it is a plain struct and
//! nothing stops a caller from owning several instances directly. This
//! module exists for the common case of a single bus node with exactly two
//! ISR entry points, mirroring the driver crate this one is descended from.

use crate::engine::MbusEngine;
use crate::pin::PinDriver;
use core::cell::RefCell;
use critical_section::Mutex;

/// Builds an empty global cell suitable for a `static` declaration.
///
/// # Example
/// ```rust
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use mbus_proto::engine::MbusEngine;
/// use mbus_proto::isr::global_mbus_engine_init;
/// use mbus_proto::pin::{PinDriver, PinId};
///
/// struct MyPins;
/// impl PinDriver for MyPins {
///     fn set(&mut self, _pin: PinId, _level: bool) {}
/// }
///
/// static MBUS_ENGINE: Mutex<RefCell<Option<MbusEngine<'static, MyPins, 2>>>> =
///     global_mbus_engine_init::<MyPins, 2>();
/// ```
pub const fn global_mbus_engine_init<P: PinDriver, const N: usize>()
-> Mutex<RefCell<Option<MbusEngine<'static, P, N>>>> {
    Mutex::new(RefCell::new(None))
}

/// Moves an already-initialized engine into the global cell, replacing
/// whatever was there.
pub fn global_mbus_engine_setup<P: PinDriver, const N: usize>(
    global: &'static Mutex<RefCell<Option<MbusEngine<'static, P, N>>>>,
    engine: MbusEngine<'static, P, N>,
) {
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(engine));
    });
}

/// Forwards a clock-in transition to the global engine, if set up.
pub fn global_mbus_clock_edge<P: PinDriver, const N: usize>(
    global: &'static Mutex<RefCell<Option<MbusEngine<'static, P, N>>>>,
    new_level: bool,
) {
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            engine.clock_edge(new_level);
        }
    });
}

/// Forwards a data-in transition to the global engine, if set up.
pub fn global_mbus_data_edge<P: PinDriver, const N: usize>(
    global: &'static Mutex<RefCell<Option<MbusEngine<'static, P, N>>>>,
    new_level: bool,
) {
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            engine.data_edge(new_level);
        }
    });
}

/// Requests a send on the global engine, if set up. Returns `false` if the
/// engine hasn't been set up yet (distinct from a `BUS_BUSY` rejection,
/// which the engine reports via the `send_done` callback instead).
pub fn global_mbus_send<'a, P: PinDriver, const N: usize>(
    global: &'static Mutex<RefCell<Option<MbusEngine<'static, P, N>>>>,
    buffer: &'static [u8],
    priority: bool,
) -> bool {
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            engine.send(buffer, priority);
            true
        } else {
            false
        }
    })
}
