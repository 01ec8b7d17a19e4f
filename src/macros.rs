/// Declares a static global `MBUS_ENGINE` singleton protected by a
/// `critical_section` mutex, for firmware wiring both edge ISRs to the same
/// engine instance.
///
/// # Arguments
/// - `$pins`: the concrete [`crate::pin::PinDriver`] type
/// - `$n`: the number of receive buffer slots
///
/// # Example
/// ```rust,ignore
/// struct MyPins;
/// impl mbus_proto::pin::PinDriver for MyPins {
///     fn set(&mut self, _pin: mbus_proto::pin::PinId, _level: bool) {}
/// }
/// mbus_proto::init_mbus_engine!(MyPins, 2);
/// ```
#[macro_export]
macro_rules! init_mbus_engine {
    ( $pins:ty, $n:expr ) => {
        pub static MBUS_ENGINE: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::engine::MbusEngine<'static, $pins, $n>>>,
        > = $crate::isr::global_mbus_engine_init::<$pins, $n>();
    };
}

/// Moves an already-constructed [`crate::engine::MbusEngine`] into the
/// `MBUS_ENGINE` singleton declared by [`init_mbus_engine!`].
///
/// # Example
/// ```rust,ignore
/// setup_mbus_engine!(engine);
/// ```
#[macro_export]
macro_rules! setup_mbus_engine {
    ( $engine:expr ) => {
        $crate::isr::global_mbus_engine_setup(&MBUS_ENGINE, $engine);
    };
}

/// Forwards a clock-in transition to the `MBUS_ENGINE` singleton.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn CLOCK_IN() {
///     clock_edge_mbus!(read_clock_pin());
/// }
/// ```
#[macro_export]
macro_rules! clock_edge_mbus {
    ( $level:expr ) => {
        $crate::isr::global_mbus_clock_edge(&MBUS_ENGINE, $level);
    };
}

/// Forwards a data-in transition to the `MBUS_ENGINE` singleton.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn DATA_IN() {
///     data_edge_mbus!(read_data_pin());
/// }
/// ```
#[macro_export]
macro_rules! data_edge_mbus {
    ( $level:expr ) => {
        $crate::isr::global_mbus_data_edge(&MBUS_ENGINE, $level);
    };
}

/// Requests a send on the `MBUS_ENGINE` singleton. Returns `false` if the
/// singleton hasn't been set up yet (distinct from a `BUS_BUSY` rejection,
/// which arrives through the configured `send_done` callback instead).
///
/// # Example
/// ```rust,ignore
/// let sent = send_from_mbus!(&[0x30, 0xAB], false);
/// ```
#[macro_export]
macro_rules! send_from_mbus {
    ( $buffer:expr, $priority:expr ) => {
        $crate::isr::global_mbus_send(&MBUS_ENGINE, $buffer, $priority)
    };
}
