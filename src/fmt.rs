//! Logging shim.
//!
//! Routes the crate's log macros to `defmt` on the embedded target and to
//! the `log` facade on the host. With neither feature enabled the
//! arguments are still evaluated by reference so no `unused` warnings leak.

#![allow(unused_macros)]

macro_rules! log_to {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(all(feature = "log", not(feature = "defmt")))]
            ::log::$level!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { log_to!(trace, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_to!(debug, $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { log_to!(info, $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_to!(warn, $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { log_to!(error, $($arg)*) };
}
