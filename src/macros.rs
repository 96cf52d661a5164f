//! Crate-internal log macros: `trace!`, `debug!`, `info!` and `warn!`.
//!
//! With the `tracing` feature they become `tracing` events under the calling
//! module's target. Without it the format arguments are type-checked only.

macro_rules! trace {
    ($($t:tt)*) => {
        log!(trace, $($t)*)
    }
}

macro_rules! debug {
    ($($t:tt)*) => {
        log!(debug, $($t)*)
    }
}

macro_rules! info {
    ($($t:tt)*) => {
        log!(info, $($t)*)
    }
}

macro_rules! warn {
    ($($t:tt)*) => {
        log!(warn, $($t)*)
    }
}

macro_rules! log {
    ($level: ident, $($t:tt)*) => {
        #[cfg(feature = "tracing")]
        { tracing::$level!($($t)*) }
        #[cfg(not(feature = "tracing"))]
        { if false { let _ = ::std::format!($($t)*); } }
    }
}
