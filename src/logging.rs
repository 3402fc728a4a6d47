//! # Logging
//!
//! Target-independent logging macros:
//! - `defmt` feature (firmware): forwarded to `defmt`, transported over RTT
//! - host tests: printed with `println!` / `eprintln!`
//! - anything else: compiled out, arguments still type-checked
//!
//! Format strings must stay within what both `defmt` and `core::fmt`
//! accept: plain `{}` and `{:?}` placeholders.

/// Log an error.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        eprintln!("[ERROR] {}", format!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log a warning.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        println!("[WARN] {}", format!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log an informational message.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        println!("[INFO] {}", format!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log a debug message.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        println!("[DEBUG] {}", format!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}
