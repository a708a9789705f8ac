//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `storecast` application.
//!
//! This module centralizes the error types shared by the broker, the store
//! catalog and the HTTP layer, and the logging setup.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("not-a-level");
    }
}
