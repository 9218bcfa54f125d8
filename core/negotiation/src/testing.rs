//! Harness for exercising complete connectors against each other without an
//! HTTP layer: a loopback transport delivers callback posts straight into
//! the peer's inbound router, so tests cover full wire serialization.

pub mod fixtures;
pub mod network;

pub use network::{CountingAudit, LoopbackNetwork, RejectingValidator, TestDataspace, TestNode};

/// Compares an expected error against `Result::unwrap_err` by display.
#[macro_export]
macro_rules! assert_err_eq {
    ($expected:expr, $actual:expr $(,)*) => {
        assert_eq!($expected.to_string(), $actual.unwrap_err().to_string())
    };
}
