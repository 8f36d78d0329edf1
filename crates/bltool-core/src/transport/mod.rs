//! Serial transport layer abstraction.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use traits::{Transport, TransportError};
