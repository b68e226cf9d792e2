//! Serial Session Core
//!
//! Connection lifecycle, reader thread and reset control for one link.
//!
//! # Components
//!
//! - `SerialSession`: lifecycle state machine and public entry point
//! - reader: the thread that owns the open handle and streams lines
//! - control: FIFO dispatcher running DTR/RTS reset pulses
//!
//! All user-visible output leaves through the session's `EventSink`.

pub mod control;
pub mod error;
pub mod manager;
mod reader;
pub mod state;

pub use control::{ResetStep, ResetTicket};
pub use error::SessionError;
pub use manager::{LinkInfo, SerialSession, SessionSettings};
pub use reader::find_address;
pub use state::SessionState;
