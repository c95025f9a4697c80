// SPDX-License-Identifier: GPL-3.0-only

//! Recording sessions
//!
//! ```text
//! Idle ─▶ Opening ─▶ Recording ─▶ Closing ─▶ Done
//!            │           │
//!            └─────┬─────┘
//!                  ▼
//!               Aborted
//! ```
//!
//! [`Coordinator`] drives one session through these states. Devices are
//! opened in the order ToF source, USB source, depth sink, amplitude sink,
//! USB sink and released in exactly the reverse order.

pub mod coordinator;
pub mod pump;
pub mod report;
pub mod session;
pub mod state;

pub use coordinator::Coordinator;
pub use pump::{Pump, SkipCounters, TofPump, UsbPump};
pub use report::{SessionReport, StreamReport};
pub use session::Session;
pub use state::{SessionState, StateMachine};
