//! Session lifecycle for tabletalk.
//!
//! This crate tracks what a game's message stream implies about the game:
//!
//! 1. **Lifecycle**: who is connected, whether the game has started,
//!    which phase it is in and whose turn it is ([`Lifecycle`])
//! 2. **Session**: one game's lifecycle plus its log of accepted events
//!    ([`Session`])
//!
//! Messages that are well formed but arrive in the wrong state come back
//! as a [`LifecycleError`] and leave the state untouched.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatch (above)   ← delivers accepted events and refusals to handlers
//!     ↕
//! Session (this crate)  ← validates ordering and updates game state
//!     ↕
//! Protocol (below)   ← provides typed Events
//! ```

mod config;
mod error;
mod lifecycle;
mod session;

pub use config::LifecycleConfig;
pub use error::LifecycleError;
pub use lifecycle::{Lifecycle, LifecycleState, Transition, INITIAL_PHASE};
pub use session::{LoggedEvent, Session, SessionInfo};
