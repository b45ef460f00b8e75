//! Wire and storage models shared between the synchronizers.
mod api;
mod evaluation;
mod event;
mod user;

pub use api::*;
pub use evaluation::*;
pub use event::*;
pub use user::User;

/// Unix timestamp in seconds, the resolution the remote service uses.
pub type Timestamp = i64;
