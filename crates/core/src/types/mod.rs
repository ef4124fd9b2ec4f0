//! Domain types

pub mod event;
pub mod message;
pub mod target;

pub use event::ConnectionChange;
pub use message::Envelope;
pub use target::Target;
