//! Wire framing

pub mod codec;

pub use codec::MessageCodec;
