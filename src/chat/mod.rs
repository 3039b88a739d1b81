//! Streaming chat session handling.
//!
//! `ChatClient::send_message` is the whole surface: give it settings, the
//! user's text and two callbacks, and it streams the reply into the first
//! callback and reports the outcome through the second.

mod client;
mod decode;
mod error;

pub use client::{ChatClient, Completion, SessionId};
pub use decode::FrameDecoder;
pub use error::ChatError;
