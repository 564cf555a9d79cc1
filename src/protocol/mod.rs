//! Protocol module - wire format, reply framing, and command types.
//!
//! This module implements the engine's quiet line protocol:
//! - newline-terminated requests
//! - replies terminated by a single `0x00` sentinel
//! - structured (JSON) command variants

mod command;
mod frame_buffer;
mod wire_format;

pub use command::{Command, ReplyMode, StructuredReply};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    structured_variant, DEFAULT_MAX_REPLY_SIZE, LINE_TERMINATOR, QUIET_FLAG, QUIT_COMMAND,
    SENTINEL, STRUCTURED_MARKER,
};
