//! Command Handlers 实现

mod caption_command_handlers;

pub use caption_command_handlers::*;
