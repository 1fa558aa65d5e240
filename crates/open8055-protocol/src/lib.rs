//! Wire formats of the Open8055 server: the 32-byte HID reports spoken to
//! the card, and the line-oriented text protocol spoken to clients.

pub mod codec;
pub mod commands;
pub mod parser;
pub mod reply;
pub mod report;

pub use codec::LineCodec;
pub use commands::{Command, CommandTag};
pub use parser::CommandParser;
pub use reply::Reply;
pub use report::{ConfigReport, InputReport, OutputReport, RawReport, Report};
