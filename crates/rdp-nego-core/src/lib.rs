//! Common traits and types shared by the negotiation crates: a cursor-based
//! binary codec (`ReadCursor`/`WriteCursor`), the `Decode`/`Encode` traits built
//! on top of it, and the error-kind plumbing used to report malformed PDUs.

#[macro_use]
mod macros;

mod cursor;
mod decode;
mod encode;
mod error;
mod padding;
mod write_buf;

// Flat API hierarchy of common traits and types

pub use self::cursor::*;
pub use self::decode::*;
pub use self::encode::*;
pub use self::error::*;
pub use self::padding::*;
pub use self::write_buf::*;
