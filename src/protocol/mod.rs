//! Wire protocol: message layout and framing.

pub mod frame;
pub mod message;

pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use message::{Request, Response, PROTOCOL_VERSION};
