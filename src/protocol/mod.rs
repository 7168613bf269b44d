mod constants;
mod message;
mod parsing;

pub use constants::*;
pub use message::{IdGenerator, Message, build, build_followup};
pub use parsing::{
    Header, ParseError, data_payload, decode, decode_header, encode, encode_header, is_success,
};
pub(crate) use parsing::{read_bytes, read_u16, read_u32};
