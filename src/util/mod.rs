//! Various useful things.

pub mod base64;
pub mod duration;
pub mod hex;
