//! Wire and crypto primitives shared by every threadlog crate.

pub mod block;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod invite;
pub mod types;
