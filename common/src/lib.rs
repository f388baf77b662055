//! RateBridge Common Types
//!
//! Identifier, quote and time types shared by the rate engine and the
//! binaries that wire it up.

pub mod identifiers;
pub mod quote;
pub mod time;

pub use identifiers::*;
pub use quote::*;
pub use time::*;
