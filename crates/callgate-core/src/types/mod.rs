//! # Types
//!
//! Shared types used throughout callgate.
//!
//! These are the vocabulary every component speaks: addresses inside the
//! current process, the closed set of primitive type tokens a signature may
//! use, and the dynamically typed values exchanged with the scripting layer.

pub mod address;
pub mod token;
pub mod value;

// Re-export all public types
pub use address::{Address, AddressInput};
pub use token::TypeToken;
pub use value::Value;
