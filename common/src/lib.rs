//! Ratekeeper Common Types
//!
//! Shared types used across the Ratekeeper workspace: currency codes, stored
//! rates, fetched snapshots, run identifiers and the error taxonomy of the
//! refresh pipeline.

pub mod identifiers;
pub mod currency;
pub mod rate;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use currency::*;
pub use rate::*;
pub use error::*;
pub use time::*;
