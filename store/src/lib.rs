//! Ratekeeper Rate Store
//!
//! Durable table of current per-currency rates. A merge applies a whole
//! snapshot in one transaction: readers never observe a half-applied refresh.

pub mod store;
pub mod memory;
pub mod postgres;

pub use store::RateStore;
pub use memory::MemoryRateStore;
pub use postgres::PgRateStore;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::FlakyRateStore;
