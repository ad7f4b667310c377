pub mod amount;
pub mod engine;
pub mod error;
pub mod model;
pub mod store;

pub use amount::Amount;
pub use engine::MintEngine;
pub use error::MintError;
pub use model::{Item, MintProgress, PaymentIntent, Session, SessionStatus};
pub use store::MintStore;

/// Highest inventory id that can ever be sold.
pub const MAX_SUPPLY: i64 = 5000;

/// Price of a single item, in base units (0.005 coin).
pub const PRICE_PER_ITEM: Amount = Amount::from_base_units(500_000);

pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 20;

/// A pending session that never attracted a payment is released after this long.
pub const SESSION_TIMEOUT_MS: u64 = 10 * common::time::MS_PER_MIN;

/// An unconfirmed payment keeps its reservations this long before release.
/// Much longer than the pending window so a slow-to-confirm transaction does
/// not cost the buyer their items.
pub const PAYMENT_PENDING_TIMEOUT_MS: u64 = 24 * common::time::MS_PER_HOUR;
