mod sats;
mod secret;

pub mod op;

pub use sats::{Sats, SatsConversionError, BTC_CURRENCY_CODE, SATS_PER_BTC};
pub use secret::Secret;
