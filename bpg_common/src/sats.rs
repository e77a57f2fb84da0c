use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const BTC_CURRENCY_CODE: &str = "BTC";
pub const SATS_PER_BTC: i64 = 100_000_000;

//--------------------------------------       Sats        ------------------------------------------------------------
/// An amount of bitcoin, in satoshi.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Sats(i64);

op!(binary Sats, Add, add);
op!(binary Sats, Sub, sub);
op!(inplace Sats, SubAssign, sub_assign);
op!(unary Sats, Neg, neg);

impl Mul<i64> for Sats {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Sats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in satoshi: {0}")]
pub struct SatsConversionError(String);

impl From<i64> for Sats {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Sats {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Sats {}

impl TryFrom<u64> for Sats {
    type Error = SatsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(SatsConversionError(format!("Value {} is too large to convert to Sats", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Sats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.abs() < 10_000 {
            write!(f, "{} sat", self.0)
        } else {
            write!(f, "{} BTC", self.to_btc_string())
        }
    }
}

impl Sats {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// The amount as a decimal BTC string with trailing zeroes trimmed, e.g. `150_000_000 => "1.5"`.
    /// This is the encoding used for the `amount_in_btc` fields on the merchant callback.
    pub fn to_btc_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / SATS_PER_BTC as u64;
        let frac = abs % SATS_PER_BTC as u64;
        if frac == 0 {
            return format!("{sign}{whole}");
        }
        let frac = format!("{frac:08}");
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn btc_string_rendering() {
        assert_eq!(Sats::from(0).to_btc_string(), "0");
        assert_eq!(Sats::from(1).to_btc_string(), "0.00000001");
        assert_eq!(Sats::from(100_000).to_btc_string(), "0.001");
        assert_eq!(Sats::from(100_000_000).to_btc_string(), "1");
        assert_eq!(Sats::from(150_000_000).to_btc_string(), "1.5");
        assert_eq!(Sats::from(2_345_678_901).to_btc_string(), "23.45678901");
        assert_eq!(Sats::from(-50_000_000).to_btc_string(), "-0.5");
    }

    #[test]
    fn arithmetic() {
        let a = Sats::from(1500);
        let b = Sats::from(500);
        assert_eq!(a + b, Sats::from(2000));
        assert_eq!(a - b, Sats::from(1000));
        assert_eq!(-b, Sats::from(-500));
        assert_eq!(b * 3, Sats::from(1500));
        let total: Sats = vec![a, b, b].into_iter().sum();
        assert_eq!(total, Sats::from(2500));
    }
}
