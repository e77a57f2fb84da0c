use std::{fmt::Display, str::FromStr};

use bpg_common::{Sats, Secret};
use chrono::{DateTime, Utc};
use log::error;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   OrderStatus     ------------------------------------------------------------

/// The lifecycle state of an order.
///
/// Orders progress linearly from `New`. `Expired` and `Canceled` are terminal failure states, while `Paid`,
/// `Underpaid` and `Overpaid` are terminal settlement states reached only from `New` or `Unconfirmed`.
///
/// The database stores the variant name; the numeric code is the wire encoding used on merchant callbacks
/// and push payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
pub enum OrderStatus {
    /// The order is newly created, and no payments have been received.
    New,
    /// A payment has been seen on-chain but does not have enough confirmations yet.
    Unconfirmed,
    /// The expected amount has been received in full.
    Paid,
    /// A payment settled for less than the expected amount.
    Underpaid,
    /// A payment settled for more than the expected amount.
    Overpaid,
    /// The order expired before any payment settled.
    Expired,
    /// The order was canceled by the merchant or an admin.
    Canceled,
}

impl OrderStatus {
    /// The numeric wire code. Codes below 2 mean the order is still live.
    pub fn code(&self) -> i32 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Unconfirmed => 1,
            OrderStatus::Paid => 2,
            OrderStatus::Underpaid => 3,
            OrderStatus::Overpaid => 4,
            OrderStatus::Expired => 5,
            OrderStatus::Canceled => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(OrderStatus::New),
            1 => Some(OrderStatus::Unconfirmed),
            2 => Some(OrderStatus::Paid),
            3 => Some(OrderStatus::Underpaid),
            4 => Some(OrderStatus::Overpaid),
            5 => Some(OrderStatus::Expired),
            6 => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    /// True once the order has reached a settlement or terminal state. Settled orders accept no further
    /// push subscriptions.
    pub fn is_settled(&self) -> bool {
        self.code() >= 2
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "New",
            OrderStatus::Unconfirmed => "Unconfirmed",
            OrderStatus::Paid => "Paid",
            OrderStatus::Underpaid => "Underpaid",
            OrderStatus::Overpaid => "Overpaid",
            OrderStatus::Expired => "Expired",
            OrderStatus::Canceled => "Canceled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Unconfirmed" => Ok(Self::Unconfirmed),
            "Paid" => Ok(Self::Paid),
            "Underpaid" => Ok(Self::Underpaid),
            "Overpaid" => Ok(Self::Overpaid),
            "Expired" => Ok(Self::Expired),
            "Canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatus::New
        })
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        OrderStatus::from_code(code).ok_or_else(|| D::Error::custom(format!("invalid order status code: {code}")))
    }
}

//--------------------------------------     Gateway       ------------------------------------------------------------

/// A merchant gateway. Gateways are loaded once at startup, either from the persistent store or from static
/// configuration, and are never deleted at runtime.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    pub id: i64,
    /// The merchant authentication key. Stored encrypted at rest; the decrypted value only ever lives in memory.
    pub secret: Secret<String>,
    /// Inactive gateways refuse order creation.
    pub active: bool,
    pub test_mode: bool,
    /// The highest keychain index ever minted on mainnet. Bumped on every non-reused order creation.
    pub last_keychain_index: i64,
    /// The highest keychain index ever minted in test mode.
    pub test_last_keychain_index: i64,
    /// Default webhook target for orders without a per-order override.
    pub callback_url: Option<String>,
    /// Minimum number of consecutive expired orders required before a keychain slot may be recycled.
    /// Zero disables address reuse entirely.
    pub reuse_threshold: usize,
    pub after_payment_redirect_to: Option<String>,
    pub auto_redirect: bool,
}

impl Gateway {
    /// The keychain counter for the gateway's current network mode.
    pub fn current_keychain_index(&self) -> i64 {
        if self.test_mode {
            self.test_last_keychain_index
        } else {
            self.last_keychain_index
        }
    }

    /// Record that a fresh keychain index was minted. The caller is responsible for persisting the gateway.
    pub fn bump_keychain_index(&mut self) {
        if self.test_mode {
            self.test_last_keychain_index += 1;
        } else {
            self.last_keychain_index += 1;
        }
    }
}

//--------------------------------------  CallbackResponse -----------------------------------------------------------

/// The outcome of the last webhook delivery attempt for an order. `code` is `None` when the failure happened
/// below HTTP (connect error, timeout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub code: Option<u16>,
    pub body: String,
}

//--------------------------------------     Transaction   ------------------------------------------------------------

/// An on-chain payment observed for an order. Transactions are append-only and deduplicated by `txid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub txid: String,
    pub amount: Sats,
    pub confirmations: i64,
    pub block_height: Option<i64>,
}

//--------------------------------------        Order      ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub gateway_id: i64,
    /// The BIP32-style derivation index used to derive `address`.
    pub keychain_index: i64,
    pub address: String,
    pub amount: Sats,
    pub amount_paid: Sats,
    pub status: OrderStatus,
    /// How many times this keychain slot has been recycled. Zero for a freshly minted address.
    pub reused_count: i64,
    /// Per-order webhook target, overriding the gateway default.
    pub callback_url: Option<String>,
    /// Opaque merchant data echoed back on the callback, URL-escaped.
    pub callback_data: Option<String>,
    pub callback_response: Option<CallbackResponse>,
    pub created_at: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
}

impl Order {
    /// The transaction id of the most recently observed payment, if any.
    pub fn tid(&self) -> Option<&str> {
        self.transactions.last().map(|t| t.txid.as_str())
    }
}

//--------------------------------------      NewOrder     ------------------------------------------------------------

/// An order creation request as it arrives from the merchant.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub gateway_id: i64,
    pub amount: Sats,
    /// When supplied, this exact keychain index is used verbatim: no reuse logic runs and the gateway
    /// counter is not bumped.
    pub keychain_index: Option<i64>,
    pub callback_url: Option<String>,
    pub callback_data: Option<String>,
}

impl NewOrder {
    pub fn new(gateway_id: i64, amount: Sats) -> Self {
        Self { gateway_id, amount, keychain_index: None, callback_url: None, callback_data: None }
    }

    pub fn with_keychain_index(mut self, index: i64) -> Self {
        self.keychain_index = Some(index);
        self
    }

    pub fn with_callback_url<S: Into<String>>(mut self, url: S) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn with_callback_data<S: Into<String>>(mut self, data: S) -> Self {
        self.callback_data = Some(data.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in 0..=6 {
            let status = OrderStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
            assert_eq!(OrderStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(OrderStatus::from_code(7).is_none());
    }

    #[test]
    fn live_statuses_accept_push_subscriptions() {
        assert!(!OrderStatus::New.is_settled());
        assert!(!OrderStatus::Unconfirmed.is_settled());
        for status in
            [OrderStatus::Paid, OrderStatus::Underpaid, OrderStatus::Overpaid, OrderStatus::Expired, OrderStatus::Canceled]
        {
            assert!(status.is_settled());
        }
    }

    #[test]
    fn status_serializes_as_wire_code() {
        let json = serde_json::to_string(&OrderStatus::Underpaid).unwrap();
        assert_eq!(json, "3");
        let status: OrderStatus = serde_json::from_str("5").unwrap();
        assert_eq!(status, OrderStatus::Expired);
        assert!(serde_json::from_str::<OrderStatus>("9").is_err());
    }

    #[test]
    fn keychain_counter_tracks_network_mode() {
        let mut gw = Gateway {
            id: 1,
            secret: Secret::new("s".to_string()),
            active: true,
            test_mode: false,
            last_keychain_index: 7,
            test_last_keychain_index: 2,
            callback_url: None,
            reuse_threshold: 5,
            after_payment_redirect_to: None,
            auto_redirect: false,
        };
        gw.bump_keychain_index();
        assert_eq!(gw.current_keychain_index(), 8);
        gw.test_mode = true;
        gw.bump_keychain_index();
        assert_eq!(gw.current_keychain_index(), 3);
        assert_eq!(gw.last_keychain_index, 8);
    }
}
