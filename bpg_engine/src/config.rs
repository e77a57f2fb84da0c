use std::{env, fmt::Display};

use bpg_common::Secret;
use log::*;

pub const DEFAULT_REUSE_THRESHOLD: usize = 5;
pub const DEFAULT_CALLBACK_TIMEFRAME_SECS: u64 = 3600;
pub const DEFAULT_CALLBACK_INITIAL_DELAY_SECS: u64 = 5;
pub const DEFAULT_MAX_INFLIGHT_NOTIFICATIONS: usize = 64;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Engine-wide configuration, loaded from `BPG_*` environment variables.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Default minimum run length of expired orders before a keychain slot may be recycled. Gateways may
    /// carry their own override. Zero disables reuse.
    pub reuse_address_orders_threshold: usize,
    /// When false, the per-status order counters are off and [`crate::CounterStore`] reports
    /// `CountersDisabled` instead of silently returning zeroes.
    pub count_orders: bool,
    /// Ceiling on the webhook retry delay, in seconds. Doubling stops once the next delay would exceed
    /// this value.
    pub callback_attempt_timeframe_secs: u64,
    /// First webhook retry delay, in seconds. Doubles on every attempt.
    pub callback_initial_delay_secs: u64,
    /// Upper bound on concurrently running webhook retry sequences.
    pub max_inflight_notifications: usize,
    /// Buffer size of the event hook channels.
    pub event_buffer_size: usize,
    /// Process-wide key material for the secret vault.
    pub server_secret: Secret<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reuse_address_orders_threshold: DEFAULT_REUSE_THRESHOLD,
            count_orders: false,
            callback_attempt_timeframe_secs: DEFAULT_CALLBACK_TIMEFRAME_SECS,
            callback_initial_delay_secs: DEFAULT_CALLBACK_INITIAL_DELAY_SECS,
            max_inflight_notifications: DEFAULT_MAX_INFLIGHT_NOTIFICATIONS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            server_secret: Secret::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let reuse_address_orders_threshold =
            parse_env_int("BPG_REUSE_ADDRESS_ORDERS_THRESHOLD", DEFAULT_REUSE_THRESHOLD);
        let count_orders = parse_env_flag("BPG_COUNT_ORDERS", false);
        let callback_attempt_timeframe_secs =
            parse_env_int("BPG_CALLBACK_ATTEMPT_TIMEFRAME", DEFAULT_CALLBACK_TIMEFRAME_SECS);
        let callback_initial_delay_secs =
            parse_env_int("BPG_CALLBACK_INITIAL_DELAY", DEFAULT_CALLBACK_INITIAL_DELAY_SECS);
        let max_inflight_notifications =
            parse_env_int("BPG_MAX_INFLIGHT_NOTIFICATIONS", DEFAULT_MAX_INFLIGHT_NOTIFICATIONS);
        let event_buffer_size = parse_env_int("BPG_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let server_secret = env::var("BPG_SERVER_SECRET").map(Secret::new).unwrap_or_else(|_| {
            error!(
                "🪛️ BPG_SERVER_SECRET is not set. Stored gateway secrets cannot be decrypted without it. Please set \
                 it before running against real data."
            );
            Secret::default()
        });
        Self {
            reuse_address_orders_threshold,
            count_orders,
            callback_attempt_timeframe_secs,
            callback_initial_delay_secs,
            max_inflight_notifications,
            event_buffer_size,
            server_secret,
        }
    }
}

fn parse_env_int<T: std::str::FromStr + Display + Copy>(var: &str, default: T) -> T
where <T as std::str::FromStr>::Err: Display {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn parse_env_flag(var: &str, default: bool) -> bool {
    let value = match env::var(var) {
        Ok(v) => v,
        Err(_) => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            error!("🪛️ {other} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        },
    }
}
