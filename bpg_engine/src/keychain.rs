//! Keychain index allocation, including the address-reuse decision.
//!
//! Watch-only wallets only scan a bounded address-lookahead window, so long runs of unused, never-paid
//! addresses risk future payments landing outside the window and going undetected. When enough recent
//! orders have expired without ever being paid, the allocator recycles one of their keychain slots instead
//! of minting a new index, but only after a threshold-sized proof of disuse and a final live on-chain
//! check of the candidate address.

use std::sync::Arc;

use log::{debug, trace};
use thiserror::Error;

use crate::{
    db_types::{Gateway, Order, OrderStatus},
    traits::{BlockchainAdapter, BlockchainError, OrderStore, StoreError},
};

#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    /// The order-history collaborator failed. Fatal to the allocation: minting without having verified
    /// history risks an index collision.
    #[error("{0}")]
    Store(#[from] StoreError),
    /// The live on-chain check failed. Fatal for the same reason.
    #[error("{0}")]
    Blockchain(#[from] BlockchainError),
    #[error("No blockchain adapter is configured; cannot verify candidate addresses for reuse")]
    NoBlockchainAdapter,
}

/// The outcome of an allocation.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub keychain_index: i64,
    /// The expired order whose slot is being recycled, when the reuse path was taken.
    pub reused_from: Option<Order>,
    /// True when a fresh index was minted and the caller must persist the gateway's counter bump.
    pub minted: bool,
}

pub struct KeychainAllocator {
    store: Arc<dyn OrderStore>,
    chain: Option<Arc<dyn BlockchainAdapter>>,
}

impl KeychainAllocator {
    pub fn new(store: Arc<dyn OrderStore>, chain: Option<Arc<dyn BlockchainAdapter>>) -> Self {
        Self { store, chain }
    }

    /// Decide the keychain index for a new order on `gateway`.
    ///
    /// An explicitly `requested` index is used verbatim: no history is consulted and no counter is
    /// bumped. Otherwise the gateway's recent history is scanned for a reusable run of expired orders; if
    /// none qualifies, the next index is minted (`minted = true`, and the caller must persist the bump).
    ///
    /// Callers must serialize invocations per gateway: the mint path reads the gateway's persisted
    /// counter, and two racing allocations would otherwise compute the same "next" index.
    pub async fn allocate(&self, gateway: &Gateway, requested: Option<i64>) -> Result<Allocation, AllocationError> {
        if let Some(index) = requested {
            trace!("🔑️ Gateway #{}: explicit keychain index {index} requested, using verbatim", gateway.id);
            return Ok(Allocation { keychain_index: index, reused_from: None, minted: false });
        }
        if let Some(candidate) = self.find_reusable_order(gateway).await? {
            debug!(
                "🔑️ Gateway #{}: reusing keychain index {} from expired order #{} (recycled {} times before)",
                gateway.id, candidate.keychain_index, candidate.id, candidate.reused_count
            );
            return Ok(Allocation { keychain_index: candidate.keychain_index, reused_from: Some(candidate), minted: false });
        }
        let next = gateway.current_keychain_index() + 1;
        debug!("🔑️ Gateway #{}: minting new keychain index {next}", gateway.id);
        Ok(Allocation { keychain_index: next, reused_from: None, minted: true })
    }

    /// Scan order history for a qualifying run of expired orders and return the reuse candidate, fully
    /// re-verified against the chain. `None` means the caller should mint.
    async fn find_reusable_order(&self, gateway: &Gateway) -> Result<Option<Order>, AllocationError> {
        let threshold = gateway.reuse_threshold;
        if threshold == 0 {
            return Ok(None);
        }
        let chain = self.chain.as_ref().ok_or(AllocationError::NoBlockchainAdapter)?;

        let run = self.collect_expired_run(gateway, threshold).await?;
        if run.len() < threshold {
            trace!(
                "🔑️ Gateway #{}: expired run of {} is below the reuse threshold of {threshold}",
                gateway.id,
                run.len()
            );
            return Ok(None);
        }
        // The most recent member of the (truncated) run is the candidate. Its cached Expired status is
        // not trusted: a payment may have landed after the order expired, so the address is re-checked
        // live before its slot is recycled.
        let Some(candidate) = run.into_iter().next_back() else {
            return Ok(None);
        };
        let on_chain = chain.fetch_transactions(&candidate.address).await?;
        if on_chain.is_empty() {
            Ok(Some(candidate))
        } else {
            debug!(
                "🔑️ Gateway #{}: candidate address {} has {} on-chain transaction(s); minting instead",
                gateway.id,
                candidate.address,
                on_chain.len()
            );
            Ok(None)
        }
    }

    /// Accumulate the run of consecutive expired orders ending at the gateway's most recent order,
    /// truncated to its oldest `threshold` entries.
    ///
    /// History is fetched in pages of `threshold`, ordered by keychain index (then reused count)
    /// descending. Within a page, orders sharing a keychain index are deduplicated down to the record
    /// with the highest reused count, the authoritative record for that slot. The surviving orders are
    /// scanned newest-to-oldest: expired orders extend the run, never-used `New` orders are skipped
    /// without breaking it, and any settled or canceled order ends the scan.
    async fn collect_expired_run(&self, gateway: &Gateway, threshold: usize) -> Result<Vec<Order>, AllocationError> {
        let mut run: Vec<Order> = Vec::new();
        let mut offset = 0;
        'pages: loop {
            let page = self.store.orders_page(gateway.id, threshold, offset).await?;
            if page.is_empty() {
                break;
            }
            let mut slots = dedup_by_keychain_index(page);
            // scan in true chronological order, newest first
            slots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            for order in slots {
                match order.status {
                    OrderStatus::Expired => run.insert(0, order),
                    OrderStatus::New => {},
                    _ => break 'pages,
                }
            }
            offset += threshold;
        }
        run.truncate(threshold);
        Ok(run)
    }
}

/// Collapse orders sharing a keychain index down to the one with the highest reused count. The input is
/// ordered `keychain_index DESC, reused_count DESC`, so the first record seen for a slot wins.
fn dedup_by_keychain_index(page: Vec<Order>) -> Vec<Order> {
    let mut out: Vec<Order> = Vec::with_capacity(page.len());
    for order in page {
        if out.last().map(|o| o.keychain_index) == Some(order.keychain_index) {
            continue;
        }
        out.push(order);
    }
    out
}

#[cfg(test)]
mod test {
    use bpg_common::Sats;
    use chrono::Utc;

    use super::dedup_by_keychain_index;
    use crate::db_types::{Order, OrderStatus};

    fn order(keychain_index: i64, reused_count: i64) -> Order {
        Order {
            id: keychain_index * 100 + reused_count,
            gateway_id: 1,
            keychain_index,
            address: format!("addr-{keychain_index}"),
            amount: Sats::from(1000),
            amount_paid: Sats::from(0),
            status: OrderStatus::Expired,
            reused_count,
            callback_url: None,
            callback_data: None,
            callback_response: None,
            created_at: Utc::now(),
            transactions: Vec::new(),
        }
    }

    #[test]
    fn dedup_keeps_the_most_recycled_record_per_slot() {
        // keychain DESC, reused DESC, as the store contract guarantees
        let page = vec![order(9, 0), order(8, 2), order(8, 1), order(8, 0), order(7, 1), order(7, 0)];
        let deduped = dedup_by_keychain_index(page);
        let kept: Vec<(i64, i64)> = deduped.iter().map(|o| (o.keychain_index, o.reused_count)).collect();
        assert_eq!(kept, vec![(9, 0), (8, 2), (7, 1)]);
    }
}
