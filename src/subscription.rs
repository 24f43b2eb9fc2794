//! Subscription manager: keeps one table's subscribed set converged on its
//! visible set.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::chain::ChainError;
use crate::connection::StreamTransport;
use crate::profile::RankBy;
use crate::row::{RowSet, ScannerRow};
use crate::stream::{ScannerFilterParams, SubscriptionTarget};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub unresolved: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.subscribed.is_empty() && self.unsubscribed.is_empty() && self.unresolved.is_empty()
    }
}

pub fn subscription_target(row: &ScannerRow) -> Result<SubscriptionTarget, ChainError> {
    Ok(SubscriptionTarget {
        pair: row.pair_address.clone(),
        token: row.token1_address.clone(),
        chain: row.chain()?,
    })
}

/// Scanner filter for a row set: volume-ranked, honeypots excluded, scoped to
/// the chain of the first row. `None` for an empty set or an unmapped chain.
pub fn scanner_filter_for(rows: &RowSet) -> Option<ScannerFilterParams> {
    let first = rows.first()?;
    let chain = first.chain().ok()?;
    Some(ScannerFilterParams {
        rank_by: RankBy::Volume,
        chain,
        is_not_hp: true,
    })
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionManager {
    subscribed: BTreeSet<String>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribed(&self) -> &BTreeSet<String> {
        &self.subscribed
    }

    pub fn is_subscribed(&self, pair_address: &str) -> bool {
        self.subscribed.contains(pair_address)
    }

    /// One reconcile pass. Keys are resolved against the canonical rows;
    /// unresolvable keys produce no intents.
    pub fn reconcile(
        &mut self,
        visible: &BTreeSet<String>,
        rows: &RowSet,
        transport: &mut dyn StreamTransport,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let to_subscribe: Vec<String> = visible.difference(&self.subscribed).cloned().collect();
        let to_unsubscribe: Vec<String> = self.subscribed.difference(visible).cloned().collect();

        for key in to_subscribe {
            match resolve(rows, &key) {
                Some(target) => {
                    transport.subscribe_pair(&target);
                    transport.subscribe_pair_stats(&target);
                    self.subscribed.insert(key.clone());
                    report.subscribed.push(key);
                }
                None => report.unresolved.push(key),
            }
        }

        for key in to_unsubscribe {
            match resolve(rows, &key) {
                Some(target) => {
                    transport.unsubscribe_pair(&target);
                    transport.unsubscribe_pair_stats(&target);
                    report.unsubscribed.push(key.clone());
                }
                None => report.unresolved.push(key.clone()),
            }
            self.subscribed.remove(&key);
        }

        report
    }

    /// Unsubscribes keys that are about to leave the canonical rows, using
    /// the rows they still resolve against.
    pub fn evict(
        &mut self,
        keys: &[String],
        previous_rows: &RowSet,
        transport: &mut dyn StreamTransport,
    ) -> Vec<String> {
        let mut evicted = Vec::new();
        for key in keys {
            if !self.subscribed.remove(key) {
                continue;
            }
            if let Some(target) = resolve(previous_rows, key) {
                transport.unsubscribe_pair(&target);
                transport.unsubscribe_pair_stats(&target);
            }
            evicted.push(key.clone());
        }
        evicted
    }

    /// Re-issues the scanner filter for the current rows; returns the
    /// parameters that were issued.
    pub fn issue_scanner_filter(
        &self,
        rows: &RowSet,
        transport: &mut dyn StreamTransport,
    ) -> Option<ScannerFilterParams> {
        let params = scanner_filter_for(rows)?;
        transport.scanner_filter(&params);
        Some(params)
    }
}

fn resolve(rows: &RowSet, key: &str) -> Option<SubscriptionTarget> {
    let Some(row) = rows.get(key) else {
        debug!(
            component = "subscription",
            event = "subscription.key.unresolved",
            pair_address = key
        );
        return None;
    };
    match subscription_target(row) {
        Ok(target) => Some(target),
        Err(err) => {
            warn!(
                component = "subscription",
                event = "subscription.key.unmapped_chain",
                pair_address = key,
                error = %err,
                "row chain is not in the supported set"
            );
            None
        }
    }
}
