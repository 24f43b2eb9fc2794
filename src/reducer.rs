//! Live-update reducer: applies decoded stream events to a table's rows.
//!
//! Every merge keys on `pairAddress`. Events for unknown keys are no-ops.

use crate::row::{format_decimal, parse_numeric, RowSet, ScannerRow};
use crate::stream::{InboundEvent, PairStatsPayload, Swap, TickPayload};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceOutcome {
    pub changed: bool,
    pub inserted: Vec<String>,
    /// Rows removed by a snapshot replace, still carrying their last data.
    pub evicted: Vec<ScannerRow>,
}

impl ReduceOutcome {
    fn touched(changed: bool) -> Self {
        Self {
            changed,
            ..Self::default()
        }
    }

    pub fn evicted_keys(&self) -> Vec<String> {
        self.evicted
            .iter()
            .map(|row| row.pair_address.clone())
            .collect()
    }
}

pub fn reduce(rows: &mut RowSet, event: &InboundEvent) -> ReduceOutcome {
    match event {
        InboundEvent::Tick(tick) => ReduceOutcome::touched(apply_tick(rows, tick)),
        InboundEvent::PairStats(stats) => ReduceOutcome::touched(apply_pair_stats(rows, stats)),
        InboundEvent::ScannerPairs(snapshot) => {
            replace_snapshot(rows, snapshot.results.pairs.clone())
        }
    }
}

fn latest_usable_swap(swaps: &[Swap]) -> Option<&Swap> {
    swaps
        .iter()
        .rev()
        .find(|swap| !swap.is_outlier && !swap.price_token1_usd.trim().is_empty())
}

/// Sets price from the last non-outlier swap and recomputes market cap as
/// supply x price.
pub fn apply_tick(rows: &mut RowSet, tick: &TickPayload) -> bool {
    let Some(row) = rows.get_mut(&tick.pair.pair) else {
        return false;
    };
    let Some(swap) = latest_usable_swap(&tick.swaps) else {
        return false;
    };

    let supply = parse_numeric(&row.token1_total_supply_formatted);
    let price = parse_numeric(&swap.price_token1_usd);
    let current_mcap = format_decimal(supply * price);

    let changed = row.price != swap.price_token1_usd || row.current_mcap != current_mcap;
    row.price = swap.price_token1_usd.clone();
    row.current_mcap = current_mcap;
    changed
}

pub fn apply_pair_stats(rows: &mut RowSet, stats: &PairStatsPayload) -> bool {
    let stats = &stats.pair;
    let Some(row) = rows.get_mut(&stats.pair_address) else {
        return false;
    };

    let before = row.clone();
    row.contract_verified = Some(stats.is_verified);
    row.contract_renounced = Some(stats.mint_authority_renounced);
    row.honey_pot = Some(stats.token1_is_honeypot);
    row.mintable = Some(stats.mint_authority_renounced);
    row.freezable = Some(stats.freeze_authority_renounced);
    row.burned = Some(parse_numeric(&stats.burned_supply) > 0.0);
    *row != before
}

/// Replaces the row set with a snapshot. Known keys keep their streamed
/// price and market cap when non-empty; absent keys are evicted.
pub fn replace_snapshot(rows: &mut RowSet, incoming: Vec<ScannerRow>) -> ReduceOutcome {
    let incoming = RowSet::from_rows(incoming);
    let mut inserted = Vec::new();

    let merged: Vec<ScannerRow> = incoming
        .into_rows()
        .into_iter()
        .map(|mut next| {
            match rows.get(&next.pair_address) {
                Some(existing) => {
                    if !existing.price.is_empty() {
                        next.price = existing.price.clone();
                    }
                    if !existing.current_mcap.is_empty() {
                        next.current_mcap = existing.current_mcap.clone();
                    }
                }
                None => inserted.push(next.pair_address.clone()),
            }
            next
        })
        .collect();

    let merged = RowSet::from_rows(merged);
    let evicted: Vec<ScannerRow> = rows
        .rows()
        .iter()
        .filter(|row| !merged.contains(&row.pair_address))
        .cloned()
        .collect();

    let changed = merged != *rows;
    *rows = merged;
    ReduceOutcome {
        changed,
        inserted,
        evicted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{
        PairStats, ScannerPairsPayload, ScannerPairsResults, TickPair,
    };

    fn row(pair: &str) -> ScannerRow {
        let mut row = ScannerRow::with_pair(pair);
        row.token1_total_supply_formatted = "1000".to_string();
        row.price = "1".to_string();
        row.current_mcap = "1000".to_string();
        row
    }

    fn set(keys: &[&str]) -> RowSet {
        RowSet::from_rows(keys.iter().map(|key| row(key)))
    }

    fn tick(pair: &str, swaps: &[(bool, &str)]) -> InboundEvent {
        InboundEvent::Tick(TickPayload {
            pair: TickPair {
                pair: pair.to_string(),
            },
            swaps: swaps
                .iter()
                .map(|(is_outlier, price)| Swap {
                    is_outlier: *is_outlier,
                    price_token1_usd: price.to_string(),
                })
                .collect(),
        })
    }

    fn snapshot(keys: &[&str]) -> InboundEvent {
        InboundEvent::ScannerPairs(ScannerPairsPayload {
            filter: None,
            results: ScannerPairsResults {
                pairs: keys.iter().map(|key| ScannerRow::with_pair(*key)).collect(),
            },
        })
    }

    fn keys(rows: &RowSet) -> Vec<&str> {
        rows.keys().collect()
    }

    #[test]
    fn tick_uses_last_non_outlier_swap() {
        let mut rows = set(&["A"]);
        let outcome = reduce(&mut rows, &tick("A", &[(false, "2"), (false, "3"), (true, "50")]));

        assert!(outcome.changed);
        let a = rows.get("A").unwrap();
        assert_eq!(a.price, "3");
        assert_eq!(a.current_mcap, "3000");
    }

    #[test]
    fn tick_without_usable_swap_or_key_is_noop() {
        let mut rows = set(&["A"]);
        let before = rows.clone();

        assert!(!reduce(&mut rows, &tick("A", &[(true, "9")])).changed);
        assert!(!reduce(&mut rows, &tick("A", &[])).changed);
        assert!(!reduce(&mut rows, &tick("Z", &[(false, "9")])).changed);
        assert_eq!(rows, before);
    }

    #[test]
    fn pair_stats_maps_audit_flags() {
        let mut rows = set(&["A"]);
        let event = InboundEvent::PairStats(PairStatsPayload {
            pair: PairStats {
                pair_address: "A".to_string(),
                is_verified: true,
                mint_authority_renounced: true,
                freeze_authority_renounced: false,
                token1_is_honeypot: true,
                burned_supply: "0.5".to_string(),
            },
        });

        assert!(reduce(&mut rows, &event).changed);
        let a = rows.get("A").unwrap();
        assert_eq!(a.contract_verified, Some(true));
        assert_eq!(a.contract_renounced, Some(true));
        assert_eq!(a.mintable, Some(true));
        assert_eq!(a.freezable, Some(false));
        assert_eq!(a.honey_pot, Some(true));
        assert_eq!(a.burned, Some(true));
    }

    #[test]
    fn snapshot_carries_price_and_evicts_absent_keys() {
        let mut rows = set(&["A", "B", "C"]);
        rows.get_mut("A").unwrap().price = "7".to_string();

        let outcome = reduce(&mut rows, &snapshot(&["A", "B", "D"]));
        assert_eq!(keys(&rows), vec!["A", "B", "D"]);
        assert_eq!(rows.get("A").unwrap().price, "7");
        assert_eq!(rows.get("D").unwrap().price, "");
        assert_eq!(outcome.inserted, vec!["D"]);
        assert_eq!(outcome.evicted_keys(), vec!["C"]);
    }

    #[test]
    fn snapshot_eviction_is_idempotent() {
        let mut rows = set(&["A", "B", "C"]);
        reduce(&mut rows, &snapshot(&["A", "B"]));
        assert_eq!(keys(&rows), vec!["A", "B"]);

        let again = reduce(&mut rows, &snapshot(&["A", "B"]));
        assert!(!again.changed);
        assert!(again.evicted.is_empty());
        assert_eq!(keys(&rows), vec!["A", "B"]);
    }

    #[test]
    fn snapshot_collapses_duplicate_incoming_keys() {
        let mut rows = RowSet::default();
        reduce(&mut rows, &snapshot(&["A", "A", "B"]));
        assert_eq!(keys(&rows), vec!["A", "B"]);
    }
}
