//! Filter engine: pure per-row predicate over the accumulated row set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::row::{effective_market_cap, parse_numeric, ScannerRow};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub chain: Option<Chain>,
    #[serde(default)]
    pub min_volume: Option<f64>,
    /// Hours.
    #[serde(default)]
    pub max_age: Option<f64>,
    #[serde(default)]
    pub min_market_cap: Option<f64>,
    #[serde(default)]
    pub exclude_honeypots: bool,
}

/// A single-field edit coming from the filter widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FilterUpdate {
    Chain(Option<Chain>),
    MinVolume(Option<f64>),
    MaxAge(Option<f64>),
    MinMarketCap(Option<f64>),
    ExcludeHoneypots(bool),
}

impl FilterCriteria {
    pub fn apply_update(&mut self, update: FilterUpdate) {
        match update {
            FilterUpdate::Chain(chain) => self.chain = chain,
            FilterUpdate::MinVolume(value) => self.min_volume = value,
            FilterUpdate::MaxAge(value) => self.max_age = value,
            FilterUpdate::MinMarketCap(value) => self.min_market_cap = value,
            FilterUpdate::ExcludeHoneypots(flag) => self.exclude_honeypots = flag,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn active_count(&self) -> usize {
        [
            self.chain.is_some(),
            self.min_volume.is_some(),
            self.max_age.is_some(),
            self.min_market_cap.is_some(),
            self.exclude_honeypots,
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn matches(&self, row: &ScannerRow, now: DateTime<Utc>) -> bool {
        if let Some(chain) = self.chain {
            if row.chain().ok() != Some(chain) {
                return false;
            }
        }

        if let Some(min_volume) = self.min_volume {
            if row.volume_usd() < min_volume {
                return false;
            }
        }

        if let Some(max_age) = self.max_age {
            // Unparsable creation times do not constrain.
            if let Some(created) = row.created_at() {
                let age_hours = (now - created).num_milliseconds() as f64 / 3_600_000.0;
                if age_hours > max_age {
                    return false;
                }
            }
        }

        if let Some(min_market_cap) = self.min_market_cap {
            if parse_numeric(&effective_market_cap(row)) < min_market_cap {
                return false;
            }
        }

        !(self.exclude_honeypots && row.is_honeypot())
    }
}

pub fn apply_filters(
    rows: &[ScannerRow],
    criteria: &FilterCriteria,
    now: DateTime<Utc>,
) -> Vec<ScannerRow> {
    rows.iter()
        .filter(|row| criteria.matches(row, now))
        .cloned()
        .collect()
}
