//! Scanner rows, keyed row sets and the market-cap normalizer.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::chain::{chain_from_id, Chain, ChainError};

/// One token pair as delivered by the scanner endpoint and the stream.
///
/// Numeric fields stay in their wire string form; decoding accepts JSON numbers
/// for them as well. Only `pairAddress` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerRow {
    pub pair_address: String,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub token0_symbol: String,
    #[serde(default)]
    pub token0_name: String,
    #[serde(default)]
    pub token0_address: String,
    #[serde(default)]
    pub token1_symbol: String,
    #[serde(default)]
    pub token1_name: String,
    #[serde(default)]
    pub token1_address: String,
    #[serde(default)]
    pub token1_image_uri: Option<String>,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub price: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub volume: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub liquidity: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub current_mcap: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub initial_mcap: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub pair_mcap_usd: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub pair_mcap_usd_initial: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub token1_total_supply_formatted: String,
    #[serde(rename = "diff1M", default, deserialize_with = "de_numeric_string")]
    pub diff_1m: String,
    #[serde(rename = "diff5M", default, deserialize_with = "de_numeric_string")]
    pub diff_5m: String,
    #[serde(rename = "diff1H", default, deserialize_with = "de_numeric_string")]
    pub diff_1h: String,
    #[serde(rename = "diff6H", default, deserialize_with = "de_numeric_string")]
    pub diff_6h: String,
    #[serde(rename = "diff24H", default, deserialize_with = "de_numeric_string")]
    pub diff_24h: String,
    #[serde(default, deserialize_with = "de_count")]
    pub txns: Option<u64>,
    #[serde(default, deserialize_with = "de_count")]
    pub buys: Option<u64>,
    #[serde(default, deserialize_with = "de_count")]
    pub sells: Option<u64>,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub buy_fee: String,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub sell_fee: String,
    #[serde(default)]
    pub contract_verified: Option<bool>,
    #[serde(default)]
    pub contract_renounced: Option<bool>,
    #[serde(default)]
    pub honey_pot: Option<bool>,
    #[serde(default)]
    pub mintable: Option<bool>,
    #[serde(default)]
    pub freezable: Option<bool>,
    #[serde(default)]
    pub burned: Option<bool>,
    #[serde(default)]
    pub discord_link: Option<String>,
    #[serde(default)]
    pub telegram_link: Option<String>,
    #[serde(default)]
    pub twitter_link: Option<String>,
    #[serde(default)]
    pub web_link: Option<String>,
    #[serde(default)]
    pub age: String,
}

impl ScannerRow {
    pub fn with_pair(pair_address: impl Into<String>) -> Self {
        Self {
            pair_address: pair_address.into(),
            ..Self::default()
        }
    }

    pub fn chain(&self) -> Result<Chain, ChainError> {
        chain_from_id(self.chain_id)
    }

    pub fn is_honeypot(&self) -> bool {
        self.honey_pot.unwrap_or(false)
    }

    pub fn volume_usd(&self) -> f64 {
        parse_numeric(&self.volume)
    }

    /// Pair creation time; `None` when the `age` field does not parse.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.age.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Rows in first-seen order with a pair-address index. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    rows: Vec<ScannerRow>,
    index: HashMap<String, usize>,
}

impl RowSet {
    /// Builds a set keeping the first occurrence of every pair address.
    pub fn from_rows(rows: impl IntoIterator<Item = ScannerRow>) -> Self {
        let mut set = Self::default();
        for row in rows {
            if set.index.contains_key(&row.pair_address) {
                continue;
            }
            set.index.insert(row.pair_address.clone(), set.rows.len());
            set.rows.push(row);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, pair_address: &str) -> bool {
        self.index.contains_key(pair_address)
    }

    pub fn get(&self, pair_address: &str) -> Option<&ScannerRow> {
        self.index.get(pair_address).map(|&idx| &self.rows[idx])
    }

    pub fn get_mut(&mut self, pair_address: &str) -> Option<&mut ScannerRow> {
        let idx = *self.index.get(pair_address)?;
        self.rows.get_mut(idx)
    }

    pub fn first(&self) -> Option<&ScannerRow> {
        self.rows.first()
    }

    pub fn rows(&self) -> &[ScannerRow] {
        &self.rows
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.pair_address.as_str())
    }

    pub fn into_rows(self) -> Vec<ScannerRow> {
        self.rows
    }
}

/// Parses a numeric wire string; anything unparsable or non-finite is 0.
pub fn parse_numeric(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

pub fn format_decimal(value: f64) -> String {
    if value.is_finite() {
        format!("{value}")
    } else {
        "0".to_string()
    }
}

/// Market cap by priority: current, price x supply, then the initial/pair
/// fallbacks (first non-zero wins), else `"0"`.
pub fn effective_market_cap(row: &ScannerRow) -> String {
    if parse_numeric(&row.current_mcap) > 0.0 {
        return row.current_mcap.clone();
    }

    let price = parse_numeric(&row.price);
    let supply = parse_numeric(&row.token1_total_supply_formatted);
    if price > 0.0 && supply > 0.0 {
        return format_decimal(price * supply);
    }

    [
        &row.initial_mcap,
        &row.pair_mcap_usd,
        &row.pair_mcap_usd_initial,
    ]
    .into_iter()
    .find(|candidate| parse_numeric(candidate) > 0.0)
    .cloned()
    .unwrap_or_else(|| "0".to_string())
}

pub fn normalize(row: &ScannerRow) -> ScannerRow {
    let mut out = row.clone();
    out.current_mcap = effective_market_cap(row);
    out
}

pub fn normalize_rows(rows: Vec<ScannerRow>) -> Vec<ScannerRow> {
    rows.into_iter()
        .map(|mut row| {
            row.current_mcap = effective_market_cap(&row);
            row
        })
        .collect()
}

pub(crate) fn de_numeric_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => text,
        Some(serde_json::Value::Number(number)) => number.to_string(),
        _ => String::new(),
    })
}

fn de_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        Some(serde_json::Value::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pair: &str) -> ScannerRow {
        ScannerRow::with_pair(pair)
    }

    #[test]
    fn market_cap_from_price_and_supply_when_current_is_zero() {
        let mut r = row("A");
        r.current_mcap = "0".to_string();
        r.price = "2".to_string();
        r.token1_total_supply_formatted = "100".to_string();

        assert_eq!(effective_market_cap(&r), "200");
    }

    #[test]
    fn market_cap_is_zero_when_nothing_is_known() {
        let mut r = row("A");
        r.current_mcap = "0".to_string();
        r.initial_mcap = "0".to_string();
        r.pair_mcap_usd = "0".to_string();
        r.pair_mcap_usd_initial = "0".to_string();

        assert_eq!(effective_market_cap(&r), "0");
    }

    #[test]
    fn market_cap_prefers_current_then_first_nonzero_fallback() {
        let mut r = row("A");
        r.current_mcap = "5000".to_string();
        r.price = "2".to_string();
        r.token1_total_supply_formatted = "100".to_string();
        assert_eq!(effective_market_cap(&r), "5000");

        let mut r = row("B");
        r.initial_mcap = "0".to_string();
        r.pair_mcap_usd = "abc".to_string();
        r.pair_mcap_usd_initial = "750.5".to_string();
        assert_eq!(effective_market_cap(&r), "750.5");
    }

    #[test]
    fn normalize_does_not_touch_the_input() {
        let mut r = row("A");
        r.price = "0.5".to_string();
        r.token1_total_supply_formatted = "10".to_string();

        let normalized = normalize(&r);
        assert_eq!(normalized.current_mcap, "5");
        assert_eq!(r.current_mcap, "");
    }

    #[test]
    fn unparsable_numbers_are_zero() {
        assert_eq!(parse_numeric(""), 0.0);
        assert_eq!(parse_numeric("n/a"), 0.0);
        assert_eq!(parse_numeric("NaN"), 0.0);
        assert_eq!(parse_numeric(" 12.5 "), 12.5);
    }

    #[test]
    fn decodes_numbers_and_strings_leniently() {
        let raw = r#"{
            "pairAddress": "0xabc",
            "chainId": 1,
            "price": 0.25,
            "volume": "1200",
            "diff5M": -3.5,
            "txns": 40,
            "buys": "25",
            "sells": null,
            "honeyPot": false
        }"#;

        let parsed: ScannerRow = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.price, "0.25");
        assert_eq!(parsed.volume, "1200");
        assert_eq!(parsed.diff_5m, "-3.5");
        assert_eq!(parsed.txns, Some(40));
        assert_eq!(parsed.buys, Some(25));
        assert_eq!(parsed.sells, None);
        assert_eq!(parsed.chain(), Ok(Chain::Eth));
        assert!(!parsed.is_honeypot());
    }

    #[test]
    fn row_set_keeps_first_occurrence_of_each_key() {
        let mut dup = row("A");
        dup.price = "9".to_string();
        let set = RowSet::from_rows(vec![row("A"), row("B"), dup]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(set.get("A").unwrap().price, "");
    }

    #[test]
    fn created_at_accepts_rfc3339_and_naive_timestamps() {
        let mut r = row("A");
        r.age = "2025-01-01T00:00:00Z".to_string();
        assert_eq!(r.created_at().unwrap().timestamp(), 1_735_689_600);

        r.age = "2025-01-01T00:00:00.000".to_string();
        assert_eq!(r.created_at().unwrap().timestamp(), 1_735_689_600);

        r.age = "yesterday".to_string();
        assert!(r.created_at().is_none());
    }
}
