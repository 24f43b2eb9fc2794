//! Wire codec for the market-data stream.
//!
//! Outbound frames are built from [`OutboundMessage`]. Inbound frames are
//! decoded at the boundary into the closed [`InboundEvent`] set; anything else
//! is rejected with a [`StreamDecodeError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::chain::Chain;
use crate::profile::RankBy;
use crate::row::{de_numeric_string, ScannerRow};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionTarget {
    pub pair: String,
    pub token: String,
    pub chain: Chain,
}

impl SubscriptionTarget {
    pub fn pair_key(&self) -> String {
        format!("pair-{}-{}", self.pair, self.token)
    }

    pub fn pair_stats_key(&self) -> String {
        format!("pair-stats-{}-{}", self.pair, self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerFilterParams {
    #[serde(rename = "rankBy")]
    pub rank_by: RankBy,
    pub chain: Chain,
    #[serde(rename = "isNotHP")]
    pub is_not_hp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundMessage {
    #[serde(rename = "subscribe-pair")]
    SubscribePair(SubscriptionTarget),
    #[serde(rename = "unsubscribe-pair")]
    UnsubscribePair(SubscriptionTarget),
    #[serde(rename = "subscribe-pair-stats")]
    SubscribePairStats(SubscriptionTarget),
    #[serde(rename = "unsubscribe-pair-stats")]
    UnsubscribePairStats(SubscriptionTarget),
    #[serde(rename = "scanner-filter")]
    ScannerFilter(ScannerFilterParams),
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SubscribePair(_) => "subscribe-pair",
            Self::UnsubscribePair(_) => "unsubscribe-pair",
            Self::SubscribePairStats(_) => "subscribe-pair-stats",
            Self::UnsubscribePairStats(_) => "unsubscribe-pair-stats",
            Self::ScannerFilter(_) => "scanner-filter",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    #[serde(default, deserialize_with = "de_flag")]
    pub is_outlier: bool,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub price_token1_usd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickPair {
    pub pair: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickPayload {
    pub pair: TickPair,
    #[serde(default)]
    pub swaps: Vec<Swap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairStats {
    pub pair_address: String,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_verified: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub mint_authority_renounced: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub freeze_authority_renounced: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub token1_is_honeypot: bool,
    #[serde(default, deserialize_with = "de_numeric_string")]
    pub burned_supply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PairStatsPayload {
    pub pair: PairStats,
}

/// Optional filter echo on a snapshot, used to route it to matching tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFilter {
    #[serde(default)]
    pub rank_by: Option<RankBy>,
    #[serde(default)]
    pub chain: Option<Chain>,
}

impl SnapshotFilter {
    pub fn matches(&self, params: &ScannerFilterParams) -> bool {
        self.rank_by.map_or(true, |rank| rank == params.rank_by)
            && self.chain.map_or(true, |chain| chain == params.chain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScannerPairsResults {
    #[serde(default)]
    pub pairs: Vec<ScannerRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScannerPairsPayload {
    #[serde(default)]
    pub filter: Option<SnapshotFilter>,
    pub results: ScannerPairsResults,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Tick(TickPayload),
    PairStats(PairStatsPayload),
    ScannerPairs(ScannerPairsPayload),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_) => "tick",
            Self::PairStats(_) => "pair-stats",
            Self::ScannerPairs(_) => "scanner-pairs",
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamDecodeError {
    #[error("malformed stream frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown stream event: {0}")]
    UnknownEvent(String),
    #[error("invalid {event} payload: {message}")]
    InvalidPayload { event: &'static str, message: String },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub fn decode_inbound(text: &str) -> Result<InboundEvent, StreamDecodeError> {
    let frame: RawFrame = serde_json::from_str(text)?;

    let event = match frame.event.as_str() {
        "tick" => InboundEvent::Tick(decode_payload("tick", frame.data)?),
        "pair-stats" => InboundEvent::PairStats(decode_payload("pair-stats", frame.data)?),
        "scanner-pairs" => {
            InboundEvent::ScannerPairs(decode_payload("scanner-pairs", frame.data)?)
        }
        other => return Err(StreamDecodeError::UnknownEvent(other.to_string())),
    };

    validate(&event)?;
    Ok(event)
}

fn decode_payload<T: DeserializeOwned>(
    event: &'static str,
    data: serde_json::Value,
) -> Result<T, StreamDecodeError> {
    serde_json::from_value(data).map_err(|err| StreamDecodeError::InvalidPayload {
        event,
        message: err.to_string(),
    })
}

fn validate(event: &InboundEvent) -> Result<(), StreamDecodeError> {
    let missing_key = match event {
        InboundEvent::Tick(tick) => tick.pair.pair.trim().is_empty(),
        InboundEvent::PairStats(stats) => stats.pair.pair_address.trim().is_empty(),
        InboundEvent::ScannerPairs(snapshot) => snapshot
            .results
            .pairs
            .iter()
            .any(|row| row.pair_address.trim().is_empty()),
    };

    if missing_key {
        return Err(StreamDecodeError::InvalidPayload {
            event: event.kind(),
            message: "empty pair address".to_string(),
        });
    }
    Ok(())
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SubscriptionTarget {
        SubscriptionTarget {
            pair: "0xpair".to_string(),
            token: "0xtoken".to_string(),
            chain: Chain::Eth,
        }
    }

    #[test]
    fn outbound_subscribe_frame_shape() {
        let text = OutboundMessage::SubscribePairStats(target()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["event"], "subscribe-pair-stats");
        assert_eq!(value["data"]["pair"], "0xpair");
        assert_eq!(value["data"]["token"], "0xtoken");
        assert_eq!(value["data"]["chain"], "ETH");
    }

    #[test]
    fn outbound_scanner_filter_frame_shape() {
        let text = OutboundMessage::ScannerFilter(ScannerFilterParams {
            rank_by: RankBy::Volume,
            chain: Chain::Sol,
            is_not_hp: true,
        })
        .encode()
        .unwrap();

        assert_eq!(
            text,
            r#"{"event":"scanner-filter","data":{"rankBy":"volume","chain":"SOL","isNotHP":true}}"#
        );
    }

    #[test]
    fn subscription_keys_are_namespaced() {
        assert_eq!(target().pair_key(), "pair-0xpair-0xtoken");
        assert_eq!(target().pair_stats_key(), "pair-stats-0xpair-0xtoken");
    }

    #[test]
    fn decodes_tick() {
        let event = decode_inbound(
            r#"{"event":"tick","data":{"pair":{"pair":"A"},"swaps":[
                {"isOutlier":false,"priceToken1Usd":"1.5"},
                {"isOutlier":true,"priceToken1Usd":99}
            ]}}"#,
        )
        .unwrap();

        let InboundEvent::Tick(tick) = event else {
            panic!("expected tick");
        };
        assert_eq!(tick.pair.pair, "A");
        assert_eq!(tick.swaps.len(), 2);
        assert_eq!(tick.swaps[1].price_token1_usd, "99");
    }

    #[test]
    fn decodes_pair_stats_with_null_flags() {
        let event = decode_inbound(
            r#"{"event":"pair-stats","data":{"pair":{"pairAddress":"A","isVerified":true,
                "mintAuthorityRenounced":null,"freezeAuthorityRenounced":true,
                "token1IsHoneypot":false,"burnedSupply":"12"}}}"#,
        )
        .unwrap();

        let InboundEvent::PairStats(stats) = event else {
            panic!("expected pair-stats");
        };
        assert!(stats.pair.is_verified);
        assert!(!stats.pair.mint_authority_renounced);
        assert_eq!(stats.pair.burned_supply, "12");
    }

    #[test]
    fn decodes_scanner_pairs_with_optional_filter() {
        let event = decode_inbound(
            r#"{"event":"scanner-pairs","data":{"filter":{"rankBy":"volume","chain":"ETH"},
                "results":{"pairs":[{"pairAddress":"A"},{"pairAddress":"B"}]}}}"#,
        )
        .unwrap();

        let InboundEvent::ScannerPairs(snapshot) = event else {
            panic!("expected scanner-pairs");
        };
        assert_eq!(snapshot.results.pairs.len(), 2);
        let filter = snapshot.filter.unwrap();
        assert!(filter.matches(&ScannerFilterParams {
            rank_by: RankBy::Volume,
            chain: Chain::Eth,
            is_not_hp: true,
        }));
        assert!(!filter.matches(&ScannerFilterParams {
            rank_by: RankBy::Volume,
            chain: Chain::Bsc,
            is_not_hp: true,
        }));
    }

    #[test]
    fn rejects_malformed_unknown_and_keyless_frames() {
        assert!(matches!(
            decode_inbound("{not json"),
            Err(StreamDecodeError::Json(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"event":"heartbeat","data":{}}"#),
            Err(StreamDecodeError::UnknownEvent(name)) if name == "heartbeat"
        ));
        assert!(matches!(
            decode_inbound(r#"{"event":"tick","data":{"swaps":[]}}"#),
            Err(StreamDecodeError::InvalidPayload { event: "tick", .. })
        ));
        assert!(matches!(
            decode_inbound(r#"{"event":"tick","data":{"pair":{"pair":" "}}}"#),
            Err(StreamDecodeError::InvalidPayload { event: "tick", .. })
        ));
    }
}
