//! Closed set of chains the scanner lists pairs for.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Chain {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "SOL")]
    Sol,
    #[serde(rename = "BASE")]
    Base,
    #[serde(rename = "BSC")]
    Bsc,
}

pub const ALL_CHAINS: [Chain; 4] = [Chain::Eth, Chain::Sol, Chain::Base, Chain::Bsc];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("unknown chain id: {0}")]
    UnknownChainId(u64),
}

impl Chain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Sol => "SOL",
            Self::Base => "BASE",
            Self::Bsc => "BSC",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Eth => "Ethereum",
            Self::Sol => "Solana",
            Self::Base => "Base",
            Self::Bsc => "BSC",
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            Self::Eth => 1,
            Self::Bsc => 56,
            Self::Sol => 900,
            Self::Base => 8453,
        }
    }
}

pub fn chain_from_id(chain_id: u64) -> Result<Chain, ChainError> {
    match chain_id {
        1 => Ok(Chain::Eth),
        56 => Ok(Chain::Bsc),
        900 => Ok(Chain::Sol),
        8453 => Ok(Chain::Base),
        other => Err(ChainError::UnknownChainId(other)),
    }
}

pub fn parse_chain(input: &str) -> Result<Chain, ChainError> {
    match input.trim().to_ascii_uppercase().as_str() {
        "ETH" => Ok(Chain::Eth),
        "SOL" => Ok(Chain::Sol),
        "BASE" => Ok(Chain::Base),
        "BSC" => Ok(Chain::Bsc),
        _ => Err(ChainError::UnsupportedChain(input.to_string())),
    }
}
