//! Query profiles: the two independent scanner tables and their REST query.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Trending,
    New,
}

pub const ALL_PROFILES: [ProfileKind; 2] = [ProfileKind::Trending, ProfileKind::New];

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::New => "new",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown profile: {0}")]
pub struct UnknownProfile(pub String);

pub fn parse_profile(input: &str) -> Result<ProfileKind, UnknownProfile> {
    match input.trim().to_ascii_lowercase().as_str() {
        "trending" => Ok(ProfileKind::Trending),
        "new" => Ok(ProfileKind::New),
        other => Err(UnknownProfile(other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankBy {
    Volume,
    Age,
    Price,
    Liquidity,
    Txns,
}

impl RankBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Age => "age",
            Self::Price => "price",
            Self::Liquidity => "liquidity",
            Self::Txns => "txns",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    Asc,
    Desc,
}

impl OrderBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Columns the table can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    Token,
    Price,
    Age,
    Volume,
    Txns,
    MarketCap,
    Liquidity,
    Diff5m,
    Diff1h,
    Diff6h,
    Diff24h,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub column: SortColumn,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryProfile {
    pub kind: ProfileKind,
    pub rank_by: RankBy,
    pub order_by: OrderBy,
    pub min_vol_24h: Option<f64>,
    pub max_age_secs: Option<u64>,
    pub is_not_hp: bool,
    pub default_sort: Option<SortState>,
}

impl QueryProfile {
    pub fn trending() -> Self {
        Self {
            kind: ProfileKind::Trending,
            rank_by: RankBy::Volume,
            order_by: OrderBy::Desc,
            min_vol_24h: Some(1_000.0),
            max_age_secs: Some(7 * 24 * 60 * 60),
            is_not_hp: true,
            default_sort: Some(SortState {
                column: SortColumn::Volume,
                desc: true,
            }),
        }
    }

    pub fn new_pairs() -> Self {
        Self {
            kind: ProfileKind::New,
            rank_by: RankBy::Age,
            order_by: OrderBy::Desc,
            min_vol_24h: None,
            max_age_secs: Some(24 * 60 * 60),
            is_not_hp: true,
            default_sort: None,
        }
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Trending => Self::trending(),
            ProfileKind::New => Self::new_pairs(),
        }
    }

    /// Query parameters for one scanner page; `page` is 1-based.
    pub fn query_pairs(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("rankBy", self.rank_by.as_str().to_string()),
            ("orderBy", self.order_by.as_str().to_string()),
        ];
        if let Some(min_vol) = self.min_vol_24h {
            out.push(("minVol24H", format!("{min_vol}")));
        }
        out.push(("isNotHP", self.is_not_hp.to_string()));
        if let Some(max_age) = self.max_age_secs {
            out.push(("maxAge", max_age.to_string()));
        }
        out.push(("page", page.to_string()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_query_mirrors_profile_defaults() {
        let pairs = QueryProfile::trending().query_pairs(3);
        assert_eq!(
            pairs,
            vec![
                ("rankBy", "volume".to_string()),
                ("orderBy", "desc".to_string()),
                ("minVol24H", "1000".to_string()),
                ("isNotHP", "true".to_string()),
                ("maxAge", "604800".to_string()),
                ("page", "3".to_string()),
            ]
        );
    }

    #[test]
    fn new_profile_has_no_volume_floor_or_default_sort() {
        let profile = QueryProfile::new_pairs();
        let pairs = profile.query_pairs(1);
        assert!(pairs.iter().all(|(key, _)| *key != "minVol24H"));
        assert!(pairs.contains(&("maxAge", "86400".to_string())));
        assert!(profile.default_sort.is_none());
    }

    #[test]
    fn profile_names_parse() {
        assert_eq!(parse_profile("Trending"), Ok(ProfileKind::Trending));
        assert_eq!(parse_profile("new"), Ok(ProfileKind::New));
        assert!(parse_profile("hot").is_err());
    }
}
