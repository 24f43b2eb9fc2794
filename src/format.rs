//! Display formatting for table cells.

use chrono::{DateTime, Utc};

use crate::row::ScannerRow;

fn parse_opt(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| !value.is_nan())
}

/// `$`-prefixed price with precision scaled to magnitude. Hex-looking values
/// are passed through untouched.
pub fn format_price(raw: &str) -> String {
    if raw.starts_with("0x") {
        return raw.to_string();
    }
    let Some(price) = parse_opt(raw) else {
        return "N/A".to_string();
    };

    if price == 0.0 {
        "$0.00".to_string()
    } else if price < 0.000_001 {
        format!("${price:.2e}")
    } else if price < 0.01 {
        format!("${price:.6}")
    } else if price < 1.0 {
        format!("${price:.4}")
    } else {
        format!("${price:.2}")
    }
}

pub fn format_large_number(value: f64, prefix: &str) -> String {
    if value.is_nan() || value == 0.0 {
        return "N/A".to_string();
    }
    if value >= 1e9 {
        format!("{prefix}{:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{prefix}{:.2}M", value / 1e6)
    } else if value >= 1e3 {
        format!("{prefix}{:.2}K", value / 1e3)
    } else {
        format!("{prefix}{value:.2}")
    }
}

pub fn format_large_str(raw: &str, prefix: &str) -> String {
    match parse_opt(raw) {
        Some(value) => format_large_number(value, prefix),
        None => "N/A".to_string(),
    }
}

pub fn format_count(count: Option<u64>) -> String {
    match count {
        Some(count) => format_large_number(count as f64, ""),
        None => "N/A".to_string(),
    }
}

/// Elapsed time since creation as `Nm`, `Nh` or `Nd`.
pub fn format_age(row: &ScannerRow, now: DateTime<Utc>) -> String {
    let Some(created) = row.created_at() else {
        return "N/A".to_string();
    };
    let elapsed_minutes = (now - created).num_minutes().max(0);
    let hours = elapsed_minutes / 60;

    if hours < 1 {
        format!("{}m", elapsed_minutes % 60)
    } else if hours < 24 {
        format!("{hours}h")
    } else {
        format!("{}d", hours / 24)
    }
}

pub fn format_delta(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "0%".to_string();
    }
    match parse_opt(trimmed) {
        Some(value) if value == 0.0 => "0%".to_string(),
        Some(value) if value > 0.0 => format!("+{trimmed}%"),
        _ => format!("{trimmed}%"),
    }
}

pub fn format_tax(buy_fee: &str, sell_fee: &str) -> String {
    if buy_fee.is_empty() || sell_fee.is_empty() {
        return "N/A".to_string();
    }
    format!("{buy_fee}%/{sell_fee}%")
}

/// Buy and sell shares of all transactions, in percent. `None` unless all
/// three counts are positive.
pub fn txn_ratio(row: &ScannerRow) -> Option<(f64, f64)> {
    let txns = row.txns.filter(|count| *count > 0)?;
    let buys = row.buys.filter(|count| *count > 0)?;
    let sells = row.sells.filter(|count| *count > 0)?;
    let total = txns as f64;
    Some((buys as f64 / total * 100.0, sells as f64 / total * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn price_precision_tracks_magnitude() {
        assert_eq!(format_price(""), "N/A");
        assert_eq!(format_price("0"), "$0.00");
        assert_eq!(format_price("0.0000001234"), "$1.23e-7");
        assert_eq!(format_price("0.001234567"), "$0.001235");
        assert_eq!(format_price("0.5"), "$0.5000");
        assert_eq!(format_price("1234.5"), "$1234.50");
        assert_eq!(format_price("0xdeadbeef"), "0xdeadbeef");
    }

    #[test]
    fn large_numbers_get_suffixes() {
        assert_eq!(format_large_str("2500000000", "$"), "$2.50B");
        assert_eq!(format_large_str("1500000", "$"), "$1.50M");
        assert_eq!(format_large_str("1200", ""), "1.20K");
        assert_eq!(format_large_str("12", ""), "12.00");
        assert_eq!(format_large_str("0", "$"), "N/A");
        assert_eq!(format_large_str("junk", "$"), "N/A");
        assert_eq!(format_count(None), "N/A");
        assert_eq!(format_count(Some(4_000)), "4.00K");
    }

    #[test]
    fn age_buckets() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let mut row = ScannerRow::with_pair("A");

        row.age = "2025-01-10T11:35:00Z".to_string();
        assert_eq!(format_age(&row, now), "25m");
        row.age = "2025-01-10T02:00:00Z".to_string();
        assert_eq!(format_age(&row, now), "10h");
        row.age = "2025-01-07T12:00:00Z".to_string();
        assert_eq!(format_age(&row, now), "3d");
        row.age = "".to_string();
        assert_eq!(format_age(&row, now), "N/A");
    }

    #[test]
    fn deltas_and_tax() {
        assert_eq!(format_delta(""), "0%");
        assert_eq!(format_delta("0"), "0%");
        assert_eq!(format_delta("4.2"), "+4.2%");
        assert_eq!(format_delta("-1.5"), "-1.5%");
        assert_eq!(format_tax("3", "5"), "3%/5%");
        assert_eq!(format_tax("", "5"), "N/A");
    }

    #[test]
    fn ratio_needs_all_counts() {
        let mut row = ScannerRow::with_pair("A");
        row.txns = Some(200);
        row.buys = Some(150);
        row.sells = Some(50);
        assert_eq!(txn_ratio(&row), Some((75.0, 25.0)));

        row.sells = Some(0);
        assert_eq!(txn_ratio(&row), None);
    }
}
