#![cfg(feature = "live-scanner-tests")]

use pairscan::{
    normalize_rows, QueryProfile, ReqwestScannerApi, ScannerApi, DEFAULT_API_BASE_URL,
    DEFAULT_HTTP_TIMEOUT_MS,
};

fn live_api() -> ReqwestScannerApi {
    let base_url =
        std::env::var("SCANNER_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    ReqwestScannerApi::new(base_url, DEFAULT_HTTP_TIMEOUT_MS)
        .expect("blocking client should build")
}

#[test]
fn live_scanner_serves_first_page_of_both_profiles() {
    let api = live_api();

    for profile in [QueryProfile::trending(), QueryProfile::new_pairs()] {
        let page = api
            .fetch_page(&profile, 1)
            .unwrap_or_else(|err| panic!("{:?} page 1 should load: {err}", profile.kind));

        assert_eq!(page.page_index, 1);
        assert!(!page.pairs.is_empty(), "{:?} returned no pairs", profile.kind);
        assert!(page.total_rows >= page.pairs.len() as u64);

        let rows = normalize_rows(page.pairs);
        assert!(rows.iter().all(|row| !row.pair_address.is_empty()));
    }
}

#[test]
fn live_scanner_second_page_does_not_repeat_the_first() {
    let api = live_api();
    let profile = QueryProfile::trending();

    let first = api.fetch_page(&profile, 1).expect("page 1 should load");
    if first.total_rows <= first.pairs.len() as u64 {
        return;
    }
    let second = api.fetch_page(&profile, 2).expect("page 2 should load");
    assert!(!second.pairs.is_empty());

    let overlap = second
        .pairs
        .iter()
        .filter(|row| first.pairs.iter().any(|seen| seen.pair_address == row.pair_address))
        .count();
    assert!(overlap < second.pairs.len(), "page 2 repeated page 1 entirely");
}
