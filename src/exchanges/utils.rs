//! Symbol helpers shared by leg executors and the feed.

/// Quote currencies recognized when splitting a concatenated symbol.
const QUOTES: [&str; 3] = ["USDT", "USDC", "USD"];

/// Converts "BIDUSDT" to "BID_USDT".
pub fn to_underscore_symbol(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    if upper.contains('_') {
        return upper;
    }
    for quote in QUOTES {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}_{}", base, quote);
            }
        }
    }
    upper
}

/// Converts "BID_USDT" to "BIDUSDT".
pub fn to_concatenated_symbol(symbol: &str) -> String {
    symbol.replace('_', "").to_uppercase()
}

/// Returns the contract symbol in the notation the venue uses.
pub fn venue_symbol(venue: &str, symbol: &str) -> String {
    match venue.to_lowercase().as_str() {
        "gate" | "gateio" | "gate.io" => to_underscore_symbol(symbol),
        _ => to_concatenated_symbol(symbol),
    }
}
