//! Request signing for Binance signed endpoints.
//!
//! Signed endpoints take an HMAC-SHA256 of the full query string, keyed by the
//! API secret and hex encoded, appended as the `signature` parameter.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use crate::error::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex HMAC-SHA256 signature of a query string.
pub fn sign_query(secret: &str, query: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Rejected(format!("invalid API secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Encode parameters into a query string, preserving order.
pub fn encode_query(params: &[(&str, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Build a signed query: the given parameters plus `recvWindow`, `timestamp`
/// and the trailing `signature`.
pub fn signed_query(
    secret: &str,
    params: &[(&str, String)],
    recv_window_ms: u64,
    timestamp_ms: i64,
) -> Result<String, ExchangeError> {
    let mut all = params.to_vec();
    all.push(("recvWindow", recv_window_ms.to_string()));
    all.push(("timestamp", timestamp_ms.to_string()));

    let query = encode_query(&all);
    let signature = sign_query(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}
