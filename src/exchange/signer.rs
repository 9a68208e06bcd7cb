//! HMAC-SHA256 request signing for authenticated endpoints

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Append `timestamp` and `signature` to `query`.
///
/// The signed payload is `query&timestamp=<ms>` (just `timestamp=<ms>` for
/// an empty query). The signature is the lowercase hex HMAC-SHA256 of that
/// payload under `secret`.
pub fn sign(secret: &str, query: &str, timestamp_ms: i64) -> String {
    let payload = if query.is_empty() {
        format!("timestamp={}", timestamp_ms)
    } else {
        format!("{}&timestamp={}", query, timestamp_ms)
    };

    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key of any size"));
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    format!("{}&signature={}", payload, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign("secret", "symbol=BTCUSDT", 1_700_000_000_000);
        let b = sign("secret", "symbol=BTCUSDT", 1_700_000_000_000);
        assert_eq!(a, b);
        assert!(a.starts_with("symbol=BTCUSDT&timestamp=1700000000000&signature="));

        let c = sign("other", "symbol=BTCUSDT", 1_700_000_000_000);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_query_has_no_leading_separator() {
        let signed = sign("secret", "", 5);
        assert!(signed.starts_with("timestamp=5&signature="));
        let hex_part = signed.rsplit('=').next().unwrap();
        assert_eq!(hex_part.len(), 64);
    }

    #[test]
    fn test_known_vector() {
        // Reference example from the Binance API documentation
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000";
        let signed = sign(secret, query, 1_499_827_319_559);
        assert!(signed.ends_with(
            "signature=c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        ));
    }
}
