//! Per-request HMAC signing: a canonical string over host, timestamp, and
//! request line, signed with HMAC-SHA256 and packed into a single
//! authorization header value. A fresh signature is computed per call;
//! nothing is cached.

use crate::providers::ProviderError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a signature stays valid after its timestamp.
const SIGNATURE_TTL_SECS: i64 = 3600;

/// Signs requests on behalf of one adapter.
///
/// Credentials may be absent at construction; a missing field is a
/// configuration error raised on the first signing attempt, so a
/// partially-configured adapter can still be registered.
#[derive(Debug, Clone, Default)]
pub struct RequestSigner {
    app_id: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
}

/// Output of one signing operation.
#[derive(Debug, Clone)]
pub struct SignedAuth {
    /// Value for the `Authorization` header.
    pub authorization: String,
    /// Application id sent alongside the signature.
    pub app_id: String,
}

impl RequestSigner {
    pub fn new(
        app_id: Option<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        Self { app_id, api_key, api_secret }
    }

    fn canonical_string(host: &str, timestamp: i64, method: &str, path: &str) -> String {
        format!("host: {host}\ndate: {timestamp}\n{method} {path} HTTP/1.1")
    }

    /// Sign one request at `now`.
    pub fn sign(
        &self,
        provider: &str,
        endpoint: &Url,
        method: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedAuth, ProviderError> {
        let (app_id, api_key, api_secret) =
            match (&self.app_id, &self.api_key, &self.api_secret) {
                (Some(a), Some(k), Some(s)) => (a, k, s),
                _ => {
                    return Err(ProviderError::Configuration {
                        provider: provider.to_string(),
                        message: "request signing requires app id, api key and api secret".into(),
                    });
                }
            };
        let host = endpoint.host_str().ok_or_else(|| ProviderError::Configuration {
            provider: provider.to_string(),
            message: format!("endpoint URL has no host: {endpoint}"),
        })?;

        let timestamp = now.timestamp();
        let canonical = Self::canonical_string(host, timestamp, method, endpoint.path());

        let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes()).map_err(|_| {
            ProviderError::Configuration {
                provider: provider.to_string(),
                message: "api secret is not usable as an HMAC key".into(),
            }
        })?;
        mac.update(canonical.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let expire_time = timestamp + SIGNATURE_TTL_SECS;
        let authorization = format!(
            "api_key=\"{api_key}\", algorithm=\"hmac-sha256\", \
             headers=\"host date request-line\", signature=\"{signature}\", \
             date=\"{timestamp}\", expire_time=\"{expire_time}\""
        );

        Ok(SignedAuth { authorization, app_id: app_id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> RequestSigner {
        RequestSigner::new(
            Some("app-1".into()),
            Some("key-1".into()),
            Some("secret-1".into()),
        )
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn canonical_string_layout() {
        let s = RequestSigner::canonical_string("api.example.com", 1_700_000_000, "POST", "/v3.5");
        assert_eq!(s, "host: api.example.com\ndate: 1700000000\nPOST /v3.5 HTTP/1.1");
    }

    #[test]
    fn signing_is_deterministic_for_fixed_inputs() {
        let url = Url::parse("https://spark-api.xf-yun.com/v3.5").unwrap();
        let a = signer().sign("spark", &url, "POST", fixed_now()).unwrap();
        let b = signer().sign("spark", &url, "POST", fixed_now()).unwrap();
        assert_eq!(a.authorization, b.authorization);
        assert_eq!(a.app_id, "app-1");
    }

    #[test]
    fn signature_changes_with_timestamp() {
        let url = Url::parse("https://spark-api.xf-yun.com/v3.5").unwrap();
        let a = signer().sign("spark", &url, "POST", fixed_now()).unwrap();
        let later = fixed_now() + chrono::Duration::seconds(1);
        let b = signer().sign("spark", &url, "POST", later).unwrap();
        assert_ne!(a.authorization, b.authorization);
    }

    #[test]
    fn header_value_carries_metadata() {
        let url = Url::parse("https://spark-api.xf-yun.com/v3.5").unwrap();
        let auth = signer().sign("spark", &url, "POST", fixed_now()).unwrap().authorization;
        assert!(auth.contains("api_key=\"key-1\""));
        assert!(auth.contains("algorithm=\"hmac-sha256\""));
        assert!(auth.contains("headers=\"host date request-line\""));
        let ts = fixed_now().timestamp();
        assert!(auth.contains(&format!("date=\"{ts}\"")));
        assert!(auth.contains(&format!("expire_time=\"{}\"", ts + 3600)));
    }

    #[test]
    fn missing_credentials_are_a_configuration_error() {
        let url = Url::parse("https://spark-api.xf-yun.com/v3.5").unwrap();
        let partial = RequestSigner::new(Some("app-1".into()), Some("key-1".into()), None);
        let err = partial.sign("spark", &url, "POST", fixed_now()).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
        assert!(err.to_string().starts_with("spark:"));
    }
}
