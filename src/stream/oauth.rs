//! OAuth 1.0a request signing
//!
//! The streaming endpoint authenticates user-context requests with an
//! HMAC-SHA1 signature over the method, URL and all request parameters.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngCore;
use sha1::Sha1;

use crate::credentials::Credentials;
use crate::failure::SessionFailure;

/// Everything except the RFC 3986 unreserved characters
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

type HmacSha1 = Hmac<Sha1>;

pub struct OAuthSigner {
    credentials: Credentials,
}

impl OAuthSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build the `Authorization` header value for a request
    ///
    /// `params` are the form or query parameters sent with the request.
    pub fn authorization(&self, method: &str, url: &str, params: &[(String, String)]) -> Result<String, SessionFailure> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_with(method, url, params, &generate_nonce(), &timestamp)
    }

    fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, SessionFailure> {
        let mut oauth_params = vec![
            ("oauth_consumer_key".to_string(), self.credentials.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_token".to_string(), self.credentials.access_token.clone()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        let mut encoded: Vec<(String, String)> = oauth_params
            .iter()
            .chain(params.iter())
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            percent_encode(url),
            percent_encode(&param_string)
        );
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.credentials.consumer_secret),
            percent_encode(&self.credentials.access_secret)
        );

        oauth_params.push(("oauth_signature".to_string(), hmac_sha1(&signing_key, &base_string)?));

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }
}

/// Percent-encode per RFC 3986, as OAuth requires
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// `application/x-www-form-urlencoded` body using the same encoding the signature covers
pub fn form_body(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hmac_sha1(key: &str, data: &str) -> Result<String, SessionFailure> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| SessionFailure::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
