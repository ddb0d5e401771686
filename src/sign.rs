//! Header-based HMAC-SHA256 request signing.
//!
//! The scheme canonicalizes the request (method, path, sorted query,
//! sorted lowercased headers, body digest), binds it to a credential
//! scope of `date/region/service`, and attaches an `authorization`
//! header. Signing is a pure function of its inputs: for a fixed
//! timestamp, two calls produce byte-identical results.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credential::Credentials;
use crate::error::{Result, SdkError};
use crate::transport::HttpRequestSpec;

type HmacSha256 = Hmac<Sha256>;

/// Scheme identifier in the authorization header and string-to-sign.
const SCHEME: &str = "SDK4-HMAC-SHA256";

/// Terminator of the credential scope and signing-key chain.
const SCOPE_TERMINATOR: &str = "sdk_request";

/// Percent-encodes a string per RFC 3986.
///
/// Unreserved characters (A-Z, a-z, 0-9, '-', '.', '_', '~') are NOT encoded.
/// All other characters are encoded as `%XX` (uppercase hex).
/// Spaces become `%20` (NOT `+`).
pub(crate) fn percent_encode(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len() * 2);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SdkError::Credential(format!("HMAC key error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Signs `request` in place with the given credentials and scope.
///
/// Attaches `x-sdk-date`, `x-sdk-security-token` (for temporary
/// credentials), and `authorization` headers. The date and token headers
/// are set before canonicalization so they are covered by the signature.
///
/// Fails only on structurally invalid credentials (empty access key or
/// secret).
pub fn sign(
    request: &mut HttpRequestSpec,
    credentials: &Credentials,
    service: &str,
    region: &str,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    if credentials.access_key.is_empty() || credentials.secret_key.is_empty() {
        return Err(SdkError::Credential(
            "cannot sign with empty access key or secret".into(),
        ));
    }

    let datetime = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = timestamp.format("%Y%m%d").to_string();

    request.set_header("x-sdk-date", datetime.clone());
    if let Some(token) = &credentials.session_token {
        request.set_header("x-sdk-security-token", token.clone());
    }

    // Canonical headers: names already lowercased by set_header, sorted by
    // the BTreeMap, values trimmed.
    let canonical_headers: String = request
        .headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers = request
        .headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        if request.path.is_empty() { "/" } else { &request.path },
        request.query_string(),
        canonical_headers,
        signed_headers,
        sha256_hex(&request.body)
    );

    let scope = format!("{}/{}/{}/{}", date, region, service, SCOPE_TERMINATOR);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        SCHEME,
        datetime,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    // Derive the signing key by chained HMAC over the scope components.
    let secret = format!("SDK4{}", credentials.secret_key);
    let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes())?;

    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        SCHEME, credentials.access_key, scope, signed_headers, signature
    );
    request.set_header("authorization", authorization);

    Ok(())
}
