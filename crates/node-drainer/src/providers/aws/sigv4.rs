//! AWS Signature Version 4.
//!
//! Two flavours are supported:
//!
//! - [`sign_headers`] produces the `Authorization` header set for regular API
//!   calls (EC2, EKS, Auto Scaling).
//! - [`presign_url`] moves the signature into the query string. This is what
//!   EKS cluster tokens are built from: a presigned STS
//!   `GetCallerIdentity` URL.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use super::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash used for presigned URLs.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

/// Inputs shared by every signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// Credentials to sign with.
    pub credentials: &'a AwsCredentials,
    /// Region the request is scoped to.
    pub region: &'a str,
    /// Service signing name (e.g. `sts`, `ec2`).
    pub service: &'a str,
    /// Signing time.
    pub time: DateTime<Utc>,
}

impl SigningParams<'_> {
    fn amz_date(&self) -> String {
        self.time.format(AMZ_DATE_FORMAT).to_string()
    }

    fn scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.time.format(SCOPE_DATE_FORMAT),
            self.region,
            self.service
        )
    }

    fn signing_key(&self) -> Vec<u8> {
        signing_key(
            &self.credentials.secret_access_key,
            &self.time.format(SCOPE_DATE_FORMAT).to_string(),
            self.region,
            self.service,
        )
    }
}

/// Sign a request with header-based authentication.
///
/// Returns the headers that must be added to the request: `x-amz-date`,
/// `x-amz-security-token` for temporary credentials, and `authorization`.
/// `headers` lists any extra headers that should be covered by the signature;
/// `host` is always derived from `url`.
#[must_use]
pub fn sign_headers(
    method: &str,
    url: &Url,
    headers: &[(&str, &str)],
    body: &[u8],
    params: &SigningParams<'_>,
) -> Vec<(String, String)> {
    let amz_date = params.amz_date();

    let mut signed: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    signed.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &params.credentials.session_token {
        signed.push(("x-amz-security-token".to_string(), token.clone()));
    }

    let (canonical_headers, signed_headers) = canonical_headers(url, &signed);
    let payload_hash = hex::encode(Sha256::digest(body));
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    let canonical_request = canonical_request(
        method,
        url,
        &query,
        &canonical_headers,
        &signed_headers,
        &payload_hash,
    );
    let signature = signature(&canonical_request, &amz_date, params);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{}, SignedHeaders={signed_headers}, Signature={signature}",
        params.credentials.access_key_id,
        params.scope()
    );

    let mut out = vec![("x-amz-date".to_string(), amz_date)];
    if let Some(token) = &params.credentials.session_token {
        out.push(("x-amz-security-token".to_string(), token.clone()));
    }
    out.push(("authorization".to_string(), authorization));
    out
}

/// Produce a presigned URL valid for `expires_in_secs`.
///
/// `headers` are covered by the signature and must be sent verbatim by
/// whoever redeems the URL.
#[must_use]
pub fn presign_url(
    method: &str,
    url: &Url,
    headers: &[(&str, &str)],
    expires_in_secs: u64,
    params: &SigningParams<'_>,
) -> Url {
    let amz_date = params.amz_date();
    let owned_headers: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let (canonical_headers, signed_headers) = canonical_headers(url, &owned_headers);

    let mut query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    query.push(("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()));
    query.push((
        "X-Amz-Credential".to_string(),
        format!(
            "{}/{}",
            params.credentials.access_key_id,
            params.scope()
        ),
    ));
    query.push(("X-Amz-Date".to_string(), amz_date.clone()));
    query.push(("X-Amz-Expires".to_string(), expires_in_secs.to_string()));
    query.push(("X-Amz-SignedHeaders".to_string(), signed_headers.clone()));
    if let Some(token) = &params.credentials.session_token {
        query.push(("X-Amz-Security-Token".to_string(), token.clone()));
    }

    let canonical_request = canonical_request(
        method,
        url,
        &query,
        &canonical_headers,
        &signed_headers,
        UNSIGNED_PAYLOAD,
    );
    let signature = signature(&canonical_request, &amz_date, params);

    let mut presigned = url.clone();
    presigned.set_query(None);
    {
        let mut pairs = presigned.query_pairs_mut();
        for (k, v) in &query {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("X-Amz-Signature", &signature);
    }
    presigned
}

/// Derive the SigV4 signing key for a date/region/service scope.
#[must_use]
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn signature(canonical_request: &str, amz_date: &str, params: &SigningParams<'_>) -> String {
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{}\n{}",
        params.scope(),
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    hex::encode(hmac(&params.signing_key(), string_to_sign.as_bytes()))
}

/// HMAC-SHA256. Keys are normalised to one block the way HMAC itself does
/// (hashed when longer, zero-padded when shorter), so keying cannot fail.
fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut block = Key::<HmacSha256>::default();
    if key.len() > block.len() {
        let digest = Sha256::digest(key);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut mac = <HmacSha256 as KeyInit>::new(&block);
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn canonical_request(
    method: &str,
    url: &Url,
    query: &[(String, String)],
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        canonical_uri(url),
        canonical_query(query)
    )
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    // Non-S3 services expect each segment to be encoded twice; `Url::path` is
    // already encoded once.
    path.split('/')
        .map(|segment| uri_encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(query: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns the canonical header block and the `;`-joined signed header list.
fn canonical_headers(url: &Url, headers: &[(String, String)]) -> (String, String) {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    map.insert("host".to_string(), host_header(url));
    for (name, value) in headers {
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        map.insert(name.to_ascii_lowercase(), value);
    }

    let mut block = String::new();
    for (name, value) in &map {
        let _ = writeln!(block, "{name}:{value}");
    }
    let signed = map.keys().cloned().collect::<Vec<_>>().join(";");
    (block, signed)
}

/// `Host` header value as sent by the HTTP client.
#[must_use]
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// RFC 3986 encoding with the SigV4 unreserved set.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}
