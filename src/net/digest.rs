//! RFC 2617 Digest authentication
//!
//! Computes `Authorization: Digest` header values for camera logins. Handles
//! the `md5-sess` algorithm variant, `qop=auth` / `qop=auth-int`, and legacy
//! challenges with no qop at all.

use std::collections::HashMap;

use rand::Rng;

/// Parsed `WWW-Authenticate: Digest ...` challenge.
///
/// Parameter values may be quoted or unquoted on the wire; both forms are
/// accepted, including quoted values containing commas (`qop="auth,auth-int"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value. Returns `None` when the
    /// challenge is not a Digest challenge or lacks realm/nonce.
    pub fn parse(header: &str) -> Option<Self> {
        let trimmed = header.trim();
        if !trimmed.to_ascii_lowercase().starts_with("digest") {
            return None;
        }
        let params = parse_auth_params(&trimmed[6..]);

        Some(Self {
            realm: params.get("realm")?.clone(),
            nonce: params.get("nonce")?.clone(),
            qop: params.get("qop").cloned(),
            algorithm: params.get("algorithm").cloned(),
            opaque: params.get("opaque").cloned(),
        })
    }

    /// Preferred qop for the response: `auth` when offered, else `auth-int`,
    /// else none (legacy computation).
    fn selected_qop(&self) -> Option<&'static str> {
        let offered = self.qop.as_deref()?;
        let mut has_auth_int = false;
        for option in offered.split(',') {
            match option.trim() {
                "auth" => return Some("auth"),
                "auth-int" => has_auth_int = true,
                _ => {}
            }
        }
        if has_auth_int {
            Some("auth-int")
        } else {
            None
        }
    }
}

/// Split a comma-separated attribute list into a key -> value map,
/// tolerating quoted and unquoted values.
fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let eq = match rest.find('=') {
            Some(i) => i,
            None => break,
        };
        let key = rest[..eq].trim().trim_start_matches(',').trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            value = stripped[..end].to_string();
            rest = stripped.get(end + 1..).unwrap_or("").trim_start();
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = rest.get(end..).unwrap_or("");
        }
        rest = rest.trim_start_matches(',').trim_start();

        if !key.is_empty() {
            params.insert(key, value);
        }
    }

    params
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Fresh random cnonce, hex-encoded.
pub fn random_cnonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compute the full `Digest ...` Authorization header value.
///
/// `cnonce` is supplied by the caller so responses are reproducible under
/// test; production callers pass [`random_cnonce`]. `nc` is the zero-padded
/// nonce count, `00000001` for a first use.
pub fn digest_authorization(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: &DigestChallenge,
    cnonce: &str,
    nc: &str,
) -> String {
    let algorithm = challenge
        .algorithm
        .as_deref()
        .unwrap_or("MD5")
        .to_ascii_uppercase();

    let mut ha1 = md5_hex(&format!("{}:{}:{}", username, challenge.realm, password));
    if algorithm == "MD5-SESS" {
        ha1 = md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, cnonce));
    }

    let qop = challenge.selected_qop();
    let ha2 = match qop {
        Some("auth-int") => {
            // Probes carry no entity body; hash of the empty body.
            let body_hash = md5_hex("");
            md5_hex(&format!("{}:{}:{}", method, uri, body_hash))
        }
        _ => md5_hex(&format!("{}:{}", method, uri)),
    };

    let response = match qop {
        Some(qop) => md5_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, challenge.nonce, nc, cnonce, qop, ha2
        )),
        None => md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2)),
    };

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        username, challenge.realm, challenge.nonce, uri, response
    );
    if challenge.algorithm.is_some() {
        header.push_str(&format!(", algorithm={}", algorithm));
    }
    if let Some(qop) = qop {
        header.push_str(&format!(", qop={}, nc={}, cnonce=\"{}\"", qop, nc, cnonce));
    }
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_challenge() {
        let challenge = DigestChallenge::parse(
            "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
             nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"",
        )
        .unwrap();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(challenge.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(challenge.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
    }

    #[test]
    fn parses_unquoted_and_mixed_parameters() {
        let challenge =
            DigestChallenge::parse("Digest realm=IP Camera, nonce=abc123, qop=auth, algorithm=MD5")
                .unwrap();
        assert_eq!(challenge.realm, "IP Camera");
        assert_eq!(challenge.nonce, "abc123");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
        assert_eq!(challenge.algorithm.as_deref(), Some("MD5"));
    }

    #[test]
    fn rejects_basic_challenge() {
        assert!(DigestChallenge::parse("Basic realm=\"cam\"").is_none());
    }

    #[test]
    fn rfc2617_reference_vector() {
        // The worked example from RFC 2617 §3.5.
        let challenge = DigestChallenge::parse(
            "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
             nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"",
        )
        .unwrap();
        let header = digest_authorization(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            &challenge,
            "0a4f113b",
            "00000001",
        );
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("qop=auth"));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
    }

    #[test]
    fn legacy_challenge_without_qop() {
        let challenge = DigestChallenge::parse(
            "Digest realm=\"cam\", nonce=\"deadbeef\"",
        )
        .unwrap();
        let header = digest_authorization("admin", "12345", "GET", "/", &challenge, "c0ffee", "00000001");
        // response = MD5(HA1:nonce:HA2), no qop/nc/cnonce attributes
        let ha1 = format!("{:x}", md5::compute("admin:cam:12345"));
        let ha2 = format!("{:x}", md5::compute("GET:/"));
        let expected = format!("{:x}", md5::compute(format!("{}:deadbeef:{}", ha1, ha2)));
        assert!(header.contains(&format!("response=\"{}\"", expected)));
        assert!(!header.contains("qop="));
    }

    #[test]
    fn md5_sess_uses_session_ha1() {
        let challenge = DigestChallenge::parse(
            "Digest realm=\"cam\", nonce=\"n1\", qop=\"auth\", algorithm=MD5-sess",
        )
        .unwrap();
        let header =
            digest_authorization("admin", "pass", "GET", "/", &challenge, "cn1", "00000001");
        let base = format!("{:x}", md5::compute("admin:cam:pass"));
        let ha1 = format!("{:x}", md5::compute(format!("{}:n1:cn1", base)));
        let ha2 = format!("{:x}", md5::compute("GET:/"));
        let expected = format!(
            "{:x}",
            md5::compute(format!("{}:n1:00000001:cn1:auth:{}", ha1, ha2))
        );
        assert!(header.contains(&format!("response=\"{}\"", expected)));
        assert!(header.contains("algorithm=MD5-SESS"));
    }

    #[test]
    fn auth_int_hashes_empty_body() {
        let challenge =
            DigestChallenge::parse("Digest realm=\"cam\", nonce=\"n1\", qop=\"auth-int\"").unwrap();
        let header =
            digest_authorization("admin", "pass", "GET", "/", &challenge, "cn1", "00000001");
        assert!(header.contains("qop=auth-int"));
    }

    #[test]
    fn cnonce_is_hex_and_fresh() {
        let a = random_cnonce();
        let b = random_cnonce();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
