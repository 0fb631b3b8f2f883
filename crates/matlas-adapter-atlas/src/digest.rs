//! http digest authentication (rfc 2617, md5, qop=auth).

use uuid::Uuid;

/// parameters of a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Challenge {
    pub(crate) realm: String,
    pub(crate) nonce: String,
    pub(crate) opaque: Option<String>,
    pub(crate) qop: Option<String>,
}

impl Challenge {
    /// parse a challenge header; `None` for other schemes.
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop = None;
        for param in split_params(params) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop = Some(value),
                _ => {}
            }
        }
        Some(Self {
            realm: realm?,
            nonce: nonce?,
            opaque,
            qop,
        })
    }

    fn supports_auth_qop(&self) -> bool {
        self.qop
            .as_deref()
            .is_some_and(|qop| qop.split(',').any(|item| item.trim() == "auth"))
    }
}

/// split `a="x, y", b=z` on commas outside quotes.
fn split_params(raw: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in raw.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            ',' if !quoted => {
                if !current.trim().is_empty() {
                    params.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        params.push(current.trim().to_string());
    }
    params
}

/// a cached challenge plus its nonce counter.
#[derive(Debug)]
pub(crate) struct DigestSession {
    challenge: Challenge,
    nonce_count: u32,
}

impl DigestSession {
    pub(crate) fn new(challenge: Challenge) -> Self {
        Self {
            challenge,
            nonce_count: 0,
        }
    }

    /// `Authorization` value for one request; bumps the nonce count.
    pub(crate) fn authorization(
        &mut self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
    ) -> String {
        self.nonce_count += 1;
        let cnonce = Uuid::new_v4().simple().to_string()[..16].to_string();
        self.header(username, password, method, uri, &cnonce)
    }

    fn header(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        let challenge = &self.challenge;
        let ha1 = hex_md5(&format!("{username}:{}:{password}", challenge.realm));
        let ha2 = hex_md5(&format!("{method}:{uri}"));
        let nc = format!("{:08x}", self.nonce_count);
        let mut header = format!(
            "Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", algorithm=MD5",
            challenge.realm, challenge.nonce
        );
        if challenge.supports_auth_qop() {
            let response = hex_md5(&format!(
                "{ha1}:{}:{nc}:{cnonce}:auth:{ha2}",
                challenge.nonce
            ));
            header.push_str(&format!(
                ", qop=auth, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\""
            ));
        } else {
            let response = hex_md5(&format!("{ha1}:{}:{ha2}", challenge.nonce));
            header.push_str(&format!(", response=\"{response}\""));
        }
        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        header
    }
}

fn hex_md5(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
