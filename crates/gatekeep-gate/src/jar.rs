//! Client-held credential storage.
//!
//! The gate never talks to HTTP directly. It reads the presented token
//! from, writes re-issued tokens to, and clears everything in, a
//! [`CredentialJar`]. [`CookieJar`] is the cookie-backed implementation:
//! it parses the request's `Cookie` header and collects the `Set-Cookie`
//! headers the response must carry.

use std::collections::BTreeMap;

use crate::GateConfig;

/// Where the client keeps its credentials.
pub trait CredentialJar {
    /// The token the client presented, if any.
    fn token(&self) -> Option<&str>;

    /// Replaces the client's token with a re-issued one.
    fn store(&mut self, token: &str);

    /// Removes every credential artifact the client holds.
    fn clear(&mut self);
}

/// Cookie attributes for credential cookies.
const ATTRIBUTES: &str = "Path=/; HttpOnly; Secure; SameSite=Lax";

/// A [`CredentialJar`] over request cookies.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    names: Vec<String>,
    values: BTreeMap<String, String>,
    set_cookies: Vec<String>,
}

impl CookieJar {
    /// An empty jar for the cookies named in `config`.
    pub fn new(config: &GateConfig) -> Self {
        Self {
            names: config.cookie_names.clone(),
            values: BTreeMap::new(),
            set_cookies: Vec::new(),
        }
    }

    /// A jar holding `token` in the token cookie.
    pub fn with_token(config: &GateConfig, token: impl Into<String>) -> Self {
        let mut jar = Self::new(config);
        jar.values
            .insert(config.token_cookie().to_string(), token.into());
        jar
    }

    /// Parses a request `Cookie` header, keeping only credential cookies.
    pub fn from_header(config: &GateConfig, header: &str) -> Self {
        let mut jar = Self::new(config);
        for pair in header.split(';') {
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            let name = name.trim();
            if jar.names.iter().any(|n| n == name) {
                jar.values.insert(name.to_string(), value.trim().to_string());
            }
        }
        jar
    }

    /// The value of a credential cookie.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// `Set-Cookie` header values the response must send, in order.
    pub fn set_cookie_headers(&self) -> &[String] {
        &self.set_cookies
    }

    fn token_name(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or(GateConfig::DEFAULT_COOKIE)
    }
}

impl CredentialJar for CookieJar {
    fn token(&self) -> Option<&str> {
        self.get(self.token_name()).filter(|t| !t.is_empty())
    }

    fn store(&mut self, token: &str) {
        let name = self.token_name().to_string();
        self.set_cookies.push(format!("{name}={token}; {ATTRIBUTES}"));
        self.values.insert(name, token.to_string());
    }

    fn clear(&mut self) {
        self.values.clear();
        // Expire every configured cookie, present or not: the browser may
        // hold one this request didn't send (different path, say).
        self.set_cookies.clear();
        for name in &self.names {
            self.set_cookies.push(format!(
                "{name}=; {ATTRIBUTES}; Max-Age=0; \
                 Expires=Thu, 01 Jan 1970 00:00:00 GMT"
            ));
        }
    }
}
