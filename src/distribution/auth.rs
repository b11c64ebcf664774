use crate::error::{Error, Result};
use crate::http::{HttpTransport, TransportFactory};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use url::Url;

/// Response header carrying the auth challenge on a 401.
pub const WWW_AUTHENTICATE: &str = "www-authenticate";

/// Largest credential/token answer the client will read.
pub const AUTH_MATERIAL_MAX_SIZE: u64 = 64 * 1024;

/// Parsed `www-authenticate` bearer challenge.
///
/// Registries gate every artifact behind a scope-specific token; the
/// challenge names where and for what to ask.
///
/// ```
/// use offline_update::distribution::BearerChallenge;
///
/// let challenge = BearerChallenge::parse(
///     r#"Bearer realm="https://hub.example.io/token-auth/v1",service="registry",scope="repository:acme/app:pull""#,
/// ).unwrap();
/// assert_eq!(challenge.realm, "https://hub.example.io/token-auth/v1");
/// assert_eq!(challenge.service, "registry");
/// assert_eq!(challenge.scope, "repository:acme/app:pull");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

impl BearerChallenge {
    pub fn parse(header: &str) -> Result<Self> {
        let err = |what: &str| Error::BadBearerChallenge(format!("{what}: {header}"));
        let (scheme, params) = header
            .split_once(' ')
            .ok_or_else(|| err("missing auth parameters"))?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(err("unsupported auth type"));
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for param in params.split(',') {
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| err("malformed auth parameter"))?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| err("missing quotes around parameter value"))?;
            match name.trim() {
                "realm" => realm = Some(value.to_string()),
                "service" => service = Some(value.to_string()),
                "scope" => scope = Some(value.to_string()),
                _ => continue,
            }
        }

        match (realm, service, scope) {
            (Some(realm), Some(service), Some(scope)) => Ok(Self {
                realm,
                service,
                scope,
            }),
            (realm, service, scope) => {
                let missing: Vec<&str> = [
                    ("realm", realm.is_none()),
                    ("service", service.is_none()),
                    ("scope", scope.is_none()),
                ]
                .iter()
                .filter_map(|(name, absent)| absent.then_some(*name))
                .collect();
                Err(Error::BadBearerChallenge(format!(
                    "missing required auth param(s) {}: {header}",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Token endpoint URL: `realm?service=…&scope=…`.
    pub fn token_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}?service={}&scope={}",
            self.realm, self.service, self.scope
        ))?)
    }
}

#[derive(Deserialize)]
struct RegistryCredentials {
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Secret")]
    secret: String,
}

#[derive(Deserialize)]
struct Token {
    token: String,
}

/// Fetch registry credentials from the daemon-side endpoint and fold them
/// into an `authorization: basic …` request header.
pub fn basic_auth_header(
    daemon: &dyn HttpTransport,
    creds_endpoint: &str,
) -> Result<(String, String)> {
    log::debug!("getting registry credentials from {creds_endpoint}");
    let resp = daemon.get(creds_endpoint, AUTH_MATERIAL_MAX_SIZE)?;
    if !resp.is_ok() {
        return Err(Error::AuthFailed(format!(
            "credentials endpoint {creds_endpoint} answered {}",
            resp.status
        )));
    }
    let creds: RegistryCredentials = resp.json()?;
    if creds.username.is_empty() || creds.secret.is_empty() {
        return Err(Error::AuthFailed(format!(
            "got empty registry credentials from {creds_endpoint}"
        )));
    }
    let encoded = STANDARD.encode(format!("{}:{}", creds.username, creds.secret));
    Ok(("authorization".to_string(), format!("basic {encoded}")))
}

/// Answer a bearer challenge: ask the token endpoint with basic credentials
/// attached and fold the token into an `authorization: bearer …` header.
pub fn bearer_auth_header(
    daemon: &dyn HttpTransport,
    creds_endpoint: &str,
    factory: &TransportFactory,
    challenge: &BearerChallenge,
) -> Result<(String, String)> {
    log::debug!("getting registry token from {}", challenge.realm);
    let basic = basic_auth_header(daemon, creds_endpoint)?;
    let token_url = challenge.token_url()?;
    let transport = factory(&[basic], &[]);
    let resp = transport.get(token_url.as_str(), AUTH_MATERIAL_MAX_SIZE)?;
    if !resp.is_ok() {
        return Err(Error::AuthFailed(format!(
            "token endpoint {} answered {}",
            challenge.realm, resp.status
        )));
    }
    let token: Token = resp.json()?;
    if token.token.is_empty() {
        return Err(Error::AuthFailed(format!(
            "got empty token from {}",
            challenge.realm
        )));
    }
    Ok(("authorization".to_string(), format!("bearer {}", token.token)))
}
