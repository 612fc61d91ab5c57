use axum::http::{header, HeaderMap};
use serde::Serialize;
use std::net::IpAddr;

use super::context::TenantId;
use super::error::TenancyError;
use crate::auth;
use crate::config::{AppConfig, Environment, SecurityConfig, TenancyConfig};

/// Which inbound signal identified the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    Header,
    TokenClaim,
    Subdomain,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub id: TenantId,
    pub source: TenantSource,
}

/// Derives a tenant identifier from request metadata.
///
/// Sources are tried in order: explicit header, bearer token claim, host
/// subdomain, configured default (development only). The first match wins.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    header: String,
    environment: Environment,
    default_tenant: Option<TenantId>,
    ignored_subdomains: Vec<String>,
    jwt_secret: String,
    verify_tokens: bool,
}

impl TenantResolver {
    pub fn new(environment: Environment, tenancy: &TenancyConfig, security: &SecurityConfig) -> Self {
        Self {
            header: tenancy.header.to_ascii_lowercase(),
            environment,
            default_tenant: tenancy.default_tenant_id.map(TenantId::from),
            ignored_subdomains: tenancy.ignored_subdomains.iter().map(|s| s.to_ascii_lowercase()).collect(),
            jwt_secret: security.jwt_secret.clone(),
            verify_tokens: security.verify_token_signature || !environment.is_development(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.environment, &config.tenancy, &config.security)
    }

    /// `Ok(None)` means no source matched; that is for the guard to reject.
    /// A tenant header that is present but malformed is an error rather than
    /// a reason to fall through to weaker sources.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Option<ResolvedTenant>, TenancyError> {
        if let Some(id) = self.from_header(headers)? {
            return Ok(Some(ResolvedTenant { id, source: TenantSource::Header }));
        }
        if let Some(id) = self.from_bearer_token(headers) {
            return Ok(Some(ResolvedTenant { id, source: TenantSource::TokenClaim }));
        }
        if let Some(id) = self.from_subdomain(headers) {
            return Ok(Some(ResolvedTenant { id, source: TenantSource::Subdomain }));
        }
        Ok(self.from_default().map(|id| ResolvedTenant { id, source: TenantSource::Default }))
    }

    fn from_header(&self, headers: &HeaderMap) -> Result<Option<TenantId>, TenancyError> {
        let Some(value) = headers.get(self.header.as_str()) else {
            return Ok(None);
        };

        let raw = value
            .to_str()
            .map_err(|_| TenancyError::NotFound("<non-ascii header value>".to_string()))?
            .trim();
        if raw.is_empty() {
            return Ok(None);
        }

        raw.parse::<TenantId>().map(Some).map_err(|_| {
            tracing::warn!("Rejecting malformed {} header: {}", self.header, raw);
            TenancyError::NotFound(raw.to_string())
        })
    }

    fn from_bearer_token(&self, headers: &HeaderMap) -> Option<TenantId> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())?;

        let claims = match auth::decode_claims(token, &self.jwt_secret, self.verify_tokens) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Skipping bearer token for tenant resolution: {}", e);
                return None;
            }
        };

        let raw = claims.tenant_id?;
        match raw.parse::<TenantId>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!("Skipping non-UUID tenant claim: {}", raw);
                None
            }
        }
    }

    // No subdomain-to-tenant mapping exists yet; the label is only reported.
    fn from_subdomain(&self, headers: &HeaderMap) -> Option<TenantId> {
        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok())?;
        if let Some(label) = subdomain_of(host, &self.ignored_subdomains) {
            tracing::debug!("Host subdomain '{}' has no tenant mapping", label);
        }
        None
    }

    fn from_default(&self) -> Option<TenantId> {
        if !self.environment.is_development() {
            return None;
        }
        self.default_tenant
    }
}

/// Leftmost label of a host with at least three labels, port stripped,
/// unless it is an IP address or an ignored label such as `www`.
pub fn subdomain_of<'a>(host: &'a str, ignored: &[String]) -> Option<&'a str> {
    let host = host.trim();
    let name = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    if name.parse::<IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }

    let first = labels[0];
    if ignored.iter().any(|i| i.eq_ignore_ascii_case(first)) {
        return None;
    }
    Some(first)
}
