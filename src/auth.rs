//! Client authorization and upstream credential selection.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};

const MISSING_AUTH: &str = "Missing or invalid Authorization header. Use Bearer token.";

/// The token of a `Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

/// Decide which `Authorization` value to send upstream for a client request.
///
/// With an allow-list configured, the client must present one of the listed keys
/// and upstream is called with the proxy's own W&B key. Without one, a client
/// bearer header is forwarded as-is and the configured key is the fallback.
pub fn resolve_upstream_auth(header: Option<&str>, config: &ProxyConfig) -> Result<String> {
    let allowed = config.allowed_keys();
    if !allowed.is_empty() {
        let token = header
            .and_then(bearer_token)
            .ok_or_else(|| ProxyError::unauthorized(MISSING_AUTH))?;
        if !allowed.iter().any(|k| k == token) {
            return Err(ProxyError::unauthorized("Invalid API key."));
        }
        return Ok(format!("Bearer {}", config.resolve_api_key()?));
    }

    match header {
        Some(value) if bearer_token(value).is_some() => Ok(value.to_string()),
        Some(_) => Err(ProxyError::unauthorized(MISSING_AUTH)),
        None => config
            .resolve_api_key()
            .map(|key| format!("Bearer {key}"))
            .map_err(|_| ProxyError::unauthorized(MISSING_AUTH)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(allowed: &[&str], api_key: Option<&str>) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.upstream.api_key_env = "WANDB_PROXY_TEST_NEVER_SET".to_string();
        config.upstream.api_key = api_key.map(String::from);
        config.auth.allowed_keys_env = "WANDB_PROXY_TEST_NEVER_SET_KEYS".to_string();
        config.auth.allowed_keys = allowed.iter().map(|k| k.to_string()).collect();
        config
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("bearer abc"), None);
    }

    #[test]
    fn test_client_header_forwarded() {
        let auth = resolve_upstream_auth(Some("Bearer client-key"), &config(&[], Some("server-key")));
        assert_eq!(auth.unwrap(), "Bearer client-key");
    }

    #[test]
    fn test_configured_key_fallback() {
        let auth = resolve_upstream_auth(None, &config(&[], Some("server-key")));
        assert_eq!(auth.unwrap(), "Bearer server-key");
    }

    #[test]
    fn test_no_credentials_is_unauthorized() {
        let err = resolve_upstream_auth(None, &config(&[], None)).unwrap_err();
        assert!(matches!(err, ProxyError::Unauthorized { .. }));
    }

    #[test]
    fn test_non_bearer_header_rejected_even_with_fallback() {
        let err = resolve_upstream_auth(Some("Basic xyz"), &config(&[], Some("server-key"))).unwrap_err();
        assert!(matches!(err, ProxyError::Unauthorized { .. }));
    }

    #[test]
    fn test_allow_list_swaps_in_server_key() {
        let cfg = config(&["team-key"], Some("server-key"));
        assert_eq!(
            resolve_upstream_auth(Some("Bearer team-key"), &cfg).unwrap(),
            "Bearer server-key"
        );
        assert!(matches!(
            resolve_upstream_auth(Some("Bearer other"), &cfg),
            Err(ProxyError::Unauthorized { .. })
        ));
        assert!(matches!(
            resolve_upstream_auth(None, &cfg),
            Err(ProxyError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_allow_list_without_server_key_is_config_error() {
        let cfg = config(&["team-key"], None);
        assert!(matches!(
            resolve_upstream_auth(Some("Bearer team-key"), &cfg),
            Err(ProxyError::Config { .. })
        ));
    }
}
