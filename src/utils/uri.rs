//! URL helpers for endpoint resolution.

use url::Url;

use crate::core::error::{McpError, McpResult};

/// Resolve `raw` against `base`, requiring the result to share the base's
/// origin (scheme, host, and port).
///
/// Relative references inherit the base origin by construction; absolute
/// URLs pointing anywhere else are rejected so a compromised stream cannot
/// redirect the upchannel off-origin.
pub fn resolve_same_origin(base: &Url, raw: &str) -> McpResult<Url> {
    let resolved = base
        .join(raw)
        .map_err(|e| McpError::InvalidMessage(format!("unresolvable endpoint URL '{raw}': {e}")))?;

    if resolved.origin() != base.origin() {
        return Err(McpError::invalid_state(format!(
            "origin mismatch: endpoint '{resolved}' does not match '{base}'"
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:3000/sse").unwrap()
    }

    #[test]
    fn relative_paths_resolve_against_the_base() {
        let url = resolve_same_origin(&base(), "/message?sessionId=X").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/message?sessionId=X");
    }

    #[test]
    fn absolute_same_origin_urls_pass() {
        let url = resolve_same_origin(&base(), "http://localhost:3000/msg").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/msg");
    }

    #[test]
    fn different_host_is_rejected() {
        let result = resolve_same_origin(&base(), "http://evil.example.com/msg");
        match result {
            Err(McpError::InvalidState(reason)) => assert!(reason.contains("origin mismatch")),
            other => panic!("expected origin mismatch, got {other:?}"),
        }
    }

    #[test]
    fn different_port_is_rejected() {
        let result = resolve_same_origin(&base(), "http://localhost:4000/msg");
        assert!(matches!(result, Err(McpError::InvalidState(_))));
    }

    #[test]
    fn different_scheme_is_rejected() {
        let result = resolve_same_origin(&base(), "https://localhost:3000/msg");
        assert!(matches!(result, Err(McpError::InvalidState(_))));
    }

    #[test]
    fn garbage_is_an_invalid_message() {
        // A scheme-relative URL with an empty host fails to join
        let result = resolve_same_origin(&base(), "http://");
        assert!(result.is_err());
    }
}
