//! Header templating: default headers plus credential placeholders.

use std::collections::BTreeMap;

use sa_protocol::{
    API_KEY_PLACEHOLDER, CREDENTIALS_PLACEHOLDER, TOKEN_PLACEHOLDER, USER_AGENT,
};

use crate::config::Credentials;

/// Final request headers for a stub's header template.
///
/// Known placeholders are filled from `credentials`. Any placeholder left
/// unresolved is dropped unless its header is listed in `passthrough`.
/// A token or key with no slot in the template is still sent, as
/// `Authorization: Bearer` or `X-API-Key`.
pub fn resolve_headers(
    template: &BTreeMap<String, String>,
    credentials: &Credentials,
    passthrough: &[String],
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), USER_AGENT.to_string()),
    ]);
    let mut token_used = false;
    let mut key_used = false;

    for (name, value) in template {
        let resolved = match value.as_str() {
            TOKEN_PLACEHOLDER => credentials.auth_token.as_ref().map(|token| {
                token_used = true;
                format!("Bearer {token}")
            }),
            API_KEY_PLACEHOLDER => credentials.api_key.clone().inspect(|_| key_used = true),
            CREDENTIALS_PLACEHOLDER => credentials
                .basic_credentials()
                .map(|encoded| format!("Basic {encoded}")),
            other if !is_placeholder(other) => Some(other.to_string()),
            _ => None,
        };

        match resolved {
            Some(v) => {
                headers.insert(name.clone(), v);
            }
            None if passthrough.iter().any(|p| p.eq_ignore_ascii_case(name)) => {
                headers.insert(name.clone(), value.clone());
            }
            None => {
                tracing::debug!(header = %name, "dropping unresolved header placeholder");
            }
        }
    }

    if let Some(token) = &credentials.auth_token
        && !token_used
        && !has_header(&headers, "Authorization")
    {
        headers.insert("Authorization".into(), format!("Bearer {token}"));
    }
    if let Some(key) = &credentials.api_key
        && !key_used
        && !has_header(&headers, "X-API-Key")
    {
        headers.insert("X-API-Key".into(), key.clone());
    }
    headers
}

fn is_placeholder(value: &str) -> bool {
    value.starts_with("${") && value.ends_with('}')
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}
