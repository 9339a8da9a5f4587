//! Maps a request's host and path onto a tenant, a storage key and a URI.
//!
//! Storage keys are slash-separated segments without a leading slash. With
//! virtual hosts enabled every host is its own tenant and its keys are
//! prefixed with the host's domain, otherwise all hosts share one namespace
//! whose root key is the empty string.

use crate::config::Settings;
use crate::error::{LinkstoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// Domain of the request host, lowercased and without port.
    pub root: String,
    /// Storage key of the tenant root.
    pub tenant: String,
    /// Resource path below the tenant root, no leading or trailing slash.
    pub path: String,
    pub key: String,
    /// `scheme://host[:port]` as the client addressed it.
    pub base: String,
    pub uri: String,
    pub name: String,
}

impl PathInfo {
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
    pub fn first_segment(&self) -> &str {
        self.path.split('/').next().unwrap_or("")
    }
}

/// `a/b/c` has the ancestors `a` and `a/b`.
pub fn ancestors(key: &str) -> Vec<String> {
    key.match_indices('/').map(|(index, _)| key[..index].to_string()).collect()
}

pub fn join_key(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    scheme: String,
    vhosts: bool,
    default_host: String,
}

impl Resolver {
    pub fn new(settings: &Settings) -> Self {
        Self {
            scheme: settings.scheme.clone(),
            vhosts: settings.vhosts,
            default_host: settings.default_host.clone(),
        }
    }

    pub fn tenant_key(&self, domain: &str) -> String {
        if self.vhosts { domain.to_string() } else { String::new() }
    }

    pub fn resolve(&self, host: Option<&str>, path: &str) -> Result<PathInfo> {
        let host = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.default_host)
            .to_ascii_lowercase();
        let root = domain_of(&host)?;
        if !path.starts_with('/') {
            return Err(LinkstoreError::InvalidPath(format!("'{path}' is not absolute")));
        }
        let mut segments = Vec::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.chars().any(char::is_control) {
                return Err(LinkstoreError::InvalidPath(format!("'{path}' escapes the storage root")));
            }
            segments.push(segment);
        }
        let relative = segments.join("/");
        let tenant = self.tenant_key(&root);
        let key = join_key(&tenant, &relative);
        let base = format!("{}://{}", self.scheme, host);
        Ok(PathInfo {
            uri: format!("{base}{path}"),
            name: segments.last().map(|s| s.to_string()).unwrap_or_default(),
            root,
            tenant,
            path: relative,
            key,
            base,
        })
    }
}

fn domain_of(host: &str) -> Result<String> {
    let domain = if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        let end = rest
            .find(']')
            .ok_or_else(|| LinkstoreError::InvalidPath(format!("malformed host '{host}'")))?;
        &host[..end + 2]
    } else {
        host.split(':').next().unwrap_or(host)
    };
    let valid = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '[' | ']' | ':' | '_'));
    if valid {
        Ok(domain.to_string())
    } else {
        Err(LinkstoreError::InvalidPath(format!("malformed host '{host}'")))
    }
}
