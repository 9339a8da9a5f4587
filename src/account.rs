//! The account registry and the identity API behind the reserved path segment.
//!
//! An account has no record of its own: it exists when a container exists at
//! `<account>.<domain>`, the tenant root of the account's host.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{LinkstoreError, Result};
use crate::identity::{parse_spkac, profile_graph, Account, Issuer};
use crate::path::{join_key, PathInfo};
use crate::store::Store;

pub const CERTIFICATE_MEDIA_TYPE: &str = "application/x-x509-user-cert; charset=utf-8";

lazy_static! {
    // accounts become subdomains, so names are DNS labels
    static ref ACCOUNT_NAME: Regex = Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    #[serde(rename = "Method", default)]
    pub method: String,
    #[serde(rename = "AccountName")]
    pub account_name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub account_name: String,
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub method: String,
    pub status: String,
    pub formuri: String,
    pub response: AccountResponse,
}

/// Form fields posted by the certificate request page.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CertificateRequest {
    pub username: String,
    pub name: String,
    pub email: String,
    pub img: String,
    #[serde(rename = "SPKAC")]
    pub spkac: String,
}

/// A certificate ready to be handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub identity_uri: String,
    pub der: Vec<u8>,
    /// Whether the client's user agent installs certificates served directly.
    pub direct_download: bool,
}

impl IssuedCertificate {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.der)
    }
    pub fn content_type(&self) -> &'static str {
        if self.direct_download { CERTIFICATE_MEDIA_TYPE } else { "text/html; charset=utf-8" }
    }
    /// A hidden frame whose data URI makes the browser import the certificate.
    pub fn body(&self) -> String {
        format!(
            r#"<iframe width="0" height="0" style="display: none;" src="data:application/x-x509-user-cert;base64,{}"></iframe>"#,
            self.base64()
        )
    }
}

/// Lowercases and validates an account name.
pub fn fold_account_name(name: &str) -> Result<String> {
    let folded = name.trim().to_lowercase();
    if ACCOUNT_NAME.is_match(&folded) {
        Ok(folded)
    } else {
        Err(LinkstoreError::BadRequest(format!("'{name}' is not a valid account name")))
    }
}

pub struct AccountRegistry {
    store: Arc<Store>,
    settings: Arc<Settings>,
    issuer: Issuer,
}

impl AccountRegistry {
    pub fn new(store: Arc<Store>, settings: Arc<Settings>, issuer: Issuer) -> Self {
        Self { store, settings, issuer }
    }

    /// `<account>.<domain>`, also the storage key of the account root.
    pub fn account_host(account: &str, info: &PathInfo) -> String {
        format!("{account}.{}", info.root)
    }

    pub fn form_uri(&self, info: &PathInfo) -> String {
        format!("{}/{}/spkac", info.base, self.settings.system_prefix)
    }

    pub fn is_available(&self, account: &str, info: &PathInfo) -> Result<bool> {
        let account = fold_account_name(account)?;
        let taken = self.store.container_exists(&Self::account_host(&account, info))?;
        Ok(!taken)
    }

    /// Answers an `accountStatus` request body.
    pub fn account_status(&self, body: &[u8], info: &PathInfo) -> Result<StatusResponse> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(LinkstoreError::BadRequest("empty request for accountStatus".into()));
        }
        let request: AccountRequest = serde_json::from_slice(body)?;
        let account_name = fold_account_name(&request.account_name)?;
        let available = self.is_available(&account_name, info)?;
        info!(account = %account_name, available, method = %request.method, "account status");
        Ok(StatusResponse {
            method: "accountStatus".into(),
            status: "success".into(),
            formuri: self.form_uri(info),
            response: AccountResponse { account_name, available },
        })
    }

    pub fn identity_uri(&self, account: &str, info: &PathInfo) -> String {
        format!(
            "{}://{}{}/profile/card#me",
            self.settings.scheme,
            Self::account_host(account, info),
            self.settings.port_suffix()
        )
    }

    /// Issues a certificate and writes the identity profile. Anything that
    /// fails aborts the rest; containers created before a failure stay.
    pub fn issue(&self, request: CertificateRequest, user_agent: Option<&str>, info: &PathInfo) -> Result<IssuedCertificate> {
        let account = fold_account_name(&request.username)?;
        let host = Self::account_host(&account, info);
        let identity_uri = self.identity_uri(&account, info);
        let key = parse_spkac(&request.spkac)?;
        let profile = profile_graph(&Account {
            uri: identity_uri.clone(),
            name: request.name.clone(),
            email: request.email,
            img: request.img,
            modulus: key.modulus_hex(),
            exponent: key.exponent().to_string(),
        });

        let profile_dir = join_key(&host, "profile");
        self.store.ensure_collections(&[host.clone(), profile_dir.clone()])?;
        let written = self.store.replace(&join_key(&profile_dir, "card"), profile)?;

        let label = format!("{} [on {}]", request.name, host);
        let der = self.issuer.mint(&key, &identity_uri, &label).inspect_err(|e| {
            warn!(account = %account, error = %e, "certificate minting failed");
        })?;
        info!(account = %account, uri = %identity_uri, triples = written.triples, "certificate issued");
        Ok(IssuedCertificate {
            identity_uri,
            der,
            direct_download: user_agent.is_some_and(|ua| ua.contains("Chrome")),
        })
    }
}
