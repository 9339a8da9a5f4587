//! Process-wide settings, read once at startup.
//!
//! Sources are layered: built-in defaults, then an optional `linkstore.toml`
//! (or the file named on the command line), then `LINKSTORE_*` environment
//! variables.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::persist::PersistenceMode;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub scheme: String,
    /// SQLite file; in-memory when absent.
    pub database: Option<String>,
    /// Stream GET bodies chunk by chunk instead of buffering them.
    pub stream: bool,
    pub vhosts: bool,
    pub system_prefix: String,
    pub default_host: String,
    pub log: String,
    pub certificate_days: u32,
    pub issuer_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 443,
            scheme: "https".into(),
            database: None,
            stream: false,
            vhosts: false,
            system_prefix: ",system".into(),
            default_host: "localhost".into(),
            log: "info".into(),
            certificate_days: 365,
            issuer_name: "linkstore".into(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => File::with_name(path),
            None => File::with_name("linkstore").required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("LINKSTORE").try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        match &self.database {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        }
    }

    /// The suffix identity URIs carry, empty on the default ports.
    pub fn port_suffix(&self) -> String {
        match self.port {
            80 | 443 => String::new(),
            port => format!(":{port}"),
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
