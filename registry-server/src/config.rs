use serde::Deserialize;
use tokio::sync::oneshot;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub port: u16,
    #[serde(skip)]
    pub port_tx: Option<oneshot::Sender<u16>>,
    pub database_url: String,
    /// Reject policy documents whose OBJECTS/ROUTE entries don't match a
    /// route this server actually serves. Off by default so a policy
    /// authored against a superset of routes can still load; turn on in
    /// production.
    #[serde(default)]
    pub strict_route_validation: bool,
    /// When set, requests carrying no bearer token are authorized as if
    /// every rule's formula evaluated unconditionally true. An
    /// anonymous-equivalent policy bypass for internal callers only;
    /// never set outside trusted internal networks.
    #[serde(default)]
    pub anonymous_bypass: bool,
}

impl Config {
    pub fn sanitize(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(anyhow::Error::msg("database-url must not be empty"));
        }
        Ok(())
    }
}
