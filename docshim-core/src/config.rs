//! Connection configuration.
//!
//! The host application owns configuration loading; docshim only consumes the resulting
//! values. [`ConnectionConfig`] deserializes from the host's camelCase config block and
//! assembles the connection URI.

use serde::Deserialize;

/// URI scheme used for every assembled connection string.
pub const URI_SCHEME: &str = "mongodb://";

/// Connection parameters for the document database.
///
/// # Example
///
/// ```ignore
/// use docshim::config::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost", 27017).with_dbname("adapt");
/// assert_eq!(config.connection_uri(), "mongodb://localhost:27017/adapt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub dbname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Extra connection string parameters, appended verbatim after `?`.
    #[serde(default)]
    pub options: Option<String>,
    /// Application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            dbname: None,
            username: None,
            password: None,
            options: None,
            app_name: None,
        }
    }

    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Assembles the connection URI.
    ///
    /// Parts are appended in a fixed order: scheme, `user:pass@` when both credentials are
    /// set, `host:port`, `/dbname` when set, `?options` when set. Empty strings count as
    /// unset.
    pub fn connection_uri(&self) -> String {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }

        let mut uri = String::from(URI_SCHEME);

        if let (Some(username), Some(password)) = (present(&self.username), present(&self.password)) {
            uri.push_str(&format!("{username}:{password}@"));
        }
        uri.push_str(&format!("{}:{}", self.host, self.port));
        if let Some(dbname) = present(&self.dbname) {
            uri.push_str(&format!("/{dbname}"));
        }
        if let Some(options) = present(&self.options) {
            uri.push_str(&format!("?{options}"));
        }

        uri
    }
}
