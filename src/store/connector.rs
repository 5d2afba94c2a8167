//! Connection handles.
//!
//! `new_engine` turns connection settings into an `Engine`: a validated,
//! reusable handle that has not touched the network yet. `Engine::connect`
//! opens a live `Session`.

use std::fmt;
use std::str::FromStr;

use postgres::NoTls;
use serde::Deserialize;

use crate::model::PipelineError;
use crate::store::pg::Session;

const DEFAULT_PORT: u16 = 5432;
const APPLICATION_NAME: &str = "weather_pipeline";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
}

impl FromStr for Dialect {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(PipelineError::ConnectionConfig(format!(
                "unsupported dialect '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

/// Where the store lives and how to authenticate.
///
/// With `integrated_security` set, `user` and `password` are ignored and
/// the session authenticates as the OS login (peer/trust/GSS on the
/// server side).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub dialect: String,
    pub server: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub integrated_security: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            dialect: "postgres".to_string(),
            server: "localhost".to_string(),
            port: None,
            database: "Weather".to_string(),
            user: None,
            password: None,
            integrated_security: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A configured but not yet opened handle to the store.
#[derive(Clone)]
pub struct Engine {
    dialect: Dialect,
    pairs: Vec<(&'static str, String)>,
    connection_string: String,
    config: postgres::Config,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.dialect)
            .field("connection", &self.redacted_connection_string())
            .finish()
    }
}

/// Builds an `Engine` from settings, resolving the trusted-connection
/// user from the OS login.
pub fn new_engine(settings: &ConnectionSettings) -> Result<Engine, PipelineError> {
    Engine::with_os_user(settings, os_login())
}

impl Engine {
    /// Like `new_engine` with the OS login supplied by the caller.
    pub fn with_os_user(
        settings: &ConnectionSettings,
        os_user: Option<String>,
    ) -> Result<Engine, PipelineError> {
        let dialect: Dialect = settings.dialect.parse()?;
        let pairs = connection_pairs(settings, os_user)?;
        let connection_string = render(&pairs, false);
        let config = connection_string.parse::<postgres::Config>().map_err(|e| {
            PipelineError::ConnectionConfig(format!("invalid connection string: {}", e))
        })?;

        Ok(Engine {
            dialect,
            pairs,
            connection_string,
            config,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The key/value connection string this engine connects with.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Connection string with any password masked, for logs.
    pub fn redacted_connection_string(&self) -> String {
        render(&self.pairs, true)
    }

    /// Opens a live session. The session closes when dropped.
    pub fn connect(&self) -> Result<Session, PipelineError> {
        let client = self
            .config
            .connect(NoTls)
            .map_err(|e| PipelineError::Connection(e.to_string()))?;
        Ok(Session::new(client))
    }
}

// ---------------------------------------------------------------------------
// Connection string construction
// ---------------------------------------------------------------------------

fn os_login() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
}

/// Builds a libpq key/value connection string.
pub fn build_connection_string(
    settings: &ConnectionSettings,
    os_user: Option<String>,
) -> Result<String, PipelineError> {
    connection_pairs(settings, os_user).map(|pairs| render(&pairs, false))
}

fn connection_pairs(
    settings: &ConnectionSettings,
    os_user: Option<String>,
) -> Result<Vec<(&'static str, String)>, PipelineError> {
    let server = required("server", &settings.server)?;
    let database = required("database", &settings.database)?;

    let (user, password) = if settings.integrated_security {
        let user = os_user.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            PipelineError::ConnectionConfig(
                "integrated security requested but no OS login is available".to_string(),
            )
        })?;
        (user, None)
    } else {
        let user = settings
            .user
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                PipelineError::ConnectionConfig(
                    "user is required when integrated security is off".to_string(),
                )
            })?;
        (user.to_string(), settings.password.clone())
    };

    let mut pairs = vec![
        ("host", server.to_string()),
        ("port", settings.port.unwrap_or(DEFAULT_PORT).to_string()),
        ("dbname", database.to_string()),
        ("user", user),
    ];
    if let Some(password) = password {
        pairs.push(("password", password));
    }
    pairs.push(("application_name", APPLICATION_NAME.to_string()));

    Ok(pairs)
}

fn render(pairs: &[(&'static str, String)], redact: bool) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            if redact && *key == "password" {
                format!("{}=***", key)
            } else {
                format!("{}={}", key, quote_value(value))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::ConnectionConfig(format!("missing {}", field)));
    }
    Ok(trimmed)
}

/// Quotes a libpq value when it is empty or contains whitespace, quotes
/// or backslashes.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn trusted(server: &str, database: &str) -> ConnectionSettings {
        ConnectionSettings {
            server: server.to_string(),
            database: database.to_string(),
            ..ConnectionSettings::default()
        }
    }

    #[test]
    fn test_trusted_connection_string_uses_os_login() {
        let engine = Engine::with_os_user(&trusted("test_server", "test_db"), Some("alice".into()))
            .expect("trusted settings should build");
        assert_eq!(
            engine.connection_string(),
            "host=test_server port=5432 dbname=test_db user=alice application_name=weather_pipeline"
        );
        assert_eq!(engine.dialect(), Dialect::Postgres);
    }

    #[test]
    fn test_trusted_mode_ignores_explicit_credentials() {
        let settings = ConnectionSettings {
            user: Some("sa".into()),
            password: Some("secret".into()),
            ..trusted("db1", "Weather")
        };
        let conn = build_connection_string(&settings, Some("svc".into())).unwrap();
        assert!(conn.contains("user=svc"));
        assert!(!conn.contains("password"), "trusted mode must not send a password: {}", conn);
    }

    #[test]
    fn test_trusted_mode_without_os_login_fails() {
        let err = build_connection_string(&trusted("db1", "Weather"), None).unwrap_err();
        assert!(matches!(err, PipelineError::ConnectionConfig(_)));
    }

    #[test]
    fn test_explicit_credentials_mode() {
        let settings = ConnectionSettings {
            port: Some(6543),
            user: Some("weather_app".into()),
            password: Some("p@ss word".into()),
            integrated_security: false,
            ..trusted("db.internal", "Weather")
        };
        let engine = Engine::with_os_user(&settings, None).expect("credentials should build");
        assert_eq!(
            engine.connection_string(),
            "host=db.internal port=6543 dbname=Weather user=weather_app password='p@ss word' \
             application_name=weather_pipeline"
        );
        let redacted = engine.redacted_connection_string();
        assert!(redacted.contains("password=***"));
        assert!(!redacted.contains("p@ss"), "password leaked: {}", redacted);
    }

    #[test]
    fn test_explicit_credentials_require_user() {
        let settings = ConnectionSettings {
            integrated_security: false,
            ..trusted("db1", "Weather")
        };
        let err = Engine::with_os_user(&settings, Some("alice".into())).unwrap_err();
        assert!(matches!(err, PipelineError::ConnectionConfig(_)));
    }

    #[test]
    fn test_missing_server_or_database_is_config_error() {
        for settings in [trusted("", "Weather"), trusted("db1", "   ")] {
            let err = Engine::with_os_user(&settings, Some("alice".into())).unwrap_err();
            assert!(
                matches!(err, PipelineError::ConnectionConfig(_)),
                "expected ConnectionConfig, got {:?}",
                err
            );
        }
    }

    #[test]
    fn test_unsupported_dialect_is_config_error() {
        let settings = ConnectionSettings {
            dialect: "mssql".into(),
            ..trusted("db1", "Weather")
        };
        let err = Engine::with_os_user(&settings, Some("alice".into())).unwrap_err();
        assert_eq!(
            err,
            PipelineError::ConnectionConfig("unsupported dialect 'mssql'".into())
        );
    }

    #[test]
    fn test_quote_value_escapes_quotes_and_backslashes() {
        assert_eq!(quote_value("plain"), "plain");
        assert_eq!(quote_value(""), "''");
        assert_eq!(quote_value("it's"), "'it\\'s'");
        assert_eq!(quote_value("a\\b"), "'a\\\\b'");
    }
}
