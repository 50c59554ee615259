use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use tether_core::database::{DEFAULT_DATABASE_NAME, DatabaseConfig};

use crate::error::ServerError;

pub const HOST_VAR: &str = "TETHER_HOST";
pub const PORT_VAR: &str = "TETHER_PORT";
pub const DB_NAME_VAR: &str = "TETHER_DB_NAME";
pub const DB_ECHO_VAR: &str = "TETHER_DB_ECHO";
pub const SESSION_MODE_VAR: &str = "TETHER_SESSION_MODE";

const DEFAULT_PORT: u16 = 8000;

/// How the `/` handler gets its session to the query helpers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionMode {
    /// One scoped session per request, passed to every helper as an argument.
    #[default]
    Explicit,
    /// Session registered under the handler's task identity and looked up by
    /// the helpers.
    Ambient,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Ambient => "ambient",
        }
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Self::Explicit),
            "ambient" => Ok(Self::Ambient),
            _ => Err("expected 'explicit' or 'ambient'".to_string()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database: DatabaseConfig,
    pub session_mode: SessionMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            database: DatabaseConfig {
                name: DEFAULT_DATABASE_NAME.to_string(),
                echo: true,
            },
            session_mode: SessionMode::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset or
    /// blank variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = read(HOST_VAR) {
            config.host = parse_var(HOST_VAR, &raw)?;
        }
        if let Some(raw) = read(PORT_VAR) {
            config.port = parse_var(PORT_VAR, &raw)?;
        }
        if let Some(raw) = read(DB_NAME_VAR) {
            config.database.name = raw.trim().to_string();
        }
        if let Some(raw) = read(DB_ECHO_VAR) {
            config.database.echo = parse_bool(DB_ECHO_VAR, &raw)?;
        }
        if let Some(raw) = read(SESSION_MODE_VAR) {
            config.session_mode = parse_var(SESSION_MODE_VAR, &raw)?;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_var<T>(variable: &'static str, raw: &str) -> Result<T, ServerError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.trim()
        .parse()
        .map_err(|error: T::Err| ServerError::InvalidConfig {
            variable,
            value: raw.to_string(),
            reason: error.to_string(),
        })
}

fn parse_bool(variable: &'static str, raw: &str) -> Result<bool, ServerError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServerError::InvalidConfig {
            variable,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
