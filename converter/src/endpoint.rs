use crate::canonical;
use crate::errors::MalformedRecord;
use serde_yaml::{Mapping, Value};

pub const DEFAULT_TYPE: &str = "ss";
pub const DEFAULT_CIPHER: &str = "aes-256-gcm";

/// One proxy node.
///
/// The well-known fields are typed; every other field of the source record
/// is carried verbatim in `extra`, in its original order.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoint {
    pub name: Option<String>,
    pub kind: String,
    pub server: String,
    pub port: u16,
    /// Defaulted for `ss` endpoints only; other protocols keep what they had.
    pub cipher: Option<String>,
    pub password: Option<String>,
    pub extra: Mapping,
}

impl Endpoint {
    /// Builds a shadowsocks-style endpoint from already split fields.
    pub fn new(
        name: String,
        kind: &str,
        server: &str,
        port: u16,
        cipher: &str,
        password: &str,
    ) -> Self {
        let kind = non_empty(kind).unwrap_or(DEFAULT_TYPE);
        let cipher = non_empty(cipher).unwrap_or(DEFAULT_CIPHER);

        Endpoint {
            name: Some(name),
            kind: kind.to_string(),
            server: server.to_string(),
            port,
            cipher: Some(cipher.to_string()),
            password: Some(password.to_string()),
            extra: Mapping::new(),
        }
    }

    /// Converts a `proxies` entry of a structured document.
    pub fn from_value(value: Value) -> Result<Self, MalformedRecord> {
        let Value::Mapping(mut map) = value else {
            return Err(MalformedRecord::NotAMapping);
        };

        let name = map.shift_remove("name").as_ref().and_then(scalar_string);
        let kind = map
            .shift_remove("type")
            .as_ref()
            .and_then(scalar_string)
            .unwrap_or_else(|| DEFAULT_TYPE.to_string());
        let server = map
            .shift_remove("server")
            .as_ref()
            .and_then(scalar_string)
            .filter(|s| !s.is_empty())
            .ok_or(MalformedRecord::MissingServer)?;
        let port = map
            .shift_remove("port")
            .ok_or(MalformedRecord::MissingPort)
            .and_then(|port| parse_port(&port))?;

        let mut cipher = map.shift_remove("cipher").as_ref().and_then(scalar_string);
        if cipher.is_none() && kind == DEFAULT_TYPE {
            cipher = Some(DEFAULT_CIPHER.to_string());
        }
        let password = map.shift_remove("password").as_ref().and_then(scalar_string);

        Ok(Endpoint {
            name,
            kind,
            server,
            port,
            cipher,
            password,
            extra: map,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Mapping::with_capacity(6 + self.extra.len());
        if let Some(name) = &self.name {
            map.insert("name".into(), name.as_str().into());
        }
        map.insert("type".into(), self.kind.as_str().into());
        map.insert("server".into(), self.server.as_str().into());
        map.insert("port".into(), self.port.into());
        if let Some(cipher) = &self.cipher {
            map.insert("cipher".into(), cipher.as_str().into());
        }
        if let Some(password) = &self.password {
            map.insert("password".into(), password.as_str().into());
        }
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        Value::Mapping(map)
    }

    /// Normalization key of the display name, `None` for unnamed endpoints.
    pub fn identity(&self) -> Option<String> {
        self.name.as_deref().map(canonical::identity)
    }
}

/// Parses a port given either as a YAML integer or a numeric string.
pub fn parse_port(value: &Value) -> Result<u16, MalformedRecord> {
    let port = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match port {
        Some(p @ 1..=65535) => Ok(p as u16),
        _ => Err(MalformedRecord::InvalidPort(display_scalar(value))),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn display_scalar(value: &Value) -> String {
    scalar_string(value).unwrap_or_else(|| format!("{value:?}"))
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}
