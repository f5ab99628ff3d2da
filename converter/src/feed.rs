use crate::detect::{Detected, FeedFormat};
use crate::endpoint::{Endpoint, parse_port};
use crate::errors::MalformedRecord;
use serde_yaml::{Mapping, Value};

/// Parsed subscription feed.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedDocument {
    root: Value,
    /// Custom-format lines that could not become an endpoint.
    dropped_lines: usize,
}

impl FeedDocument {
    /// Parses detected feed text.
    ///
    /// Custom-format lines that cannot become an endpoint are dropped here;
    /// only a syntactically invalid YAML document is an error.
    pub fn parse(
        detected: &Detected<'_>,
        fixed_name: Option<&str>,
    ) -> Result<Self, serde_yaml::Error> {
        match detected.format {
            FeedFormat::StructuredYaml | FeedFormat::EncodedStructuredYaml => {
                Self::from_yaml(&detected.text)
            }
            FeedFormat::CustomLineFormat => Ok(Self::from_lines(&detected.text, fixed_name)),
        }
    }

    /// Parses a structured feed. `<<` merge keys are resolved.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        let mut root: Value = serde_yaml::from_str(text)?;
        root.apply_merge()?;

        if let Value::Mapping(map) = &mut root
            && let Some(port) = map.shift_remove("mixed-port")
        {
            map.insert("port".into(), port);
        }

        Ok(FeedDocument {
            root,
            dropped_lines: 0,
        })
    }

    /// Synthesizes `{ proxies: [...] }` from `type|server|port|cipher|password` lines.
    pub fn from_lines(text: &str, fixed_name: Option<&str>) -> Self {
        let mut proxies = Vec::new();
        let mut dropped_lines = 0;

        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match parse_line(line, fixed_name) {
                Ok(endpoint) => proxies.push(endpoint.to_value()),
                Err(reason) => {
                    tracing::debug!(%reason, "dropping feed line");
                    dropped_lines += 1;
                }
            }
        }

        let mut root = Mapping::new();
        root.insert("proxies".into(), Value::Sequence(proxies));
        FeedDocument {
            root: Value::Mapping(root),
            dropped_lines,
        }
    }

    /// Converts the feed's `proxies` into endpoints, in feed order.
    /// Lines dropped while parsing are counted in the result.
    pub fn endpoints(&self) -> ParsedEndpoints {
        let mut parsed = endpoints_from(self.root.as_mapping().and_then(|m| m.get("proxies")));
        parsed.dropped += self.dropped_lines;
        parsed
    }
}

/// Endpoints extracted from a `proxies` sequence.
#[derive(Debug, Default)]
pub struct ParsedEndpoints {
    pub endpoints: Vec<Endpoint>,
    /// Records dropped as malformed.
    pub dropped: usize,
}

/// Converts a `proxies` value into endpoints, dropping malformed records.
pub fn endpoints_from(proxies: Option<&Value>) -> ParsedEndpoints {
    let Some(Value::Sequence(items)) = proxies else {
        return ParsedEndpoints::default();
    };

    let mut parsed = ParsedEndpoints::default();
    for item in items {
        match Endpoint::from_value(item.clone()) {
            Ok(endpoint) => parsed.endpoints.push(endpoint),
            Err(reason) => {
                tracing::debug!(%reason, "dropping proxy record");
                parsed.dropped += 1;
            }
        }
    }
    parsed
}

fn parse_line(line: &str, fixed_name: Option<&str>) -> Result<Endpoint, MalformedRecord> {
    let fields: Vec<&str> = line.split('|').collect();
    let &[kind, server, port, cipher, password, ..] = fields.as_slice() else {
        return Err(MalformedRecord::TooFewFields(fields.len()));
    };

    if server.is_empty() {
        return Err(MalformedRecord::MissingServer);
    }
    let port = parse_port(&Value::from(port))?;

    let name = match fixed_name {
        Some(name) => name.to_string(),
        None => format!("{server}-{port}"),
    };

    Ok(Endpoint::new(name, kind, server, port, cipher, password))
}
