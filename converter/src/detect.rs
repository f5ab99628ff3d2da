//! Feed format detection.
//!
//! Structural markers are the only signal that a feed is a YAML document.
//! Base64 decoding is a candidate transformation applied before marker
//! inspection: a feed that merely happens to decode is not a config.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::borrow::Cow;

const PERMISSIVE_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedFormat {
    StructuredYaml,
    EncodedStructuredYaml,
    CustomLineFormat,
}

impl FeedFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::StructuredYaml => "yaml",
            FeedFormat::EncodedStructuredYaml => "base64_yaml",
            FeedFormat::CustomLineFormat => "custom_lines",
        }
    }
}

/// Classified feed together with the text downstream steps should parse.
#[derive(Debug, PartialEq, Eq)]
pub struct Detected<'a> {
    pub format: FeedFormat,
    pub text: Cow<'a, str>,
}

pub fn detect<'a, S: AsRef<str>>(raw: &'a str, markers: &[S]) -> Detected<'a> {
    if let Some(decoded) = decode_base64(raw)
        && contains_marker(&decoded, markers)
    {
        return Detected {
            format: FeedFormat::EncodedStructuredYaml,
            text: Cow::Owned(decoded),
        };
    }

    let format = if contains_marker(raw, markers) {
        FeedFormat::StructuredYaml
    } else {
        FeedFormat::CustomLineFormat
    };

    Detected {
        format,
        text: Cow::Borrowed(raw),
    }
}

fn contains_marker<S: AsRef<str>>(text: &str, markers: &[S]) -> bool {
    markers.iter().any(|m| text.contains(m.as_ref()))
}

/// Decodes standard-alphabet base64, ignoring ASCII whitespace and missing
/// padding. Returns `None` when the input is not base64 or not UTF-8.
fn decode_base64(raw: &str) -> Option<String> {
    let compact: Vec<u8> = raw
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return None;
    }

    let bytes = PERMISSIVE_STANDARD.decode(&compact).ok()?;
    String::from_utf8(bytes).ok()
}
