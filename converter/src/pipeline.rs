//! One conversion, end to end.
//!
//! ```text
//! template text ──► TemplateDocument ──► endpoints, groups ─┐
//!                                                            ├─► merge ─► reconcile ─► assemble
//! feed text ──► detect ──► FeedDocument ──► endpoints ───────┘
//! ```
//!
//! Every request runs against its own [`Pipeline`] snapshot; nothing is
//! shared between conversions.

use crate::assemble::TemplateDocument;
use crate::config::{Config, MergePolicy};
use crate::detect::{FeedFormat, detect};
use crate::errors::{ConvertError, Stage};
use crate::feed::FeedDocument;
use crate::fetch::{Fetcher, ForwardedHeaders};
use crate::groups::reconcile;
use crate::merge::MergedEndpoints;
use crate::metrics_defs::{CONVERT_ENDPOINTS, FEED_FORMAT, RECORDS_DROPPED};
use serde_yaml::Mapping;
use url::Url;

/// Result of a successful conversion.
#[derive(Debug)]
pub struct Conversion {
    pub document: Mapping,
    pub feed_format: FeedFormat,
    /// Endpoints in the merged document.
    pub endpoints: usize,
    /// Malformed records dropped from the template and the feed.
    pub dropped: usize,
}

impl Conversion {
    pub fn to_yaml(&self) -> Result<String, ConvertError> {
        serde_yaml::to_string(&self.document).map_err(ConvertError::Serialize)
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    template_url: Url,
    policy: MergePolicy,
}

impl Pipeline {
    pub fn new(template_url: Url, policy: MergePolicy) -> Self {
        Pipeline {
            template_url,
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.template_url.clone(), config.merge.clone())
    }

    /// Fetches the template and the feed, then converts them.
    ///
    /// Both fetches run concurrently; the first failure aborts the other.
    /// The template is fetched with the fetcher's default headers, the feed
    /// with the client's forwarded ones.
    pub async fn run<F>(
        &self,
        fetcher: &F,
        feed_url: &Url,
        headers: &ForwardedHeaders,
    ) -> Result<Conversion, ConvertError>
    where
        F: Fetcher + ?Sized,
    {
        let template_default = ForwardedHeaders::default();
        let template = async {
            fetcher
                .fetch(&self.template_url, &template_default)
                .await
                .map_err(|source| ConvertError::Fetch {
                    stage: Stage::Template,
                    source,
                })
        };
        let feed = async {
            fetcher
                .fetch(feed_url, headers)
                .await
                .map_err(|source| ConvertError::Fetch {
                    stage: Stage::Feed,
                    source,
                })
        };

        let (template_text, feed_text) = tokio::try_join!(template, feed)?;
        self.convert(&template_text, &feed_text)
    }

    /// Merges feed text into template text. No I/O.
    pub fn convert(&self, template_text: &str, feed_text: &str) -> Result<Conversion, ConvertError> {
        let template = TemplateDocument::parse(template_text)?;

        let detected = detect(feed_text, &self.policy.markers);
        let feed_format = detected.format;
        shared::counter!(FEED_FORMAT, "format" => feed_format.as_str()).increment(1);

        let feed = FeedDocument::parse(&detected, self.policy.fixed_name.as_deref()).map_err(
            |source| ConvertError::Parse {
                stage: Stage::Feed,
                source,
            },
        )?;

        let template_endpoints = template.endpoints();
        let feed_endpoints = feed.endpoints();
        record_dropped("template", template_endpoints.dropped);
        record_dropped("feed", feed_endpoints.dropped);

        let merged = MergedEndpoints::merge(
            template_endpoints.endpoints,
            &feed_endpoints.endpoints,
            self.policy.surviving_name,
        );
        let groups = reconcile(
            template.groups(),
            &merged,
            &feed_endpoints.endpoints,
            &self.policy,
        );

        let endpoints = merged.len();
        shared::histogram!(CONVERT_ENDPOINTS).record(endpoints as f64);
        tracing::debug!(
            format = feed_format.as_str(),
            feed_endpoints = feed_endpoints.endpoints.len(),
            merged_endpoints = endpoints,
            "merged feed into template"
        );

        Ok(Conversion {
            document: template.assemble(&merged, groups),
            feed_format,
            endpoints,
            dropped: template_endpoints.dropped + feed_endpoints.dropped,
        })
    }
}

fn record_dropped(source: &'static str, dropped: usize) {
    if dropped > 0 {
        tracing::debug!(source, dropped, "dropped malformed records");
        shared::counter!(RECORDS_DROPPED, "source" => source).increment(dropped as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurvivingName;
    use crate::errors::FetchError;
    use crate::testutils::{MockFetcher, TEMPLATE, TEMPLATE_URL};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde_yaml::Value;

    fn pipeline(policy: MergePolicy) -> Pipeline {
        Pipeline::new(Url::parse(TEMPLATE_URL).unwrap(), policy)
    }

    fn manual_policy() -> MergePolicy {
        MergePolicy {
            manual_groups: vec!["🚀 Select".into()],
            ..MergePolicy::default()
        }
    }

    fn names(doc: &Mapping, field: &str) -> Vec<String> {
        doc.get(field)
            .and_then(Value::as_sequence)
            .unwrap()
            .iter()
            .map(|p| p.get("name").and_then(Value::as_str).unwrap().to_string())
            .collect()
    }

    fn group_members(doc: &Mapping, group: &str) -> Vec<String> {
        doc.get("proxy-groups")
            .and_then(Value::as_sequence)
            .unwrap()
            .iter()
            .find(|g| g.get("name").and_then(Value::as_str) == Some(group))
            .and_then(|g| g.get("proxies"))
            .and_then(Value::as_sequence)
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_convert_custom_lines() {
        let feed = "ss|1.2.3.4|443|aes-256-gcm|pw1\nss|1.2.3.4|443|aes-256-gcm|pw1\nbroken\n";
        let conversion = pipeline(manual_policy()).convert(TEMPLATE, feed).unwrap();

        assert_eq!(conversion.feed_format, FeedFormat::CustomLineFormat);
        assert_eq!(conversion.dropped, 1);
        assert_eq!(
            names(&conversion.document, "proxies"),
            ["🇭🇰 HK-01", "🇯🇵 JP-01", "1.2.3.4-443"]
        );
        assert_eq!(
            group_members(&conversion.document, "♻️ Auto"),
            ["1.2.3.4-443"]
        );
        assert_eq!(
            group_members(&conversion.document, "🚀 Select"),
            ["♻️ Auto", "🇭🇰 HK-01", "🇯🇵 JP-01", "DIRECT", "1.2.3.4-443"]
        );
        assert!(conversion.document.get("proxy-providers").is_none());
        assert!(conversion.document.get("rules").is_some());
    }

    #[test]
    fn test_convert_encoded_yaml_with_cosmetic_duplicates() {
        let feed_yaml = r#"
mixed-port: 7891
proxies:
  - {name: "HK 01", type: trojan, server: hk.new, port: 443, password: t}
  - {name: "KR 01", type: ss, server: kr.new, port: 8388, cipher: aes-128-gcm, password: k}
  - {name: "no port", server: x}
"#;
        let feed = STANDARD.encode(feed_yaml);

        let conversion = pipeline(manual_policy()).convert(TEMPLATE, &feed).unwrap();
        assert_eq!(conversion.feed_format, FeedFormat::EncodedStructuredYaml);
        assert_eq!(conversion.dropped, 1);
        assert_eq!(conversion.endpoints, 3);

        let doc = &conversion.document;
        assert_eq!(names(doc, "proxies"), ["HK 01", "🇯🇵 JP-01", "KR 01"]);
        assert_eq!(group_members(doc, "♻️ Auto"), ["HK 01", "KR 01"]);
        assert_eq!(
            group_members(doc, "🚀 Select"),
            ["♻️ Auto", "HK 01", "🇯🇵 JP-01", "DIRECT", "KR 01"]
        );

        // Template listener settings are kept; the feed's port is not merged in.
        assert_eq!(doc.get("mixed-port"), Some(&Value::from(7890u64)));
    }

    #[test]
    fn test_convert_keeps_template_names_when_configured() {
        let policy = MergePolicy {
            surviving_name: SurvivingName::Template,
            ..manual_policy()
        };
        let feed = "proxies:\n  - {name: HK 01, type: ss, server: hk.new, port: 1, password: p}\n";

        let conversion = pipeline(policy).convert(TEMPLATE, feed).unwrap();
        let doc = &conversion.document;
        assert_eq!(names(doc, "proxies"), ["🇭🇰 HK-01", "🇯🇵 JP-01"]);
        assert_eq!(group_members(doc, "♻️ Auto"), ["🇭🇰 HK-01"]);

        let hk = &doc.get("proxies").unwrap().as_sequence().unwrap()[0];
        assert_eq!(hk.get("server").and_then(Value::as_str), Some("hk.new"));
    }

    #[test]
    fn test_convert_empty_feed_passes_groups_through() {
        let template = "proxies: []\nproxy-groups:\n  - {name: G, type: select, proxies: [X]}\n";
        let conversion = pipeline(MergePolicy::default())
            .convert(template, "")
            .unwrap();

        assert_eq!(conversion.endpoints, 0);
        assert_eq!(group_members(&conversion.document, "G"), ["X"]);
    }

    #[test]
    fn test_convert_keeps_anchored_manual_group() {
        let template = r#"
pr: &pr {type: select, proxies: [A, B, DIRECT]}
proxies:
  - {name: A, type: ss, server: a, port: 1, password: p}
  - {name: B, type: ss, server: b, port: 1, password: p}
proxy-groups:
  - {name: Manual, <<: *pr}
"#;
        let policy = MergePolicy {
            manual_groups: vec!["Manual".into()],
            ..MergePolicy::default()
        };

        let conversion = pipeline(policy).convert(template, "ss|c|1||p\n").unwrap();
        let doc = &conversion.document;
        assert_eq!(group_members(doc, "Manual"), ["A", "B", "DIRECT", "c-1"]);

        let group = &doc.get("proxy-groups").unwrap().as_sequence().unwrap()[0];
        assert!(group.get("<<").is_none());
        assert_eq!(group.get("type").and_then(Value::as_str), Some("select"));
    }

    #[test]
    fn test_convert_invalid_feed_yaml() {
        let err = pipeline(MergePolicy::default())
            .convert(TEMPLATE, "proxies: [unclosed\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Parse {
                stage: Stage::Feed,
                ..
            }
        ));
    }

    #[test]
    fn test_output_is_yaml() {
        let conversion = pipeline(manual_policy())
            .convert(TEMPLATE, "ss|5.6.7.8|80||pw\n")
            .unwrap();
        let text = conversion.to_yaml().unwrap();

        let reparsed: Mapping = serde_yaml::from_str(&text).unwrap();
        assert_eq!(reparsed, conversion.document);
        assert!(text.contains("5.6.7.8-80"));
    }

    #[tokio::test]
    async fn test_run_fetches_both_documents() {
        let fetcher = MockFetcher::new()
            .with_body(TEMPLATE_URL, TEMPLATE)
            .with_body("https://feed.example/sub", "ss|1.1.1.1|1||p\n");
        let headers = ForwardedHeaders {
            user_agent: Some("clash.meta".into()),
            cookie: None,
        };

        let conversion = pipeline(manual_policy())
            .run(
                &fetcher,
                &Url::parse("https://feed.example/sub").unwrap(),
                &headers,
            )
            .await
            .unwrap();
        assert_eq!(conversion.endpoints, 3);

        let seen = fetcher.requests();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&(TEMPLATE_URL.to_string(), ForwardedHeaders::default())));
        assert!(seen.contains(&("https://feed.example/sub".to_string(), headers)));
    }

    #[tokio::test]
    async fn test_run_names_the_failed_fetch() {
        let fetcher = MockFetcher::new()
            .with_body(TEMPLATE_URL, TEMPLATE)
            .with_error("https://feed.example/sub", || FetchError::Timeout(15));

        let err = pipeline(MergePolicy::default())
            .run(
                &fetcher,
                &Url::parse("https://feed.example/sub").unwrap(),
                &ForwardedHeaders::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::Fetch {
                stage: Stage::Feed,
                source: FetchError::Timeout(15),
            }
        ));
        assert_eq!(err.to_string(), "fetching feed failed: timed out after 15 seconds");
    }
}
