//! Metrics definitions for the converter.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CONVERT_REQUESTS: MetricDef = MetricDef {
    name: "convert.requests",
    metric_type: MetricType::Counter,
    description: "Conversion requests. Tagged with status (ok, fetch, parse, template, serialize).",
};

pub const CONVERT_DURATION: MetricDef = MetricDef {
    name: "convert.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch, merge and serialize one conversion in seconds",
};

pub const CONVERT_ENDPOINTS: MetricDef = MetricDef {
    name: "convert.endpoints",
    metric_type: MetricType::Histogram,
    description: "Number of endpoints in the merged document",
};

pub const RECORDS_DROPPED: MetricDef = MetricDef {
    name: "convert.records_dropped",
    metric_type: MetricType::Counter,
    description: "Malformed endpoint records dropped. Tagged with source (template, feed).",
};

pub const FEED_FORMAT: MetricDef = MetricDef {
    name: "convert.feed_format",
    metric_type: MetricType::Counter,
    description: "Detected feed formats. Tagged with format.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CONVERT_REQUESTS,
    CONVERT_DURATION,
    CONVERT_ENDPOINTS,
    RECORDS_DROPPED,
    FEED_FORMAT,
];
