use crate::errors::ConverterError;
use crate::fetch::{Fetcher, ForwardedHeaders};
use crate::metrics_defs::{CONVERT_DURATION, CONVERT_REQUESTS};
use crate::pipeline::Pipeline;
use http::header::{CONTENT_TYPE, COOKIE, HeaderName, LOCATION, USER_AGENT};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use shared::http::{make_boxed_error_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

const YAML_CONTENT_TYPE: &str = "text/yaml; charset=utf-8";
const MISSING_URL: &str = "missing url parameter, e.g. ?url=<subscription url>";

type ConverterResponse = Response<BoxBody<Bytes, ConverterError>>;

/// Public conversion endpoint.
///
/// `GET /?url=...` converts the feed, `GET /proxy?url=...` redirects to it.
pub struct ConverterService {
    pipeline: Arc<Pipeline>,
    fetcher: Arc<dyn Fetcher>,
}

impl ConverterService {
    pub fn new(pipeline: Pipeline, fetcher: Arc<dyn Fetcher>) -> Self {
        ConverterService {
            pipeline: Arc::new(pipeline),
            fetcher,
        }
    }
}

impl Service<Request<Incoming>> for ConverterService {
    type Response = ConverterResponse;
    type Error = ConverterError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        // Only the request line and headers matter; the body is never read.
        let (parts, _body) = req.into_parts();
        let pipeline = self.pipeline.clone();
        let fetcher = self.fetcher.clone();

        Box::pin(async move { Ok(handle(&pipeline, fetcher.as_ref(), parts).await) })
    }
}

async fn handle(pipeline: &Pipeline, fetcher: &dyn Fetcher, parts: Parts) -> ConverterResponse {
    if parts.method != Method::GET {
        return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    match parts.uri.path() {
        "/" => {
            let feed_url = match feed_url(parts.uri.query()) {
                Ok(url) => url,
                Err(response) => return response,
            };
            convert(pipeline, fetcher, &feed_url, forwarded_headers(&parts.headers)).await
        }
        "/proxy" => match feed_url(parts.uri.query()) {
            Ok(url) => redirect(&url),
            Err(response) => response,
        },
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}

async fn convert(
    pipeline: &Pipeline,
    fetcher: &dyn Fetcher,
    feed_url: &Url,
    headers: ForwardedHeaders,
) -> ConverterResponse {
    let start = Instant::now();
    let result = pipeline
        .run(fetcher, feed_url, &headers)
        .await
        .and_then(|conversion| Ok((conversion.to_yaml()?, conversion)));
    shared::histogram!(CONVERT_DURATION).record(start.elapsed().as_secs_f64());

    match result {
        Ok((body, conversion)) => {
            shared::counter!(CONVERT_REQUESTS, "status" => "ok").increment(1);
            tracing::info!(
                feed = %redacted(feed_url),
                format = conversion.feed_format.as_str(),
                endpoints = conversion.endpoints,
                dropped = conversion.dropped,
                "converted feed"
            );

            let mut response = make_text_response(StatusCode::OK, body);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(YAML_CONTENT_TYPE));
            response
        }
        Err(e) => {
            shared::counter!(CONVERT_REQUESTS, "status" => e.kind()).increment(1);
            tracing::error!(feed = %redacted(feed_url), error = %e, "conversion failed");
            make_text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("conversion failed: {e}"),
            )
        }
    }
}

/// Extracts and validates the `url` query parameter.
#[allow(clippy::result_large_err)]
fn feed_url(query: Option<&str>) -> Result<Url, ConverterResponse> {
    let raw = query
        .into_iter()
        .flat_map(|q| url::form_urlencoded::parse(q.as_bytes()))
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| make_text_response(StatusCode::BAD_REQUEST, MISSING_URL))?;

    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => Err(make_text_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported url scheme: {}", url.scheme()),
        )),
        Err(e) => Err(make_text_response(
            StatusCode::BAD_REQUEST,
            format!("invalid url parameter: {e}"),
        )),
    }
}

fn forwarded_headers(headers: &HeaderMap) -> ForwardedHeaders {
    let value = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    ForwardedHeaders {
        user_agent: value(USER_AGENT),
        cookie: value(COOKIE),
    }
}

fn redirect(url: &Url) -> ConverterResponse {
    let mut response = Response::new(Full::new(Bytes::new()).map_err(|e| match e {}).boxed());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(location) = HeaderValue::from_str(url.as_str()) {
        response.headers_mut().insert(LOCATION, location);
    }
    response
}

/// Feed URLs usually embed an access token; only the origin is logged.
fn redacted(url: &Url) -> String {
    url.origin().ascii_serialization()
}
