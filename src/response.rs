use lambda_http::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

const HEALTH_MESSAGE: &str = "Health check successful";
const SERIALIZATION_FAILURE: &str = r#"{"Message":"Internal Server Error"}"#;

/// Status, headers and JSON text of one response, before it is handed to
/// the Lambda HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Envelope {
    fn json(status_code: u16, body: String) -> Self {
        let headers =
            HashMap::from([(CONTENT_TYPE.to_string(), "application/json".to_string())]);
        Envelope { status_code, headers, body }
    }
}

impl From<Envelope> for Response<Body> {
    fn from(envelope: Envelope) -> Self {
        let mut response = Response::new(Body::Text(envelope.body));
        *response.status_mut() =
            StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        for (name, value) in envelope.headers {
            if let (Ok(name), Ok(value)) =
                (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str()))
            {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

/// Wraps `body` in an envelope; `None` yields the health-check payload.
///
/// Decimal values must reach this point with float serialization
/// (`rust_decimal::serde::float`), so numbers are never emitted as strings.
pub fn build<T: Serialize + ?Sized>(status_code: u16, body: Option<&T>) -> Envelope {
    let encoded = match body {
        Some(body) => serde_json::to_string(body),
        None => serde_json::to_string(&json!({ "message": HEALTH_MESSAGE })),
    };

    match encoded {
        Ok(text) => Envelope::json(status_code, text),
        Err(e) => {
            tracing::error!(status_code, error = %e, "failed to encode response body");
            Envelope::json(500, SERIALIZATION_FAILURE.to_string())
        }
    }
}

pub fn health() -> Envelope {
    build::<()>(200, None)
}

pub fn message(status_code: u16, text: &str) -> Envelope {
    build(status_code, Some(&json!({ "Message": text })))
}

pub fn not_found_route() -> Envelope {
    build(404, Some("Not Found"))
}
