//! Maps non-2xx HTTP responses to the typed error taxonomy.

use serde_json::Value;

use crate::catalog::DeclaredError;
use crate::error::{truncate_str, SdkError, MAX_ERROR_BODY_CHARS};
use crate::result::lookup_path;
use crate::transport::HttpResponse;

/// Service error codes that mean "slow down and try again".
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
    "ServiceUnavailable",
];

/// Extracted fields of a service error body.
#[derive(Debug, Default)]
struct ParsedError {
    code: Option<String>,
    message: Option<String>,
    request_id: Option<String>,
}

/// Maps an error response to a typed error, deterministically.
///
/// Resolution order: throttling codes (or HTTP 429) → `Throttling`;
/// a code matching the operation's declared errors → `Service` with the
/// declared kind; any other parsed code → `Service` with the code as
/// kind; no recognizable code → generic `Http` wrapping status and a
/// truncated body.
pub(crate) fn map_service_error(response: &HttpResponse, declared: &[DeclaredError]) -> SdkError {
    let text = response.text();
    let parsed = parse_error_body(response, &text);
    let request_id = parsed
        .request_id
        .or_else(|| response.header("x-sdk-request-id").map(str::to_string));

    if let Some(code) = &parsed.code {
        let message = parsed
            .message
            .unwrap_or_else(|| truncate_str(&text, MAX_ERROR_BODY_CHARS).to_string());

        if THROTTLING_CODES.contains(&code.as_str()) || response.status == 429 {
            return SdkError::Throttling {
                code: code.clone(),
                message,
                request_id,
            };
        }

        let kind = declared
            .iter()
            .find(|d| {
                d.code == *code
                    && d.http_status.map_or(true, |status| status == response.status)
            })
            .map(|d| d.kind().to_string())
            .unwrap_or_else(|| code.clone());

        return SdkError::Service {
            kind,
            http_status: response.status,
            code: code.clone(),
            message,
            request_id,
        };
    }

    if response.status == 429 {
        return SdkError::Throttling {
            code: "TooManyRequests".to_string(),
            message: truncate_str(&text, MAX_ERROR_BODY_CHARS).to_string(),
            request_id,
        };
    }

    SdkError::Http {
        status: response.status,
        body: truncate_str(&text, MAX_ERROR_BODY_CHARS).to_string(),
    }
}

fn parse_error_body(response: &HttpResponse, text: &str) -> ParsedError {
    match response.content_type().as_deref() {
        Some(ct) if ct.contains("xml") => parse_xml_error(text),
        _ => parse_json_error(text),
    }
}

fn parse_json_error(text: &str) -> ParsedError {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return ParsedError::default(),
    };
    ParsedError {
        code: first_string(&value, &["Code", "code", "__type"]).map(strip_type_prefix),
        message: first_string(&value, &["Message", "message", "ErrorMessage"]),
        request_id: first_string(&value, &["RequestId", "requestId", "RequestID"]),
    }
}

fn parse_xml_error(text: &str) -> ParsedError {
    // Error documents are either <Error>...</Error> or wrap one inside a
    // response root; try both shapes.
    let value = match crate::result::xml_to_value(text) {
        Ok(value) => value,
        Err(_) => return ParsedError::default(),
    };
    let error = lookup_path(&value, "Error").unwrap_or(&value);
    ParsedError {
        code: lookup_path(error, "Code")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: lookup_path(error, "Message")
            .and_then(Value::as_str)
            .map(str::to_string),
        request_id: lookup_path(&value, "RequestId")
            .or_else(|| lookup_path(error, "RequestId"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Strips a `namespace#` prefix from `__type`-style codes.
fn strip_type_prefix(code: String) -> String {
    match code.rsplit_once('#') {
        Some((_, short)) => short.to_string(),
        None => code,
    }
}
