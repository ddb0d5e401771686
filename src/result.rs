//! Uniform structured-access wrapper over parsed response data.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::catalog::{FieldSource, PayloadFormat, ResultShape};
use crate::error::{Result, SdkError};
use crate::transport::HttpResponse;

/// Parsed, immutable result of one executed operation.
///
/// `data` is always a JSON object at the top level; non-object payloads
/// are wrapped under a `Body` key.
#[derive(Debug, Clone)]
pub struct ServiceResult {
    data: Value,
    status: u16,
}

impl ServiceResult {
    /// Builds a result by applying `shape` to a raw response.
    ///
    /// The body is parsed per the declared payload format; field rules then
    /// overlay header-sourced and status-sourced values. An empty field map
    /// keeps the whole parsed body as the result data.
    pub fn from_response(response: &HttpResponse, shape: &ResultShape) -> Result<Self> {
        let parsed = parse_body(response, shape.payload)?;

        if shape.fields.is_empty() {
            return Ok(Self {
                data: parsed,
                status: response.status,
            });
        }

        let mut data = Map::new();
        for (name, source) in &shape.fields {
            let value = match source {
                FieldSource::Header(header) => {
                    response.header(header).map(|v| Value::String(v.to_string()))
                }
                FieldSource::StatusCode => Some(Value::from(response.status)),
                FieldSource::BodyPath(path) => lookup_path(&parsed, path).cloned(),
                FieldSource::Body => Some(parsed.clone()),
            };
            // Absent sources simply leave the key out; get_path on the
            // missing key then returns None, never an error.
            if let Some(value) = value {
                data.insert(name.clone(), value);
            }
        }
        Ok(Self {
            data: Value::Object(data),
            status: response.status,
        })
    }

    /// Wraps an already-structured value, normalizing non-objects.
    pub fn from_value(value: Value) -> Self {
        Self {
            data: wrap_object(value),
            status: 200,
        }
    }

    /// Empty result carrying an explicit HTTP status.
    pub(crate) fn empty_with_status(status: u16) -> Self {
        Self {
            data: Value::Object(Map::new()),
            status,
        }
    }

    /// HTTP status of the response this result was parsed from.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Single-level access to a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Slash-delimited nested lookup; numeric segments index arrays.
    ///
    /// Total: returns `None` (not an error) when any segment of the path
    /// is absent, at any depth. An empty path yields the whole data.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.data, path)
    }

    /// Top-level field names in insertion order.
    pub fn keys(&self) -> Vec<&str> {
        match &self.data {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_data(self) -> Value {
        self.data
    }
}

/// Nested lookup into any value. Shared with the waiter and paginator.
pub(crate) fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('/') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn wrap_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => {
            let mut map = Map::new();
            map.insert("Body".to_string(), other);
            Value::Object(map)
        }
    }
}

fn parse_body(response: &HttpResponse, payload: PayloadFormat) -> Result<Value> {
    match payload {
        PayloadFormat::Json => {
            if response.body.is_empty() {
                Ok(Value::Object(Map::new()))
            } else {
                let value: Value = serde_json::from_slice(&response.body)?;
                Ok(wrap_object(value))
            }
        }
        PayloadFormat::Xml => Ok(wrap_object(xml_to_value(&response.text())?)),
        PayloadFormat::Raw => Ok(wrap_object(Value::String(response.text()))),
    }
}

/// Converts an XML document into a JSON-shaped value.
///
/// Element children become object fields, repeated sibling names collapse
/// into arrays, and text-only elements become strings. The root element's
/// own name is dropped so result paths start at its children.
pub(crate) fn xml_to_value(text: &str) -> Result<Value> {
    let mut reader = Reader::from_reader(text.as_bytes());
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => return parse_xml_element(&mut reader),
            Ok(Event::Eof) => return Ok(Value::Object(Map::new())),
            Err(e) => return Err(SdkError::Config(format!("invalid XML response: {}", e))),
            _ => {}
        }
    }
}

fn parse_xml_element(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut children: Map<String, Value> = Map::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let child = parse_xml_element(reader)?;
                insert_xml_child(&mut children, name, child);
            }
            Ok(Event::Empty(empty)) => {
                let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                insert_xml_child(&mut children, name, Value::Null);
            }
            Ok(Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| SdkError::Config(format!("invalid XML response: {}", e)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::End(_)) | Ok(Event::Eof) => break,
            Err(e) => return Err(SdkError::Config(format!("invalid XML response: {}", e))),
            _ => {}
        }
    }

    if children.is_empty() {
        Ok(Value::String(text.trim().to_string()))
    } else {
        Ok(Value::Object(children))
    }
}

fn insert_xml_child(children: &mut Map<String, Value>, name: String, child: Value) {
    match children.get_mut(&name) {
        None => {
            children.insert(name, child);
        }
        Some(Value::Array(items)) => items.push(child),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, child]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResultShape;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn json_response(status: u16, body: &str) -> HttpResponse {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("x-sdk-request-id".to_string(), "req-42".to_string());
        HttpResponse {
            status,
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn whole_body_kept_when_shape_has_no_fields() {
        let response = json_response(200, r#"{"TableName": "users", "Count": 3}"#);
        let result = ServiceResult::from_response(&response, &ResultShape::default()).unwrap();
        assert_eq!(result.get("TableName"), Some(&json!("users")));
        assert_eq!(result.keys(), vec!["TableName", "Count"]);
    }

    #[test]
    fn fields_overlay_headers_and_status() {
        let mut shape = ResultShape::default();
        shape
            .fields
            .insert("RequestId".into(), FieldSource::Header("x-sdk-request-id".into()));
        shape.fields.insert("Status".into(), FieldSource::StatusCode);
        shape
            .fields
            .insert("Count".into(), FieldSource::BodyPath("Count".into()));

        let response = json_response(200, r#"{"Count": 3}"#);
        let result = ServiceResult::from_response(&response, &shape).unwrap();
        assert_eq!(result.get("RequestId"), Some(&json!("req-42")));
        assert_eq!(result.get("Status"), Some(&json!(200)));
        assert_eq!(result.get("Count"), Some(&json!(3)));
    }

    #[test]
    fn absent_field_source_leaves_key_out() {
        let mut shape = ResultShape::default();
        shape
            .fields
            .insert("Missing".into(), FieldSource::Header("x-not-there".into()));
        let response = json_response(200, "{}");
        let result = ServiceResult::from_response(&response, &shape).unwrap();
        assert_eq!(result.get("Missing"), None);
    }

    #[test]
    fn get_path_is_total() {
        let result = ServiceResult::from_value(json!({
            "Contents": [
                {"Key": "a.txt", "Size": 10},
                {"Key": "b.txt", "Size": 20}
            ],
            "Name": "bucket"
        }));

        assert_eq!(result.get_path("Contents/1/Key"), Some(&json!("b.txt")));
        assert_eq!(result.get_path("Contents/0/Size"), Some(&json!(10)));
        assert_eq!(result.get_path("Name"), Some(&json!("bucket")));
        // Misses at any depth are None, never an error.
        assert_eq!(result.get_path("Contents/9/Key"), None);
        assert_eq!(result.get_path("Contents/one/Key"), None);
        assert_eq!(result.get_path("Nope/deeper/still"), None);
        assert_eq!(result.get_path("Name/child"), None);
    }

    #[test]
    fn empty_path_yields_whole_data() {
        let result = ServiceResult::from_value(json!({"A": 1}));
        assert_eq!(result.get_path(""), Some(result.data()));
    }

    #[test]
    fn empty_json_body_is_empty_object() {
        let response = json_response(204, "");
        let result = ServiceResult::from_response(&response, &ResultShape::default()).unwrap();
        assert!(result.keys().is_empty());
    }

    #[test]
    fn non_object_json_wrapped_under_body() {
        let response = json_response(200, r#"[1, 2, 3]"#);
        let result = ServiceResult::from_response(&response, &ResultShape::default()).unwrap();
        assert_eq!(result.get_path("Body/1"), Some(&json!(2)));
    }

    #[test]
    fn raw_payload_wrapped_under_body() {
        let shape = ResultShape {
            payload: PayloadFormat::Raw,
            fields: BTreeMap::new(),
        };
        let response = json_response(200, "plain text payload");
        let result = ServiceResult::from_response(&response, &shape).unwrap();
        assert_eq!(result.get("Body"), Some(&json!("plain text payload")));
    }

    #[test]
    fn xml_payload_parses_nested_and_repeated_elements() {
        let shape = ResultShape {
            payload: PayloadFormat::Xml,
            fields: BTreeMap::new(),
        };
        let xml = r#"<?xml version="1.0"?>
            <ListBucketResult>
                <Name>my-bucket</Name>
                <IsTruncated>true</IsTruncated>
                <Contents><Key>a.txt</Key><Size>10</Size></Contents>
                <Contents><Key>b.txt</Key><Size>20</Size></Contents>
            </ListBucketResult>"#;
        let response = HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: xml.as_bytes().to_vec(),
        };
        let result = ServiceResult::from_response(&response, &shape).unwrap();
        assert_eq!(result.get("Name"), Some(&json!("my-bucket")));
        assert_eq!(result.get("IsTruncated"), Some(&json!("true")));
        assert_eq!(result.get_path("Contents/0/Key"), Some(&json!("a.txt")));
        assert_eq!(result.get_path("Contents/1/Size"), Some(&json!("20")));
    }

    #[test]
    fn xml_escapes_are_unescaped() {
        let shape = ResultShape {
            payload: PayloadFormat::Xml,
            fields: BTreeMap::new(),
        };
        let response = HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: b"<R><Msg>a &amp; b</Msg></R>".to_vec(),
        };
        let result = ServiceResult::from_response(&response, &shape).unwrap();
        assert_eq!(result.get("Msg"), Some(&json!("a & b")));
    }
}
