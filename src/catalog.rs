//! Data-driven operation catalog: descriptors, waiters, and pagination rules.
//!
//! A catalog is a static JSON document describing every operation a service
//! exposes: its HTTP binding, parameter schema, result extraction rules, and
//! declared error codes. The catalog is data, never code; the [`Registry`]
//! loads it once at client construction and is read-only afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SdkError};

/// Where a parameter is placed in the outgoing HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// Rendered as an HTTP header.
    Header,
    /// Rendered into the query string.
    Query,
    /// Substituted into the URI template.
    Uri,
    /// Form-encoded into the request body.
    Body,
    /// Merged into a JSON request body.
    Json,
}

/// Declared value type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Boolean,
    List,
    Structure,
}

/// Schema for a single operation parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    pub location: ParamLocation,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    /// Name used on the wire (header/query key). Defaults to the parameter name.
    #[serde(default)]
    pub wire_name: Option<String>,
    /// Closed set of allowed string values.
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    /// Inclusive lower bound for integer parameters.
    #[serde(default)]
    pub min: Option<i64>,
    /// Inclusive upper bound for integer parameters.
    #[serde(default)]
    pub max: Option<i64>,
    /// Regex the full string value must match.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Compiled form of `pattern`, filled once at registry load.
    #[serde(skip)]
    pub(crate) pattern_regex: Option<Regex>,
}

impl ParamSpec {
    /// Wire key for this parameter, falling back to its declared name.
    pub fn wire_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.wire_name.as_deref().unwrap_or(name)
    }
}

/// How the response body is parsed before field extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Xml,
    Raw,
}

/// Source of a single extracted result field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Copy a response header value.
    Header(String),
    /// The numeric HTTP status of the response.
    StatusCode,
    /// A slash-delimited path into the parsed body.
    BodyPath(String),
    /// The entire parsed body.
    Body,
}

/// Rules for turning a raw HTTP response into a structured result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultShape {
    #[serde(default)]
    pub payload: PayloadFormat,
    /// Extracted fields, keyed by the result field name. When empty, the
    /// whole parsed body becomes the result data.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSource>,
}

/// An error code the operation is declared to raise.
#[derive(Debug, Clone, Deserialize)]
pub struct DeclaredError {
    #[serde(default)]
    pub http_status: Option<u16>,
    pub code: String,
    /// Taxonomy kind; defaults to the code itself.
    #[serde(default)]
    pub kind: Option<String>,
}

impl DeclaredError {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.code)
    }
}

/// Static schema of one remote operation.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationDescriptor {
    /// Operation name; filled from the catalog map key at load time.
    #[serde(skip)]
    pub name: String,
    pub http_method: String,
    pub uri_template: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    pub result: ResultShape,
    #[serde(default)]
    pub errors: Vec<DeclaredError>,
}

/// Pagination rule for one paginatable operation.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationRule {
    /// Parameter carrying the "continue from" token on the next request.
    pub input_token: String,
    /// Result path yielding the next token value.
    pub output_token: String,
    /// Optional result path of a boolean "more pages follow" flag.
    #[serde(default)]
    pub more_results: Option<String>,
    /// Result path of the collection to flatten into the element stream.
    pub result_key: String,
}

/// Terminal or non-terminal verdict an acceptor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    Success,
    Failure,
    Retry,
}

/// Match strategy of a single waiter acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    /// Compare `argument` path in the result against `expected`.
    Path,
    /// Compare the HTTP status against `expected`.
    Status,
    /// Compare the service error code against `expected`.
    Error,
}

/// One match rule within a waiter specification.
#[derive(Debug, Clone, Deserialize)]
pub struct Acceptor {
    pub matcher: MatcherKind,
    /// Result path for `path` matchers; unused otherwise.
    #[serde(default)]
    pub argument: Option<String>,
    /// Expected value: JSON value for `path`, number for `status`,
    /// string code for `error`.
    #[serde(default)]
    pub expected: Value,
    pub state: WaitState,
}

fn default_interval() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    40
}

/// Polling configuration for one named wait condition.
#[derive(Debug, Clone, Deserialize)]
pub struct WaiterSpec {
    /// Operation polled on every attempt.
    pub operation: String,
    /// Seconds slept between polls.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub acceptors: Vec<Acceptor>,
}

/// Top-level catalog document for one service.
#[derive(Debug, Deserialize)]
pub struct ServiceCatalog {
    pub service: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub operations: BTreeMap<String, OperationDescriptor>,
    #[serde(default)]
    pub pagination: BTreeMap<String, PaginationRule>,
    #[serde(default)]
    pub waiters: BTreeMap<String, WaiterSpec>,
}

/// Loaded, immutable view over a [`ServiceCatalog`].
///
/// Shared across all commands via `Arc`; lookups never require
/// synchronization because nothing is mutated after load.
#[derive(Debug)]
pub struct Registry {
    service: String,
    api_version: String,
    operations: BTreeMap<String, Arc<OperationDescriptor>>,
    pagination: BTreeMap<String, PaginationRule>,
    waiters: BTreeMap<String, WaiterSpec>,
}

impl Registry {
    /// Parses and validates a JSON catalog document.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: ServiceCatalog = serde_json::from_str(json)
            .map_err(|e| SdkError::Config(format!("invalid catalog document: {}", e)))?;
        Self::from_catalog(catalog)
    }

    /// Builds a registry from an already-deserialized catalog.
    pub fn from_catalog(catalog: ServiceCatalog) -> Result<Self> {
        let mut operations = BTreeMap::new();
        for (name, mut descriptor) in catalog.operations {
            descriptor.name = name.clone();
            validate_descriptor(&mut descriptor)?;
            operations.insert(name, Arc::new(descriptor));
        }

        for (name, waiter) in &catalog.waiters {
            if !operations.contains_key(&waiter.operation) {
                return Err(SdkError::Config(format!(
                    "waiter {} references unknown operation {}",
                    name, waiter.operation
                )));
            }
        }
        for name in catalog.pagination.keys() {
            if !operations.contains_key(name) {
                return Err(SdkError::Config(format!(
                    "pagination rule references unknown operation {}",
                    name
                )));
            }
        }

        Ok(Self {
            service: catalog.service,
            api_version: catalog.api_version,
            operations,
            pagination: catalog.pagination,
            waiters: catalog.waiters,
        })
    }

    /// Returns the descriptor for `operation`, or `UnknownOperation`.
    pub fn lookup(&self, operation: &str) -> Result<Arc<OperationDescriptor>> {
        self.operations
            .get(operation)
            .cloned()
            .ok_or_else(|| SdkError::UnknownOperation(operation.to_string()))
    }

    /// Returns the waiter spec registered under `name`.
    pub fn waiter(&self, name: &str) -> Result<&WaiterSpec> {
        self.waiters
            .get(name)
            .ok_or_else(|| SdkError::UnknownOperation(format!("waiter:{}", name)))
    }

    /// Returns the pagination rule for `operation`, if it is paginatable.
    pub fn pagination(&self, operation: &str) -> Option<&PaginationRule> {
        self.pagination.get(operation)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Names of every operation in the catalog.
    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }
}

/// Rejects descriptors whose constraints could fail later at request
/// time, and compiles each parameter pattern exactly once so request
/// validation never recompiles it.
fn validate_descriptor(descriptor: &mut OperationDescriptor) -> Result<()> {
    let operation = descriptor.name.clone();
    let uri_template = descriptor.uri_template.clone();
    for (name, spec) in &mut descriptor.params {
        if let Some(pattern) = &spec.pattern {
            let regex = Regex::new(pattern).map_err(|e| {
                SdkError::Config(format!(
                    "operation {} parameter {} has invalid pattern: {}",
                    operation, name, e
                ))
            })?;
            spec.pattern_regex = Some(regex);
        }
        if spec.location == ParamLocation::Uri
            && !uri_template.contains(&format!("{{{}}}", name))
        {
            return Err(SdkError::Config(format!(
                "operation {} parameter {} is uri-located but absent from template {}",
                operation, name, uri_template
            )));
        }
    }
    Ok(())
}
