//! A bound, parameterized, executable instance of one catalog operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::catalog::{OperationDescriptor, ParamLocation, ParamSpec, ParamType};
use crate::error::{Result, SdkError};
use crate::sign::percent_encode;
use crate::transport::{BodyKind, HttpRequestSpec};

/// Reserved parameter prefix for per-call waiter overrides. Parameters
/// under this prefix never reach the wire request.
pub(crate) const WAITER_PARAM_PREFIX: &str = "waiter.";

/// Lifecycle of a command. Parameters are mutable only while `Unexecuted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandState {
    #[default]
    Unexecuted,
    Executing,
    Executed,
    Failed,
}

/// A mutable, chainable request builder bound to one operation descriptor.
#[derive(Debug, Clone)]
pub struct Command {
    descriptor: Arc<OperationDescriptor>,
    params: BTreeMap<String, Value>,
    state: CommandState,
}

impl Command {
    /// Binds a descriptor to an initial parameter set.
    ///
    /// Fails with `InvalidParameter` if any name is not declared by the
    /// operation. Reserved `waiter.`-prefixed names are always accepted.
    pub fn new(
        descriptor: Arc<OperationDescriptor>,
        initial: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self> {
        let mut command = Self {
            descriptor,
            params: BTreeMap::new(),
            state: CommandState::Unexecuted,
        };
        for (name, value) in initial {
            command.check_name(&name)?;
            command.params.insert(name, value);
        }
        Ok(command)
    }

    /// Sets or overwrites one parameter. Chainable.
    ///
    /// Allowed only while the command is unexecuted.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self> {
        if self.state != CommandState::Unexecuted {
            return Err(SdkError::Validation(format!(
                "cannot set parameters on a {:?} command",
                self.state
            )));
        }
        let name = name.into();
        self.check_name(&name)?;
        self.params.insert(name, value.into());
        Ok(self)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.starts_with(WAITER_PARAM_PREFIX) || self.descriptor.params.contains_key(name) {
            Ok(())
        } else {
            Err(SdkError::InvalidParameter {
                operation: self.descriptor.name.clone(),
                name: name.to_string(),
            })
        }
    }

    pub fn descriptor(&self) -> &Arc<OperationDescriptor> {
        &self.descriptor
    }

    pub fn operation_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub(crate) fn set_state(&mut self, state: CommandState) {
        self.state = state;
    }

    /// Reads a reserved `waiter.` override as an integer, if present.
    pub(crate) fn waiter_override(&self, key: &str) -> Option<u64> {
        self.params
            .get(&format!("{}{}", WAITER_PARAM_PREFIX, key))
            .and_then(Value::as_u64)
    }

    /// Overwrites one parameter without the unexecuted-state check.
    ///
    /// The paginator uses this to advance the token between pages after
    /// the command has already been dispatched once.
    pub(crate) fn force_set(&mut self, name: &str, value: Value) {
        self.params.insert(name.to_string(), value);
    }

    /// Deterministically builds the wire request from the current
    /// parameter set per the descriptor's binding rules.
    ///
    /// Fails with `Validation` when a required parameter is absent or a
    /// value breaks its type/enum/range/pattern constraint. No network
    /// I/O happens here.
    pub fn to_request(&self) -> Result<HttpRequestSpec> {
        let descriptor = &self.descriptor;
        let mut request = HttpRequestSpec {
            method: descriptor.http_method.clone(),
            path: descriptor.uri_template.clone(),
            ..Default::default()
        };
        let mut form_fields: Vec<(String, String)> = Vec::new();
        let mut json_body = serde_json::Map::new();

        for (name, spec) in &descriptor.params {
            let value = match self.params.get(name) {
                Some(value) => value,
                None if spec.required => {
                    return Err(SdkError::Validation(format!(
                        "operation {}: required parameter {} is missing",
                        descriptor.name, name
                    )));
                }
                None => continue,
            };
            validate_value(&descriptor.name, name, spec, value)?;

            match spec.location {
                ParamLocation::Uri => {
                    let rendered = render_scalar(&descriptor.name, name, value)?;
                    request.path = request
                        .path
                        .replace(&format!("{{{}}}", name), &percent_encode(&rendered));
                }
                ParamLocation::Query => {
                    let rendered = render_scalar(&descriptor.name, name, value)?;
                    request.query.insert(
                        percent_encode(spec.wire_name(name)),
                        percent_encode(&rendered),
                    );
                }
                ParamLocation::Header => {
                    let rendered = render_scalar(&descriptor.name, name, value)?;
                    request.set_header(spec.wire_name(name), rendered);
                }
                ParamLocation::Body => {
                    let rendered = render_scalar(&descriptor.name, name, value)?;
                    form_fields.push((spec.wire_name(name).to_string(), rendered));
                }
                ParamLocation::Json => {
                    json_body.insert(spec.wire_name(name).to_string(), value.clone());
                }
            }
        }

        if request.path.contains('{') {
            return Err(SdkError::Validation(format!(
                "operation {}: uri template {} has unsubstituted placeholders",
                descriptor.name, request.path
            )));
        }

        match (form_fields.is_empty(), json_body.is_empty()) {
            (false, false) => {
                return Err(SdkError::Validation(format!(
                    "operation {} mixes form and json body parameters",
                    descriptor.name
                )));
            }
            (false, true) => {
                request.body = form_fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
                    .into_bytes();
                request.body_kind = BodyKind::Form;
            }
            (true, false) => {
                request.body = serde_json::to_vec(&Value::Object(json_body))?;
                request.body_kind = BodyKind::Json;
            }
            (true, true) => {}
        }

        Ok(request)
    }
}

/// Checks a present value against its declared type and constraints.
fn validate_value(operation: &str, name: &str, spec: &ParamSpec, value: &Value) -> Result<()> {
    let type_ok = match spec.param_type {
        ParamType::String => value.is_string(),
        ParamType::Integer => value.as_i64().is_some(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::List => value.is_array(),
        ParamType::Structure => value.is_object(),
    };
    if !type_ok {
        return Err(SdkError::Validation(format!(
            "operation {}: parameter {} must be of type {:?}",
            operation, name, spec.param_type
        )));
    }

    if let (Some(allowed), Some(s)) = (&spec.enum_values, value.as_str()) {
        if !allowed.iter().any(|a| a == s) {
            return Err(SdkError::Validation(format!(
                "operation {}: parameter {} value {:?} is not one of {:?}",
                operation, name, s, allowed
            )));
        }
    }

    if let Some(n) = value.as_i64() {
        if let Some(min) = spec.min {
            if n < min {
                return Err(SdkError::Validation(format!(
                    "operation {}: parameter {} value {} is below minimum {}",
                    operation, name, n, min
                )));
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                return Err(SdkError::Validation(format!(
                    "operation {}: parameter {} value {} exceeds maximum {}",
                    operation, name, n, max
                )));
            }
        }
    }

    if let (Some(regex), Some(s)) = (&spec.pattern_regex, value.as_str()) {
        if !regex.is_match(s) {
            return Err(SdkError::Validation(format!(
                "operation {}: parameter {} value {:?} does not match pattern {}",
                operation, name, s, regex.as_str()
            )));
        }
    }

    Ok(())
}

/// Renders a scalar value for header/query/uri/form placement.
fn render_scalar(operation: &str, name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(SdkError::Validation(format!(
            "operation {}: parameter {} must be a scalar for its location",
            operation, name
        ))),
    }
}
