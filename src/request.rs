//! Invocation requests as they arrive from the scripting side.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::handles::Handle;

/// One call of a registered function.
///
/// # Example
///
/// ```
/// use cvbridge::InvocationRequest;
/// use serde_json::json;
///
/// let req: InvocationRequest = serde_json::from_value(json!({
///     "function": "cvtColor",
///     "params": { "code": 6 },
///     "inputHandle": 0,
///     "outputHandle": 1,
///     "callback": "onGray"
/// }))?;
/// assert_eq!(req.function, "cvtColor");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// Registered function name.
    pub function: String,
    /// Parameters by name, in the order the caller sent them.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Object the function reads or modifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_handle: Option<Handle>,
    /// Object the result is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_handle: Option<Handle>,
    /// Event name the batch result is delivered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

impl InvocationRequest {
    /// Request with no parameters or handles.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..Default::default()
        }
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replace all parameters.
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Set the input handle.
    pub fn input(mut self, handle: Handle) -> Self {
        self.input_handle = Some(handle);
        self
    }

    /// Set the output handle.
    pub fn output(mut self, handle: Handle) -> Self {
        self.output_handle = Some(handle);
        self
    }

    /// Set the callback name.
    pub fn callback(mut self, name: impl Into<String>) -> Self {
        self.callback = Some(name.into());
        self
    }
}

/// Ordered requests processed together.
///
/// Accepts either a bare JSON array or `{"invokeGroup": [...]}`; always
/// serializes as a bare array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BatchRepr", into = "Vec<InvocationRequest>")]
pub struct InvocationBatch {
    requests: Vec<InvocationRequest>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchRepr {
    List(Vec<InvocationRequest>),
    #[serde(rename_all = "camelCase")]
    Group { invoke_group: Vec<InvocationRequest> },
}

impl From<BatchRepr> for InvocationBatch {
    fn from(repr: BatchRepr) -> Self {
        match repr {
            BatchRepr::List(requests) | BatchRepr::Group { invoke_group: requests } => {
                Self { requests }
            }
        }
    }
}

impl From<InvocationBatch> for Vec<InvocationRequest> {
    fn from(batch: InvocationBatch) -> Self {
        batch.requests
    }
}

impl InvocationBatch {
    /// Batch running `requests` in order.
    pub fn new(requests: Vec<InvocationRequest>) -> Self {
        Self { requests }
    }

    /// Parse a batch from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Append a request.
    pub fn push(&mut self, request: InvocationRequest) {
        self.requests.push(request);
    }

    /// Requests in execution order.
    pub fn requests(&self) -> &[InvocationRequest] {
        &self.requests
    }

    /// Number of requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True for a batch with no requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl FromIterator<InvocationRequest> for InvocationBatch {
    fn from_iter<I: IntoIterator<Item = InvocationRequest>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
