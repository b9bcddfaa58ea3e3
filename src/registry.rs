//! Name to call-descriptor registry.
//!
//! Every callable native function is declared up front with its parameter
//! schema and the way it uses input and output objects. Lookup is an exact,
//! case-sensitive match on the name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::native::{NativeCall, NativeFn, NativeOutput, NativeResult};

/// Expected shape of one parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Number narrowed to `i32`.
    Int,
    /// Number as `f64`.
    Double,
    Bool,
    Str,
    /// `{x, y}`.
    Point,
    /// `{width, height}`.
    Size,
    /// `{x, y, width, height}`.
    Rect,
    /// A number, a sequence of up to four numbers, or `{vals: [...]}`.
    Scalar,
    /// Flat sequence of numbers.
    Array,
    /// Sequence of sequences of numbers.
    Rows,
    /// Handle of another live object, bare or as `{matIndex: n}`.
    Mat,
}

/// One entry of a parameter schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

/// How a function uses the request's input and output handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatIo {
    /// Builds a new object from arguments alone.
    Producer,
    /// Modifies the input object; the result goes back to the output handle
    /// if one is given, else to the input handle.
    InPlace,
    /// Reads the input object and writes the output handle, or a new handle.
    SrcDst,
    /// Reads the input object and returns numbers; stores nothing.
    Query,
}

impl MatIo {
    /// Whether an input handle is mandatory.
    pub fn needs_input(self) -> bool {
        !matches!(self, MatIo::Producer)
    }
}

/// Declared schema and binding for one callable function.
#[derive(Clone)]
pub struct CallDescriptor {
    name: String,
    params: Vec<ParamSpec>,
    io: MatIo,
    native: NativeFn,
}

impl CallDescriptor {
    /// Descriptor with no parameters yet.
    pub fn new<F>(name: impl Into<String>, io: MatIo, native: F) -> Self
    where
        F: Fn(&NativeCall<'_>) -> NativeResult<NativeOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            io,
            native: Arc::new(native),
        }
    }

    /// Append a required parameter.
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Append an optional parameter.
    pub fn optional(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Name callers invoke this function by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters in call order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// How the function uses input and output objects.
    pub fn io(&self) -> MatIo {
        self.io
    }

    /// Maximum number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of parameters that must be present.
    pub fn required_arity(&self) -> usize {
        self.params.iter().filter(|p| p.required).count()
    }

    /// Declaration of the parameter called `name`, if any.
    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub(crate) fn call(&self, call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
        (self.native)(call)
    }
}

impl fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("io", &self.io)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from function name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct InvocationRegistry {
    descriptors: HashMap<String, CallDescriptor>,
}

impl InvocationRegistry {
    /// Start an empty registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding the built-in native operations.
    pub fn builtin() -> Self {
        let mut builder = Self::builder();
        crate::native::ops::register_builtins(&mut builder);
        builder.build()
    }

    /// Exact-match lookup.
    pub fn get(&self, name: &str) -> Option<&CallDescriptor> {
        self.descriptors.get(name)
    }

    /// Lookup failing with `UnknownFunction`.
    pub fn resolve(&self, name: &str) -> Result<&CallDescriptor> {
        self.get(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Whether a function called `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: HashMap<String, CallDescriptor>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    /// Add a descriptor. A second descriptor under the same name is recorded
    /// and reported by [`RegistryBuilder::try_build`].
    pub fn register(&mut self, descriptor: CallDescriptor) -> &mut Self {
        let name = descriptor.name.clone();
        if self.descriptors.insert(name.clone(), descriptor).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    /// Freeze, failing if any name was registered twice.
    pub fn try_build(self) -> Result<InvocationRegistry> {
        if !self.duplicates.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "functions registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        debug!(functions = self.descriptors.len(), "invocation registry built");
        Ok(InvocationRegistry {
            descriptors: self.descriptors,
        })
    }

    /// Freeze; on duplicate names the last registration wins.
    pub fn build(self) -> InvocationRegistry {
        if !self.duplicates.is_empty() {
            tracing::warn!(names = ?self.duplicates, "duplicate function registrations, keeping the last");
        }
        InvocationRegistry {
            descriptors: self.descriptors,
        }
    }

    /// Register a detector as a query taking no parameters.
    pub fn register_detector(
        &mut self,
        name: impl Into<String>,
        detector: Arc<dyn crate::classifier::Detector>,
    ) -> &mut Self {
        self.register(crate::classifier::detector_descriptor(name, detector))
    }

    /// Start from everything in an existing registry.
    pub fn extend_from(&mut self, registry: &InvocationRegistry) -> &mut Self {
        for descriptor in registry.descriptors.values() {
            self.register(descriptor.clone());
        }
        self
    }
}
