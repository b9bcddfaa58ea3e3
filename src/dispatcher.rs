//! Request execution against the registry and the handle table.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::coerce::coerce_params;
use crate::encoder::{encode_output, Payload};
use crate::error::{Error, Result};
use crate::handles::{Handle, HandleTable};
use crate::native::{NativeCall, NativeOutput};
use crate::registry::{CallDescriptor, InvocationRegistry, MatIo};
use crate::request::{InvocationBatch, InvocationRequest};
use crate::types::Terminal;

/// Outcome of one successful request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Invocation {
    /// Object the request wrote (or, for queries, read).
    pub handle: Option<Handle>,
    /// Numbers the function returned directly, if any.
    pub payload: Option<Payload>,
}

/// Outcome of a batch. Only the final request's callback and handle survive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchOutcome {
    /// Callback name of the last request processed.
    pub callback: Option<String>,
    /// Handle of the last request processed, or the failing request's sentinel.
    pub terminal: Terminal,
    /// Numbers returned directly by the last request.
    pub payload: Option<Payload>,
    /// Requests that completed before the batch ended.
    pub completed: usize,
}

/// Executes requests synchronously on the calling thread.
#[derive(Debug, Clone)]
pub struct InvocationDispatcher {
    registry: Arc<InvocationRegistry>,
    table: Arc<HandleTable>,
}

impl InvocationDispatcher {
    /// Dispatcher over `registry` that resolves handles through `table`.
    pub fn new(registry: Arc<InvocationRegistry>, table: Arc<HandleTable>) -> Self {
        Self { registry, table }
    }

    /// Functions this dispatcher can call.
    pub fn registry(&self) -> &InvocationRegistry {
        &self.registry
    }

    /// Table the dispatcher reads from and writes back to.
    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    /// Execute one request, returning a typed error on failure.
    ///
    /// An unknown function name fails before anything is read or written.
    pub fn invoke(&self, request: &InvocationRequest) -> Result<Invocation> {
        let descriptor = self.registry.resolve(&request.function)?;
        self.invoke_descriptor(descriptor, request)
    }

    /// Execute `request` against a descriptor that is not necessarily
    /// registered, e.g. a freshly loaded detector.
    pub fn invoke_descriptor(
        &self,
        descriptor: &CallDescriptor,
        request: &InvocationRequest,
    ) -> Result<Invocation> {
        let io = descriptor.io();
        if io.needs_input() && request.input_handle.is_none() {
            return Err(Error::invalid(format!(
                "{} needs an input handle",
                descriptor.name()
            )));
        }
        if !io.needs_input() && request.input_handle.is_some() {
            return Err(Error::invalid(format!(
                "{} takes no input handle",
                descriptor.name()
            )));
        }

        let args = coerce_params(descriptor, &request.params, &self.table)?;
        let src = request.input_handle.map(|h| self.table.get(h)).transpose()?;
        let dst = request.output_handle.map(|h| self.table.get(h)).transpose()?;

        let call = NativeCall {
            function: descriptor.name(),
            src: src.as_deref(),
            dst: dst.as_deref(),
            args: &args,
        };
        let output = descriptor.call(&call)?;
        let payload = encode_output(&output);

        let handle = match output {
            NativeOutput::Mat(mat) => {
                let target = match (request.output_handle, io) {
                    (Some(out), _) => Some(out),
                    (None, MatIo::InPlace) => request.input_handle,
                    (None, _) => None,
                };
                match target {
                    Some(h) => {
                        self.table.replace(h, mat)?;
                        Some(h)
                    }
                    None => Some(self.table.create(mat)?),
                }
            }
            _ => request.output_handle.or(request.input_handle),
        };

        debug!(
            function = descriptor.name(),
            handle = handle.map(Handle::as_i32),
            "invocation complete"
        );
        Ok(Invocation { handle, payload })
    }

    /// Execute a batch in order, stopping at the first failure.
    ///
    /// Side effects of requests before the failure stay in place. Each
    /// request overwrites the batch's callback and handle, so only the last
    /// processed request is reported.
    pub fn invoke_batch(&self, batch: &InvocationBatch) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for request in batch.requests() {
            outcome.callback = request.callback.clone();
            match self.invoke(request) {
                Ok(invocation) => {
                    outcome.terminal = invocation
                        .handle
                        .map_or(Terminal::None, Terminal::Handle);
                    outcome.payload = invocation.payload;
                    outcome.completed += 1;
                }
                Err(err) => {
                    let sentinel = err.sentinel();
                    warn!(
                        function = %request.function,
                        code = sentinel.code(),
                        error = %err,
                        "invocation failed, abandoning batch"
                    );
                    outcome.terminal = Terminal::Sentinel(sentinel);
                    outcome.payload = None;
                    break;
                }
            }
        }
        outcome
    }
}
