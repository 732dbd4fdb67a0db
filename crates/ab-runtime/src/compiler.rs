//! Compiled-kernel service.
//!
//! Agent functions may be declared by source identifier instead of by
//! value.  The simulation resolves them through a [`KernelCompiler`] on
//! first use, once a device is bound.  [`KernelRegistry`] is the in-process
//! implementation: identifiers map to functions registered up front.

use std::collections::HashMap;
use std::sync::Arc;

use ab_core::namespace_hash;
use ab_message::MessageKind;
use tracing::debug;

use crate::{AgentFunction, KernelFn, RuntimeError, RuntimeResult, specialise};

/// An invocable kernel plus the function it wraps.
#[derive(Clone)]
pub struct CompiledKernel {
    pub function:      Arc<dyn AgentFunction>,
    pub entry:         KernelFn,
    /// Namespace hash of the function name, bound into per-thread RNG seeds.
    pub function_hash: u32,
}

impl std::fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledKernel").field("function_hash", &self.function_hash).finish_non_exhaustive()
    }
}

pub trait KernelCompiler: Send + Sync {
    /// Compile `source` for function `function` with the declared message
    /// kinds.  Failures are [`RuntimeError::Compile`].
    fn compile(
        &self,
        function: &str,
        source:   &str,
        input:    MessageKind,
        output:   MessageKind,
    ) -> RuntimeResult<CompiledKernel>;
}

#[derive(Default, Clone)]
pub struct KernelRegistry {
    sources: HashMap<String, Arc<dyn AgentFunction>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `function` available under `source`.
    pub fn register(&mut self, source: impl Into<String>, function: impl AgentFunction) -> &mut Self {
        self.sources.insert(source.into(), Arc::new(function));
        self
    }

    pub fn contains(&self, source: &str) -> bool {
        self.sources.contains_key(source)
    }
}

impl KernelCompiler for KernelRegistry {
    fn compile(
        &self,
        function: &str,
        source:   &str,
        input:    MessageKind,
        output:   MessageKind,
    ) -> RuntimeResult<CompiledKernel> {
        let body = self.sources.get(source).ok_or_else(|| RuntimeError::Compile {
            function: function.to_owned(),
            reason:   format!("no kernel registered for source '{source}'"),
        })?;
        debug!(function, source, ?input, ?output, "kernel compiled");
        Ok(CompiledKernel {
            function:      Arc::clone(body),
            entry:         specialise(input, output),
            function_hash: namespace_hash(function),
        })
    }
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelRegistry").field("sources", &self.sources.len()).finish()
    }
}
