//! Kernel specialisation.
//!
//! The per-agent kernel body, [`agent_thread`], is generic over an input
//! adaptor and an output adaptor.  Each adaptor pairs a [`MessageKind`] with
//! the binding and finishing logic for that kind, so every
//! `(input kind, output kind)` pair monomorphises into its own kernel.
//! [`specialise`] picks the instantiation for a pair and the
//! [`KernelTable`] records one entry per `(function, input, output)` when
//! functions are registered.

use std::collections::HashMap;

use ab_core::{Row, Scalar, VariableSpec};
use ab_message::{LOCATION_VARIABLES, MessageKind};

use crate::device::MessageInput;
use crate::{AgentFunction, DeviceApi, LaunchContext, ThreadResult, VarBindings};

/// A specialised kernel: runs the function for thread `index` of a launch.
pub type KernelFn = fn(&LaunchContext<'_>, &dyn AgentFunction, u32) -> ThreadResult;

// ── Adaptors ──────────────────────────────────────────────────────────────────

/// Binds the read side of a function's message input.
pub trait InputAdaptor {
    const KIND: MessageKind;

    fn bind<'c>(ctx: &'c LaunchContext<'_>) -> MessageInput<'c> {
        let exceptions = ctx.exceptions();
        let Some((list, bindings)) = ctx.message_in() else {
            exceptions.report(format!("message input of kind {:?} is not bound", Self::KIND));
            return MessageInput::none(exceptions);
        };
        if list.kind() != Self::KIND {
            exceptions.report(format!(
                "message list '{}' is {:?}, kernel expects {:?}",
                list.name(),
                list.kind(),
                Self::KIND
            ));
            return MessageInput::none(exceptions);
        }
        let index = if Self::KIND.is_spatial() { list.index() } else { None };
        MessageInput::new(Self::KIND, Some((list.read(), bindings)), index, exceptions)
    }
}

/// Finishes the row an agent emitted on its message output.
pub trait OutputAdaptor {
    const KIND: MessageKind;
    /// Location variables every emitted message must hold finite values for.
    const LOCATION_DIMS: usize = 0;

    fn finish(ctx: &LaunchContext<'_>, row: Option<Row>) -> Option<Row> {
        let (schema, bindings) = ctx.message_out_schema()?;
        let row = match row {
            Some(row) => row,
            None if ctx.optional_output() => return None,
            None => schema.iter().map(VariableSpec::default_column).collect(),
        };
        check_location(ctx, schema, bindings, &row, Self::LOCATION_DIMS);
        Some(row)
    }
}

fn check_location(ctx: &LaunchContext<'_>, schema: &[VariableSpec], bindings: &VarBindings, row: &Row, dims: usize) {
    for axis in &LOCATION_VARIABLES[..dims] {
        let finite = bindings
            .position(schema, axis)
            .and_then(|pos| <f32 as Scalar>::slice(&row[pos]))
            .and_then(|v| v.first())
            .is_some_and(|v| v.is_finite());
        if !finite {
            ctx.exceptions().report(format!("spatial message emitted without a finite '{axis}'"));
        }
    }
}

pub struct NoInput;
pub struct BruteForceInput;
pub struct Spatial2DInput;
pub struct Spatial3DInput;

impl InputAdaptor for NoInput {
    const KIND: MessageKind = MessageKind::None;

    fn bind<'c>(ctx: &'c LaunchContext<'_>) -> MessageInput<'c> {
        MessageInput::none(ctx.exceptions())
    }
}

impl InputAdaptor for BruteForceInput {
    const KIND: MessageKind = MessageKind::BruteForce;
}

impl InputAdaptor for Spatial2DInput {
    const KIND: MessageKind = MessageKind::Spatial2D;
}

impl InputAdaptor for Spatial3DInput {
    const KIND: MessageKind = MessageKind::Spatial3D;
}

pub struct NoOutput;
pub struct BruteForceOutput;
pub struct Spatial2DOutput;
pub struct Spatial3DOutput;

impl OutputAdaptor for NoOutput {
    const KIND: MessageKind = MessageKind::None;

    fn finish(_ctx: &LaunchContext<'_>, _row: Option<Row>) -> Option<Row> {
        None
    }
}

impl OutputAdaptor for BruteForceOutput {
    const KIND: MessageKind = MessageKind::BruteForce;
}

impl OutputAdaptor for Spatial2DOutput {
    const KIND: MessageKind = MessageKind::Spatial2D;
    const LOCATION_DIMS: usize = 2;
}

impl OutputAdaptor for Spatial3DOutput {
    const KIND: MessageKind = MessageKind::Spatial3D;
    const LOCATION_DIMS: usize = 3;
}

// ── Kernel body ───────────────────────────────────────────────────────────────

/// Run `function` for agent `index` of `ctx`.
pub fn agent_thread<I: InputAdaptor, O: OutputAdaptor>(
    ctx:      &LaunchContext<'_>,
    function: &dyn AgentFunction,
    index:    u32,
) -> ThreadResult {
    let row = ctx.agents().read_row(index as usize);
    let mut api = DeviceApi::new(ctx.api_parts(index), index, row, I::bind(ctx));

    if let Some(condition) = ctx.condition() {
        if !condition.check(&api) {
            let (row, _, _) = api.finish();
            return ThreadResult::skipped(row);
        }
    }

    let status = function.run(&mut api);
    let (row, message, birth) = api.finish();
    ThreadResult { row, ran: true, status, message: O::finish(ctx, message), birth }
}

macro_rules! specialise_output {
    ($input:ty, $output:expr) => {
        match $output {
            MessageKind::None => agent_thread::<$input, NoOutput> as KernelFn,
            MessageKind::BruteForce => agent_thread::<$input, BruteForceOutput> as KernelFn,
            MessageKind::Spatial2D => agent_thread::<$input, Spatial2DOutput> as KernelFn,
            MessageKind::Spatial3D => agent_thread::<$input, Spatial3DOutput> as KernelFn,
        }
    };
}

/// The kernel instantiation for an `(input, output)` kind pair.
pub fn specialise(input: MessageKind, output: MessageKind) -> KernelFn {
    match input {
        MessageKind::None => specialise_output!(NoInput, output),
        MessageKind::BruteForce => specialise_output!(BruteForceInput, output),
        MessageKind::Spatial2D => specialise_output!(Spatial2DInput, output),
        MessageKind::Spatial3D => specialise_output!(Spatial3DInput, output),
    }
}

// ── KernelTable ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub function: String,
    pub input:    MessageKind,
    pub output:   MessageKind,
}

/// One specialised kernel per `(function, input kind, output kind)`.
#[derive(Default)]
pub struct KernelTable {
    entries: HashMap<KernelKey, KernelFn>,
}

impl KernelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specialise and record the kernel for `function`; registering the same
    /// key twice returns the existing entry.
    pub fn register(&mut self, function: &str, input: MessageKind, output: MessageKind) -> KernelFn {
        let key = KernelKey { function: function.to_owned(), input, output };
        *self.entries.entry(key).or_insert_with(|| specialise(input, output))
    }

    pub fn get(&self, function: &str, input: MessageKind, output: MessageKind) -> Option<KernelFn> {
        let key = KernelKey { function: function.to_owned(), input, output };
        self.entries.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTable").field("entries", &self.entries.len()).finish()
    }
}
