//! The API agent functions see while running on the device.
//!
//! A [`DeviceApi`] is built per agent thread.  It holds a private copy of
//! the agent's row, so agent code may freely read and write its own
//! variables; the copy is written back when the launch is post-processed.
//!
//! Misuse inside agent code (an unknown variable, a wrong type, an index
//! past an array's end, a neighbour query on a non-spatial input) cannot
//! return an error mid-launch.  It is reported to the launch's
//! [`DeviceExceptionBuffer`] and the call yields the type's default value.
//! The host re-raises the first report after the join.

use std::ops::Range;

use ab_core::{AgentId, AgentRng, Columns, ID_VARIABLE, Row, Scalar, VariableSpec, is_reserved};
use ab_device::DeviceExceptionBuffer;
use ab_env::{DeviceMacroProperty, EnvSnapshot, MacroEnvironmentStore};
use ab_message::{MessageIndex, MessageKind};

use crate::VarBindings;

// ── Row access ────────────────────────────────────────────────────────────────

fn read_var<T: Scalar>(
    schema:     &[VariableSpec],
    bindings:   &VarBindings,
    row:        &Row,
    name:       &str,
    element:    usize,
    exceptions: &DeviceExceptionBuffer,
) -> T {
    let Some(pos) = bindings.position(schema, name) else {
        exceptions.report(format!("unknown variable '{name}'"));
        return T::default();
    };
    match T::slice(&row[pos]) {
        Some(values) => values.get(element).copied().unwrap_or_else(|| {
            exceptions.report(format!(
                "element {element} out of range for '{name}' (array length {})",
                values.len()
            ));
            T::default()
        }),
        None => {
            exceptions.report(format!("variable '{name}' is {}, read as {}", schema[pos].ty, T::TYPE));
            T::default()
        }
    }
}

fn write_var<T: Scalar>(
    schema:     &[VariableSpec],
    bindings:   &VarBindings,
    row:        &mut Row,
    name:       &str,
    element:    usize,
    value:      T,
    exceptions: &DeviceExceptionBuffer,
) {
    if is_reserved(name) {
        exceptions.report(format!("variable '{name}' is reserved and cannot be written by agent code"));
        return;
    }
    let Some(pos) = bindings.position(schema, name) else {
        exceptions.report(format!("unknown variable '{name}'"));
        return;
    };
    match T::slice_mut(&mut row[pos]) {
        Some(values) => match values.get_mut(element) {
            Some(slot) => *slot = value,
            None => exceptions.report(format!("element {element} out of range for '{name}'")),
        },
        None => {
            exceptions.report(format!("variable '{name}' is {}, written as {}", schema[pos].ty, T::TYPE))
        }
    }
}

// ── Message input ─────────────────────────────────────────────────────────────

/// Read side of the function's message input.
pub struct MessageInput<'a> {
    kind:       MessageKind,
    messages:   Option<(&'a Columns, &'a VarBindings)>,
    index:      Option<&'a MessageIndex>,
    exceptions: &'a DeviceExceptionBuffer,
}

impl<'a> MessageInput<'a> {
    pub(crate) fn new(
        kind:       MessageKind,
        messages:   Option<(&'a Columns, &'a VarBindings)>,
        index:      Option<&'a MessageIndex>,
        exceptions: &'a DeviceExceptionBuffer,
    ) -> Self {
        Self { kind, messages, index, exceptions }
    }

    pub(crate) fn none(exceptions: &'a DeviceExceptionBuffer) -> Self {
        Self::new(MessageKind::None, None, None, exceptions)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Messages published for this layer.
    pub fn len(&self) -> usize {
        self.messages.map_or(0, |(m, _)| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every published message.
    pub fn iter(&self) -> Messages<'a> {
        match self.messages {
            Some((columns, bindings)) => Messages {
                source:     Some((columns, bindings)),
                rows:       MessageRows::All(0..columns.len()),
                exceptions: self.exceptions,
            },
            None => {
                self.exceptions.report("agent function has no message input");
                self.empty()
            }
        }
    }

    /// Messages in the bins surrounding `pos`.  Spatial inputs only; 2D
    /// inputs ignore `pos[2]`.
    ///
    /// The result is a superset of the messages within the interaction
    /// radius; agent code filters by distance.
    pub fn neighbours(&self, pos: [f32; 3]) -> Messages<'a> {
        if !self.kind.is_spatial() {
            self.exceptions.report(format!("neighbour query on a {:?} message input", self.kind));
            return self.empty();
        }
        let (Some(source), Some(index)) = (self.messages, self.index) else {
            self.exceptions.report("spatial message input is not bound");
            return self.empty();
        };
        match index.neighbours(pos) {
            Ok(rows) => Messages {
                source:     Some(source),
                rows:       MessageRows::Listed(rows.collect::<Vec<_>>().into_iter()),
                exceptions: self.exceptions,
            },
            Err(e) => {
                self.exceptions.report(e.to_string());
                self.empty()
            }
        }
    }

    fn empty(&self) -> Messages<'a> {
        Messages { source: None, rows: MessageRows::All(0..0), exceptions: self.exceptions }
    }
}

enum MessageRows {
    All(Range<usize>),
    Listed(std::vec::IntoIter<usize>),
}

/// Iterator over input messages.
pub struct Messages<'a> {
    source:     Option<(&'a Columns, &'a VarBindings)>,
    rows:       MessageRows,
    exceptions: &'a DeviceExceptionBuffer,
}

impl<'a> Iterator for Messages<'a> {
    type Item = Message<'a>;

    fn next(&mut self) -> Option<Message<'a>> {
        let (columns, bindings) = self.source?;
        let row = match &mut self.rows {
            MessageRows::All(range) => range.next()?,
            MessageRows::Listed(rows) => rows.next()?,
        };
        Some(Message { columns, bindings, row, exceptions: self.exceptions })
    }
}

/// One input message.
pub struct Message<'a> {
    columns:    &'a Columns,
    bindings:   &'a VarBindings,
    row:        usize,
    exceptions: &'a DeviceExceptionBuffer,
}

impl Message<'_> {
    /// Position of this message in the published buffer.
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn get<T: Scalar>(&self, name: &str) -> T {
        self.get_element(name, 0)
    }

    pub fn get_element<T: Scalar>(&self, name: &str, element: usize) -> T {
        let schema = self.columns.schema();
        let Some(pos) = self.bindings.position(schema, name) else {
            self.exceptions.report(format!("unknown message variable '{name}'"));
            return T::default();
        };
        let array_len = schema[pos].array_len;
        if element >= array_len {
            self.exceptions.report(format!("element {element} out of range for message variable '{name}'"));
            return T::default();
        }
        match T::slice(self.columns.column_at(pos)) {
            Some(values) => values[self.row * array_len + element],
            None => {
                self.exceptions
                    .report(format!("message variable '{name}' is {}, read as {}", schema[pos].ty, T::TYPE));
                T::default()
            }
        }
    }
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// A row the agent may emit: its output message, or a newborn agent.
///
/// Nothing is emitted until the first `set`; unset variables keep their
/// declared defaults.
pub struct OutputRow<'a> {
    what:       &'static str,
    target:     Option<(&'a [VariableSpec], &'a VarBindings)>,
    row:        Option<Row>,
    exceptions: &'a DeviceExceptionBuffer,
}

impl<'a> OutputRow<'a> {
    pub(crate) fn new(
        what:       &'static str,
        target:     Option<(&'a [VariableSpec], &'a VarBindings)>,
        exceptions: &'a DeviceExceptionBuffer,
    ) -> Self {
        Self { what, target, row: None, exceptions }
    }

    pub fn set<T: Scalar>(&mut self, name: &str, value: T) {
        self.set_element(name, 0, value);
    }

    pub fn set_element<T: Scalar>(&mut self, name: &str, element: usize, value: T) {
        let Some((schema, bindings)) = self.target else {
            self.exceptions.report(format!("agent function has no {} declared", self.what));
            return;
        };
        let row = self
            .row
            .get_or_insert_with(|| schema.iter().map(VariableSpec::default_column).collect());
        write_var(schema, bindings, row, name, element, value, self.exceptions);
    }

    /// `true` once a variable has been set.
    pub fn is_set(&self) -> bool {
        self.row.is_some()
    }

    pub(crate) fn take(&mut self) -> Option<Row> {
        self.row.take()
    }
}

// ── DeviceApi ─────────────────────────────────────────────────────────────────

/// Per-agent view handed to [`AgentFunction::run`](crate::AgentFunction::run).
pub struct DeviceApi<'a> {
    schema:      &'a [VariableSpec],
    bindings:    &'a VarBindings,
    row:         Row,
    index:       u32,
    step:        u64,
    rng:         AgentRng,
    env:         &'a EnvSnapshot,
    macros:      &'a MacroEnvironmentStore,
    exceptions:  &'a DeviceExceptionBuffer,
    message_in:  MessageInput<'a>,
    message_out: OutputRow<'a>,
    agent_out:   OutputRow<'a>,
}

/// Everything a [`DeviceApi`] borrows from its launch.
pub(crate) struct ApiParts<'a> {
    pub schema:      &'a [VariableSpec],
    pub bindings:    &'a VarBindings,
    pub env:         &'a EnvSnapshot,
    pub macros:      &'a MacroEnvironmentStore,
    pub exceptions:  &'a DeviceExceptionBuffer,
    pub message_out: Option<(&'a [VariableSpec], &'a VarBindings)>,
    pub agent_out:   Option<(&'a [VariableSpec], &'a VarBindings)>,
    pub rng:         AgentRng,
    pub step:        u64,
}

impl<'a> DeviceApi<'a> {
    pub(crate) fn new(parts: ApiParts<'a>, index: u32, row: Row, message_in: MessageInput<'a>) -> Self {
        Self {
            schema: parts.schema,
            bindings: parts.bindings,
            row,
            index,
            step: parts.step,
            rng: parts.rng,
            env: parts.env,
            macros: parts.macros,
            exceptions: parts.exceptions,
            message_in,
            message_out: OutputRow::new("message output", parts.message_out, parts.exceptions),
            agent_out: OutputRow::new("agent output", parts.agent_out, parts.exceptions),
        }
    }

    pub fn get<T: Scalar>(&self, name: &str) -> T {
        self.get_element(name, 0)
    }

    pub fn get_element<T: Scalar>(&self, name: &str, element: usize) -> T {
        read_var(self.schema, self.bindings, &self.row, name, element, self.exceptions)
    }

    pub fn set<T: Scalar>(&mut self, name: &str, value: T) {
        self.set_element(name, 0, value);
    }

    pub fn set_element<T: Scalar>(&mut self, name: &str, element: usize, value: T) {
        write_var(self.schema, self.bindings, &mut self.row, name, element, value, self.exceptions);
    }

    /// The agent's identifier.
    pub fn id(&self) -> AgentId {
        AgentId(self.get::<u32>(ID_VARIABLE))
    }

    /// Thread index of this agent within the launch.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Steps completed before the current one.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn rng(&mut self) -> &mut AgentRng {
        &mut self.rng
    }

    /// Environment property `name` as seen when the launch was prepared.
    pub fn environment<T: Scalar>(&self, name: &str) -> T {
        self.environment_element(name, 0)
    }

    pub fn environment_element<T: Scalar>(&self, name: &str, element: usize) -> T {
        self.env.get::<T>(name, element).unwrap_or_else(|| {
            self.exceptions.report(format!(
                "environment property '{name}' element {element} is missing or not {}",
                T::TYPE
            ));
            T::default()
        })
    }

    pub fn macro_property<T: Scalar>(&self, name: &str) -> DeviceMacroProperty<'a, T> {
        self.macros.device_property::<T>(name, self.exceptions)
    }

    pub fn message_in(&self) -> &MessageInput<'a> {
        &self.message_in
    }

    pub fn message_out(&mut self) -> &mut OutputRow<'a> {
        &mut self.message_out
    }

    pub fn agent_out(&mut self) -> &mut OutputRow<'a> {
        &mut self.agent_out
    }

    /// `(agent row, message row, birth row)`.
    pub(crate) fn finish(mut self) -> (Row, Option<Row>, Option<Row>) {
        let message = self.message_out.take();
        let birth = self.agent_out.take();
        (self.row, message, birth)
    }
}
