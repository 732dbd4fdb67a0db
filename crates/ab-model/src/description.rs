//! The immutable model schema consumed by the simulation.
//!
//! A [`ModelDescription`] is produced by
//! [`ModelBuilder::build`](crate::ModelBuilder::build) after validation and
//! shared behind an `Arc`.  Nothing in it changes once built; every
//! simulation instance of the model reads the same description.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ab_core::{Value, VarType, VariableSpec};
use ab_message::{MessageKind, MessageType};
use ab_runtime::{AgentCondition, AgentFunction, ExitCondition, HostFunction};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for a built model.
pub(crate) fn next_model_id() -> u64 {
    NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed)
}

// ── Agents ────────────────────────────────────────────────────────────────────

/// How an agent function's body is supplied.
#[derive(Clone)]
pub enum FunctionBody {
    /// A Rust function registered directly.
    Native(Arc<dyn AgentFunction>),
    /// A source identifier resolved through a `KernelCompiler` on first use.
    Runtime { source: String },
}

impl FunctionBody {
    pub fn is_runtime(&self) -> bool {
        matches!(self, FunctionBody::Runtime { .. })
    }
}

impl std::fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionBody::Native(_) => f.write_str("Native"),
            FunctionBody::Runtime { source } => write!(f, "Runtime({source})"),
        }
    }
}

/// One agent function.
#[derive(Clone, Debug)]
pub struct AgentFunctionDescription {
    pub name:            String,
    pub body:            FunctionBody,
    pub initial_state:   String,
    pub end_state:       String,
    pub message_input:   Option<String>,
    pub message_output:  Option<String>,
    /// Only agents that set a message variable emit a message.
    pub optional_output: bool,
    /// `(agent, state)` receiving agents born on the device.
    pub agent_output:    Option<(String, String)>,
    pub allow_death:     bool,
    pub condition:       Option<ConditionHandle>,
}

/// Shared agent-function condition.
#[derive(Clone)]
pub struct ConditionHandle(pub Arc<dyn AgentCondition>);

impl std::fmt::Debug for ConditionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConditionHandle")
    }
}

/// One agent type.
#[derive(Clone, Debug)]
pub struct AgentDescription {
    pub name:          String,
    /// Full schema; the reserved `_id` variable is always first.
    pub schema:        Arc<[VariableSpec]>,
    pub states:        Vec<String>,
    pub initial_state: String,
    pub functions:     Vec<AgentFunctionDescription>,
}

impl AgentDescription {
    pub fn function(&self, name: &str) -> Option<&AgentFunctionDescription> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct MessageDescription {
    pub name:         String,
    pub message_type: MessageType,
    /// Full schema including the implicit location variables.
    pub schema:       Arc<[VariableSpec]>,
}

impl MessageDescription {
    pub fn kind(&self) -> MessageKind {
        self.message_type.kind()
    }
}

// ── Environment ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct EnvPropertyDescription {
    pub name:     String,
    pub default:  Vec<Value>,
    pub is_const: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MacroPropertyDescription {
    pub name: String,
    pub ty:   VarType,
    pub dims: [u32; 4],
}

// ── Host functions ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HostFunctionDescription {
    pub name:     String,
    pub function: Arc<dyn HostFunction>,
}

impl std::fmt::Debug for HostFunctionDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunctionDescription").field("name", &self.name).finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ExitConditionDescription {
    pub name:      String,
    pub condition: Arc<dyn ExitCondition>,
}

impl std::fmt::Debug for ExitConditionDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitConditionDescription").field("name", &self.name).finish_non_exhaustive()
    }
}

// ── Layers and submodels ──────────────────────────────────────────────────────

/// `(agent, function)` reference from a layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionRef {
    pub agent:    String,
    pub function: String,
}

#[derive(Clone, Debug, Default)]
pub struct LayerDescription {
    pub name:            String,
    pub agent_functions: Vec<FunctionRef>,
    pub host_functions:  Vec<HostFunctionDescription>,
    pub submodel:        Option<String>,
}

/// A nested model run to completion inside a parent layer.
///
/// Mapped environment and macro properties share the parent's storage; the
/// submodel's own agents and messages are private and cleared before every
/// invocation.
#[derive(Clone, Debug)]
pub struct SubmodelDescription {
    pub name:          String,
    pub model:         Arc<ModelDescription>,
    /// `(submodel property, parent property)` pairs.
    pub env_mapping:   Vec<(String, String)>,
    pub macro_mapping: Vec<(String, String)>,
    /// Step limit per invocation; 0 runs until an exit condition fires.
    pub max_steps:     u64,
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ModelDescription {
    pub name:             String,
    pub id:               u64,
    pub agents:           Vec<AgentDescription>,
    pub messages:         Vec<MessageDescription>,
    pub layers:           Vec<LayerDescription>,
    pub environment:      Vec<EnvPropertyDescription>,
    pub macro_properties: Vec<MacroPropertyDescription>,
    pub submodels:        Vec<SubmodelDescription>,
    pub init_functions:   Vec<HostFunctionDescription>,
    pub step_functions:   Vec<HostFunctionDescription>,
    pub exit_functions:   Vec<HostFunctionDescription>,
    pub exit_conditions:  Vec<ExitConditionDescription>,
}

impl ModelDescription {
    pub fn agent(&self, name: &str) -> Option<&AgentDescription> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agent_index(&self, name: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.name == name)
    }

    pub fn message(&self, name: &str) -> Option<&MessageDescription> {
        self.messages.iter().find(|m| m.name == name)
    }

    pub fn message_index(&self, name: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.name == name)
    }

    pub fn submodel(&self, name: &str) -> Option<&SubmodelDescription> {
        self.submodels.iter().find(|s| s.name == name)
    }

    pub fn function(&self, r: &FunctionRef) -> Option<&AgentFunctionDescription> {
        self.agent(&r.agent).and_then(|a| a.function(&r.function))
    }

    /// `true` if any agent function needs runtime compilation.
    pub fn has_runtime_functions(&self) -> bool {
        self.agents.iter().flat_map(|a| &a.functions).any(|f| f.body.is_runtime())
    }

    /// `(agent, state, message)` for every state read by a function with a
    /// spatial message input.  These states are periodically sorted by the
    /// message's grid bin.
    pub fn spatial_sort_targets(&self) -> Vec<(String, String, String)> {
        let mut targets: Vec<(String, String, String)> = Vec::new();
        for agent in &self.agents {
            for f in &agent.functions {
                let Some(message) = f.message_input.as_ref().and_then(|m| self.message(m)) else {
                    continue;
                };
                if !message.kind().is_spatial() {
                    continue;
                }
                let entry = (agent.name.clone(), f.initial_state.clone(), message.name.clone());
                if !targets.iter().any(|(a, s, _)| *a == entry.0 && *s == entry.1) {
                    targets.push(entry);
                }
            }
        }
        targets
    }
}
