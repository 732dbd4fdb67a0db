//! Fluent builders for a [`ModelDescription`].
//!
//! Builder methods only record what they are given; every check runs in
//! [`ModelBuilder::build`], which returns the first violation found.
//!
//! # Example
//!
//! ```rust,ignore
//! let model = ModelBuilder::new("boids")
//!     .environment("speed", 0.5f32)
//!     .macro_property::<u32>("visits", [16, 16, 1, 1])
//!     .message("location", MessageType::Spatial2D(bounds), vec![VariableSpec::scalar::<u32>("id")])
//!     .agent(
//!         AgentBuilder::new("bird")
//!             .variable(VariableSpec::scalar::<f32>("x"))
//!             .variable(VariableSpec::scalar::<f32>("y"))
//!             .function(AgentFunctionBuilder::new("emit", emit).message_output("location"))
//!             .function(AgentFunctionBuilder::new("steer", steer).message_input("location")),
//!     )
//!     .layer(LayerBuilder::new("emit").agent_function("bird", "emit"))
//!     .layer(LayerBuilder::new("steer").agent_function("bird", "steer"))
//!     .build()?;
//! ```

use std::sync::Arc;

use ab_core::{Scalar, Value, VarType, VariableSpec};
use ab_message::MessageType;
use ab_runtime::{AgentCondition, AgentFunction, ExitCondition, HostFunction};
use tracing::debug;

use crate::description::next_model_id;
use crate::{
    AgentDescription, AgentFunctionDescription, ConditionHandle, EnvPropertyDescription,
    ExitConditionDescription, FunctionBody, FunctionRef, HostFunctionDescription, LayerDescription,
    MacroPropertyDescription, MessageDescription, ModelDescription, ModelResult,
    SubmodelDescription, validate,
};

/// State every agent gets when none is declared.
pub const DEFAULT_STATE: &str = "default";

fn host(name: impl Into<String>, function: impl HostFunction) -> HostFunctionDescription {
    HostFunctionDescription { name: name.into(), function: Arc::new(function) }
}

// ── Agent functions ───────────────────────────────────────────────────────────

/// Builder for one agent function.
///
/// | Method                   | Default                         |
/// |--------------------------|---------------------------------|
/// | `.initial_state(s)`      | the agent's initial state       |
/// | `.end_state(s)`          | the initial state               |
/// | `.message_input(m)`      | no input                        |
/// | `.message_output(m)`     | no output                       |
/// | `.optional_output()`     | every agent emits a message     |
/// | `.agent_output(a, s)`    | no device births                |
/// | `.allow_death()`         | agents cannot die               |
/// | `.condition(c)`          | every agent runs                |
pub struct AgentFunctionBuilder {
    name:            String,
    body:            FunctionBody,
    initial_state:   Option<String>,
    end_state:       Option<String>,
    message_input:   Option<String>,
    message_output:  Option<String>,
    optional_output: bool,
    agent_output:    Option<(String, String)>,
    allow_death:     bool,
    condition:       Option<ConditionHandle>,
}

impl AgentFunctionBuilder {
    pub fn new(name: impl Into<String>, function: impl AgentFunction) -> Self {
        Self::with_body(name, FunctionBody::Native(Arc::new(function)))
    }

    /// A function compiled from `source` when the simulation first runs.
    pub fn runtime(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with_body(name, FunctionBody::Runtime { source: source.into() })
    }

    fn with_body(name: impl Into<String>, body: FunctionBody) -> Self {
        Self {
            name: name.into(),
            body,
            initial_state: None,
            end_state: None,
            message_input: None,
            message_output: None,
            optional_output: false,
            agent_output: None,
            allow_death: false,
            condition: None,
        }
    }

    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    pub fn end_state(mut self, state: impl Into<String>) -> Self {
        self.end_state = Some(state.into());
        self
    }

    pub fn message_input(mut self, message: impl Into<String>) -> Self {
        self.message_input = Some(message.into());
        self
    }

    pub fn message_output(mut self, message: impl Into<String>) -> Self {
        self.message_output = Some(message.into());
        self
    }

    pub fn optional_output(mut self) -> Self {
        self.optional_output = true;
        self
    }

    pub fn agent_output(mut self, agent: impl Into<String>, state: impl Into<String>) -> Self {
        self.agent_output = Some((agent.into(), state.into()));
        self
    }

    pub fn allow_death(mut self) -> Self {
        self.allow_death = true;
        self
    }

    pub fn condition(mut self, condition: impl AgentCondition) -> Self {
        self.condition = Some(ConditionHandle(Arc::new(condition)));
        self
    }

    fn finish(self, default_state: &str) -> AgentFunctionDescription {
        let initial_state = self.initial_state.unwrap_or_else(|| default_state.to_owned());
        AgentFunctionDescription {
            name: self.name,
            body: self.body,
            end_state: self.end_state.unwrap_or_else(|| initial_state.clone()),
            initial_state,
            message_input: self.message_input,
            message_output: self.message_output,
            optional_output: self.optional_output,
            agent_output: self.agent_output,
            allow_death: self.allow_death,
            condition: self.condition,
        }
    }
}

// ── Agents ────────────────────────────────────────────────────────────────────

pub struct AgentBuilder {
    name:          String,
    variables:     Vec<VariableSpec>,
    states:        Vec<String>,
    initial_state: Option<String>,
    functions:     Vec<AgentFunctionBuilder>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:          name.into(),
            variables:     Vec::new(),
            states:        Vec::new(),
            initial_state: None,
            functions:     Vec::new(),
        }
    }

    pub fn variable(mut self, variable: VariableSpec) -> Self {
        self.variables.push(variable);
        self
    }

    /// Declare a state.  Without any, the agent has the single state
    /// [`DEFAULT_STATE`].
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.states.push(state.into());
        self
    }

    /// State that new and imported agents start in.  Defaults to the first
    /// declared state.
    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    pub fn function(mut self, function: AgentFunctionBuilder) -> Self {
        self.functions.push(function);
        self
    }

    fn finish(self) -> AgentDescription {
        let states = if self.states.is_empty() { vec![DEFAULT_STATE.to_owned()] } else { self.states };
        let initial_state = self.initial_state.unwrap_or_else(|| states[0].clone());
        let mut schema = Vec::with_capacity(self.variables.len() + 1);
        schema.push(VariableSpec::agent_id());
        schema.extend(self.variables);
        AgentDescription {
            functions: self.functions.into_iter().map(|f| f.finish(&initial_state)).collect(),
            name: self.name,
            schema: schema.into(),
            states,
            initial_state,
        }
    }
}

// ── Layers ────────────────────────────────────────────────────────────────────

pub struct LayerBuilder {
    layer: LayerDescription,
}

impl LayerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { layer: LayerDescription { name: name.into(), ..LayerDescription::default() } }
    }

    pub fn agent_function(mut self, agent: impl Into<String>, function: impl Into<String>) -> Self {
        self.layer.agent_functions.push(FunctionRef { agent: agent.into(), function: function.into() });
        self
    }

    pub fn host_function(mut self, name: impl Into<String>, function: impl HostFunction) -> Self {
        self.layer.host_functions.push(host(name, function));
        self
    }

    /// Run submodel `name` in this layer.  A submodel layer holds nothing else.
    pub fn submodel(mut self, name: impl Into<String>) -> Self {
        self.layer.submodel = Some(name.into());
        self
    }
}

// ── Submodels ─────────────────────────────────────────────────────────────────

pub struct SubmodelBuilder {
    submodel: SubmodelDescription,
}

impl SubmodelBuilder {
    pub fn new(name: impl Into<String>, model: Arc<ModelDescription>) -> Self {
        Self {
            submodel: SubmodelDescription {
                name: name.into(),
                model,
                env_mapping: Vec::new(),
                macro_mapping: Vec::new(),
                max_steps: 0,
            },
        }
    }

    /// Share parent environment property `parent` as `sub`.
    pub fn map_environment(mut self, sub: impl Into<String>, parent: impl Into<String>) -> Self {
        self.submodel.env_mapping.push((sub.into(), parent.into()));
        self
    }

    /// Share parent macro property `parent` as `sub`.
    pub fn map_macro_property(mut self, sub: impl Into<String>, parent: impl Into<String>) -> Self {
        self.submodel.macro_mapping.push((sub.into(), parent.into()));
        self
    }

    pub fn max_steps(mut self, steps: u64) -> Self {
        self.submodel.max_steps = steps;
        self
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

pub struct ModelBuilder {
    name:             String,
    agents:           Vec<AgentBuilder>,
    messages:         Vec<(String, MessageType, Vec<VariableSpec>)>,
    layers:           Vec<LayerBuilder>,
    environment:      Vec<EnvPropertyDescription>,
    macro_properties: Vec<MacroPropertyDescription>,
    submodels:        Vec<SubmodelBuilder>,
    init_functions:   Vec<HostFunctionDescription>,
    step_functions:   Vec<HostFunctionDescription>,
    exit_functions:   Vec<HostFunctionDescription>,
    exit_conditions:  Vec<ExitConditionDescription>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:             name.into(),
            agents:           Vec::new(),
            messages:         Vec::new(),
            layers:           Vec::new(),
            environment:      Vec::new(),
            macro_properties: Vec::new(),
            submodels:        Vec::new(),
            init_functions:   Vec::new(),
            step_functions:   Vec::new(),
            exit_functions:   Vec::new(),
            exit_conditions:  Vec::new(),
        }
    }

    pub fn agent(mut self, agent: AgentBuilder) -> Self {
        self.agents.push(agent);
        self
    }

    /// Declare a message type.  Spatial types get their location variables
    /// added in front of `variables`.
    pub fn message(
        mut self,
        name:         impl Into<String>,
        message_type: MessageType,
        variables:    Vec<VariableSpec>,
    ) -> Self {
        self.messages.push((name.into(), message_type, variables));
        self
    }

    pub fn layer(mut self, layer: LayerBuilder) -> Self {
        self.layers.push(layer);
        self
    }

    /// Declare a scalar environment property.
    pub fn environment<T: Scalar>(self, name: impl Into<String>, default: T) -> Self {
        self.environment_array(name, &[default.into_value()], false)
    }

    /// Declare an environment property holding `default.len()` values.
    pub fn environment_array(mut self, name: impl Into<String>, default: &[Value], is_const: bool) -> Self {
        self.environment.push(EnvPropertyDescription { name: name.into(), default: default.to_vec(), is_const });
        self
    }

    pub fn constant<T: Scalar>(self, name: impl Into<String>, value: T) -> Self {
        self.environment_array(name, &[value.into_value()], true)
    }

    pub fn macro_property<T: Scalar>(self, name: impl Into<String>, dims: [u32; 4]) -> Self {
        self.macro_property_typed(name, T::TYPE, dims)
    }

    pub fn macro_property_typed(mut self, name: impl Into<String>, ty: VarType, dims: [u32; 4]) -> Self {
        self.macro_properties.push(MacroPropertyDescription { name: name.into(), ty, dims });
        self
    }

    pub fn submodel(mut self, submodel: SubmodelBuilder) -> Self {
        self.submodels.push(submodel);
        self
    }

    pub fn init_function(mut self, name: impl Into<String>, function: impl HostFunction) -> Self {
        self.init_functions.push(host(name, function));
        self
    }

    pub fn step_function(mut self, name: impl Into<String>, function: impl HostFunction) -> Self {
        self.step_functions.push(host(name, function));
        self
    }

    pub fn exit_function(mut self, name: impl Into<String>, function: impl HostFunction) -> Self {
        self.exit_functions.push(host(name, function));
        self
    }

    pub fn exit_condition(mut self, name: impl Into<String>, condition: impl ExitCondition) -> Self {
        self.exit_conditions
            .push(ExitConditionDescription { name: name.into(), condition: Arc::new(condition) });
        self
    }

    /// Validate and freeze the model.
    pub fn build(self) -> ModelResult<Arc<ModelDescription>> {
        let messages = self
            .messages
            .into_iter()
            .map(|(name, message_type, variables)| {
                let mut schema = message_type.implicit_variables();
                for v in &variables {
                    message_type.check_variable(&v.name)?;
                }
                schema.extend(variables);
                Ok(MessageDescription { name, message_type, schema: schema.into() })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let model = ModelDescription {
            name:             self.name,
            id:               next_model_id(),
            agents:           self.agents.into_iter().map(AgentBuilder::finish).collect(),
            messages,
            layers:           self.layers.into_iter().map(|l| l.layer).collect(),
            environment:      self.environment,
            macro_properties: self.macro_properties,
            submodels:        self.submodels.into_iter().map(|s| s.submodel).collect(),
            init_functions:   self.init_functions,
            step_functions:   self.step_functions,
            exit_functions:   self.exit_functions,
            exit_conditions:  self.exit_conditions,
        };
        validate::validate(&model)?;
        debug!(
            model = %model.name,
            id = model.id,
            agents = model.agents.len(),
            layers = model.layers.len(),
            "model built"
        );
        Ok(Arc::new(model))
    }
}
