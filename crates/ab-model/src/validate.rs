//! Model validation, run once by [`ModelBuilder::build`](crate::ModelBuilder::build).
//!
//! Checks are grouped by concern and return the first violation found.
//!
//! Layer rules:
//!
//! | Rule                                                            |
//! |-----------------------------------------------------------------|
//! | A layer is not empty.                                           |
//! | A submodel layer holds the submodel and nothing else.           |
//! | An agent function appears in at most one layer.                 |
//! | Two functions of one layer do not output the same message.      |
//! | A function does not read a message output in its own layer.     |
//! | Two functions of one agent in a layer read different states.    |

use std::collections::HashSet;

use ab_core::{AbError, VarType, VariableSpec, is_reserved};
use ab_message::SpatialGrid;

use crate::{
    AgentDescription, AgentFunctionDescription, LayerDescription, ModelDescription, ModelError,
    ModelResult, SubmodelDescription,
};

pub(crate) fn validate(model: &ModelDescription) -> ModelResult<()> {
    check_unique("agent", model.agents.iter().map(|a| a.name.as_str()))?;
    check_unique("message", model.messages.iter().map(|m| m.name.as_str()))?;
    check_unique("submodel", model.submodels.iter().map(|s| s.name.as_str()))?;
    check_unique("layer", model.layers.iter().map(|l| l.name.as_str()))?;

    for message in &model.messages {
        check_variables("message variable", &message.schema, 0)?;
        if let Some(bounds) = message.message_type.bounds() {
            SpatialGrid::new(bounds, message.message_type.dimensions())?;
        }
    }
    for agent in &model.agents {
        check_agent(model, agent)?;
    }
    check_environment(model)?;
    for (i, layer) in model.layers.iter().enumerate() {
        check_layer(model, i, layer)?;
    }
    check_layer_membership(model)?;
    for submodel in &model.submodels {
        check_submodel(model, submodel)?;
    }
    Ok(())
}

fn check_unique<'a>(what: &'static str, names: impl Iterator<Item = &'a str>) -> ModelResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(AbError::DuplicateName { what, name: name.to_owned() }.into());
        }
    }
    Ok(())
}

/// Variables are unique and well formed; the first `builtin` entries are
/// framework variables and may use the reserved prefix.
fn check_variables(what: &'static str, schema: &[VariableSpec], builtin: usize) -> ModelResult<()> {
    check_unique(what, schema.iter().map(|v| v.name.as_str()))?;
    for (i, v) in schema.iter().enumerate() {
        if i >= builtin && is_reserved(&v.name) {
            return Err(AbError::ReservedName(v.name.clone()).into());
        }
        v.validate()?;
    }
    Ok(())
}

// ── Agents ────────────────────────────────────────────────────────────────────

fn check_agent(model: &ModelDescription, agent: &AgentDescription) -> ModelResult<()> {
    check_variables("agent variable", &agent.schema, 1)?;
    check_unique("agent state", agent.states.iter().map(String::as_str))?;
    check_state(agent, &agent.initial_state)?;
    check_unique("agent function", agent.functions.iter().map(|f| f.name.as_str()))?;
    for f in &agent.functions {
        check_function(model, agent, f)?;
    }
    Ok(())
}

fn check_state(agent: &AgentDescription, state: &str) -> ModelResult<()> {
    if !agent.has_state(state) {
        return Err(AbError::InvalidState { agent: agent.name.clone(), state: state.to_owned() }.into());
    }
    Ok(())
}

fn check_function(
    model: &ModelDescription,
    agent: &AgentDescription,
    f:     &AgentFunctionDescription,
) -> ModelResult<()> {
    check_state(agent, &f.initial_state)?;
    check_state(agent, &f.end_state)?;
    for message in f.message_input.iter().chain(&f.message_output) {
        if model.message(message).is_none() {
            return Err(AbError::not_found("message", message).into());
        }
    }
    if f.optional_output && f.message_output.is_none() {
        return Err(AbError::InvalidArgument(format!(
            "function '{}' marks its output optional but has no message output",
            f.name
        ))
        .into());
    }
    if let Some((target, state)) = &f.agent_output {
        let target = model.agent(target).ok_or_else(|| AbError::InvalidAgent(target.clone()))?;
        check_state(target, state)?;
    }
    Ok(())
}

// ── Environment ───────────────────────────────────────────────────────────────

fn check_environment(model: &ModelDescription) -> ModelResult<()> {
    check_unique("environment property", model.environment.iter().map(|p| p.name.as_str()))?;
    for p in &model.environment {
        if is_reserved(&p.name) {
            return Err(AbError::ReservedName(p.name.clone()).into());
        }
        let Some(first) = p.default.first() else {
            return Err(AbError::InvalidArgument(format!("environment property '{}' has no values", p.name)).into());
        };
        if p.default.iter().any(|v| v.var_type() != first.var_type()) {
            return Err(AbError::type_mismatch(&p.name, "default values have mixed types").into());
        }
    }

    check_unique("macro property", model.macro_properties.iter().map(|p| p.name.as_str()))?;
    for p in &model.macro_properties {
        if is_reserved(&p.name) {
            return Err(AbError::ReservedName(p.name.clone()).into());
        }
        if p.dims.contains(&0) {
            return Err(AbError::InvalidArgument(format!("macro property '{}' has a zero dimension", p.name)).into());
        }
    }
    Ok(())
}

// ── Layers ────────────────────────────────────────────────────────────────────

fn layer_error(index: usize, layer: &LayerDescription, reason: impl Into<String>) -> ModelError {
    ModelError::Layer { layer: index, name: layer.name.clone(), reason: reason.into() }
}

fn check_layer(model: &ModelDescription, index: usize, layer: &LayerDescription) -> ModelResult<()> {
    if let Some(name) = &layer.submodel {
        if model.submodel(name).is_none() {
            return Err(AbError::not_found("submodel", name).into());
        }
        if !layer.agent_functions.is_empty() || !layer.host_functions.is_empty() {
            return Err(layer_error(index, layer, "a submodel layer may hold nothing else"));
        }
        return Ok(());
    }
    if layer.agent_functions.is_empty() && layer.host_functions.is_empty() {
        return Err(layer_error(index, layer, "layer is empty"));
    }

    let mut functions = Vec::with_capacity(layer.agent_functions.len());
    for r in &layer.agent_functions {
        let agent = model.agent(&r.agent).ok_or_else(|| AbError::InvalidAgent(r.agent.clone()))?;
        let f = agent.function(&r.function).ok_or_else(|| AbError::not_found("agent function", &r.function))?;
        functions.push((agent, f));
    }

    let mut outputs = HashSet::new();
    let mut read_states = HashSet::new();
    for (agent, f) in &functions {
        if let Some(out) = &f.message_output {
            if !outputs.insert(out.as_str()) {
                return Err(layer_error(index, layer, format!("message '{out}' is output by two functions")));
            }
        }
        if !read_states.insert((agent.name.as_str(), f.initial_state.as_str())) {
            return Err(layer_error(
                index,
                layer,
                format!("two functions of agent '{}' read state '{}'", agent.name, f.initial_state),
            ));
        }
    }
    for (_, f) in &functions {
        if let Some(input) = &f.message_input {
            if outputs.contains(input.as_str()) {
                return Err(layer_error(
                    index,
                    layer,
                    format!("function '{}' reads message '{input}' output in the same layer", f.name),
                ));
            }
        }
    }
    Ok(())
}

fn check_layer_membership(model: &ModelDescription) -> ModelResult<()> {
    let mut placed = HashSet::new();
    for (i, layer) in model.layers.iter().enumerate() {
        for r in &layer.agent_functions {
            if !placed.insert((r.agent.as_str(), r.function.as_str())) {
                return Err(layer_error(
                    i,
                    layer,
                    format!("function '{}.{}' already appears in an earlier layer", r.agent, r.function),
                ));
            }
        }
    }
    Ok(())
}

// ── Submodels ─────────────────────────────────────────────────────────────────

fn submodel_error(submodel: &SubmodelDescription, reason: impl Into<String>) -> ModelError {
    ModelError::Submodel { name: submodel.name.clone(), reason: reason.into() }
}

fn check_submodel(model: &ModelDescription, submodel: &SubmodelDescription) -> ModelResult<()> {
    let sub = &submodel.model;
    if sub.exit_conditions.is_empty() && submodel.max_steps == 0 {
        return Err(submodel_error(submodel, "needs an exit condition or a step limit"));
    }

    check_unique("mapped environment property", submodel.env_mapping.iter().map(|(s, _)| s.as_str()))?;
    for (sub_name, parent_name) in &submodel.env_mapping {
        let inner = sub
            .environment
            .iter()
            .find(|p| p.name == *sub_name)
            .ok_or_else(|| AbError::not_found("environment property", sub_name))?;
        let outer = model
            .environment
            .iter()
            .find(|p| p.name == *parent_name)
            .ok_or_else(|| AbError::not_found("environment property", parent_name))?;
        let shape = |p: &crate::EnvPropertyDescription| -> (Option<VarType>, usize) {
            (p.default.first().map(|v| v.var_type()), p.default.len())
        };
        if shape(inner) != shape(outer) {
            return Err(AbError::type_mismatch(
                sub_name,
                format!("cannot map onto '{parent_name}': type or length differs"),
            )
            .into());
        }
    }

    check_unique("mapped macro property", submodel.macro_mapping.iter().map(|(s, _)| s.as_str()))?;
    for (sub_name, parent_name) in &submodel.macro_mapping {
        let inner = sub
            .macro_properties
            .iter()
            .find(|p| p.name == *sub_name)
            .ok_or_else(|| AbError::not_found("macro property", sub_name))?;
        let outer = model
            .macro_properties
            .iter()
            .find(|p| p.name == *parent_name)
            .ok_or_else(|| AbError::not_found("macro property", parent_name))?;
        if inner.ty != outer.ty || inner.dims != outer.dims {
            return Err(AbError::type_mismatch(
                sub_name,
                format!("cannot map onto '{parent_name}': type or shape differs"),
            )
            .into());
        }
    }
    Ok(())
}
