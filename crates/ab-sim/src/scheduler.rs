//! Layer execution.
//!
//! # One layer
//!
//! ```text
//! ① Flags     — macro race flags cleared; a host read in this layer only
//!               conflicts with device writes from this layer.
//! ② Launch    — one launch per (agent function × instance).  With
//!               in-layer concurrency each function gets its own stream;
//!               a batch of instances shares one ensemble launch.
//! ③ Join      — every stream synchronised.  Nothing is mutated before.
//! ④ Apply     — per function, in declared order:
//!                 write back   → updated rows replace the input state
//!                 death        → dead rows removed
//!                 transition   → rows that ran move to the end state
//!                 messages     → output appended to the message list
//!                 births       → staged for the end of the layer
//! ⑤ Publish   — every message list written in this layer swaps buffers
//!               and rebuilds its spatial index.
//! ⑥ Births    — device births merged with fresh IDs.
//! ⑦ Host      — the layer's host functions run per instance.
//! ```
//!
//! A layer naming a submodel runs that submodel to completion instead.
//!
//! Launches only borrow state; every launch returns owned output, and
//! state is mutated in ④ after the join, so functions in one layer never
//! observe each other's writes.

use std::sync::Arc;

use ab_core::{AbError, Columns};
use ab_device::{DeviceExceptionBuffer, Stream};
use ab_env::EnvSnapshot;
use ab_message::MessageKind;
use ab_model::{AgentFunctionDescription, LayerDescription, ModelDescription};
use ab_runtime::{CompiledKernel, LaunchContext, LaunchOutput, RuntimeResult, launch, launch_ensemble};
use tracing::{debug, trace};

use crate::{SimResult, Simulation};

#[cfg(feature = "fx-hash")]
type Set<T> = rustc_hash::FxHashSet<T>;
#[cfg(not(feature = "fx-hash"))]
type Set<T> = std::collections::HashSet<T>;

/// `(agent, function)` indices of one agent function in a layer.
#[derive(Copy, Clone, Debug)]
struct Slot {
    agent:    usize,
    function: usize,
}

/// Message kinds a function's kernel is specialised for.
pub(crate) fn function_kinds(
    model:    &ModelDescription,
    function: &AgentFunctionDescription,
) -> SimResult<(MessageKind, MessageKind)> {
    let kind = |name: &Option<String>| -> SimResult<MessageKind> {
        match name {
            None => Ok(MessageKind::None),
            Some(m) => model
                .message(m)
                .map(|d| d.kind())
                .ok_or_else(|| AbError::not_found("message", m).into()),
        }
    };
    Ok((kind(&function.message_input)?, kind(&function.message_output)?))
}

fn resolve_slots(model: &ModelDescription, layer: &LayerDescription) -> SimResult<Vec<Slot>> {
    layer
        .agent_functions
        .iter()
        .map(|r| {
            let agent = model.agent_index(&r.agent).ok_or_else(|| AbError::InvalidAgent(r.agent.clone()))?;
            let function = model.agents[agent]
                .functions
                .iter()
                .position(|f| f.name == r.function)
                .ok_or_else(|| AbError::not_found("agent function", &r.function))?;
            Ok(Slot { agent, function })
        })
        .collect()
}

/// Run layer `layer` for every simulation in `sims`.
///
/// All of `sims` must be instances of the same model.  Several instances
/// are batched into one ensemble launch per agent function.
pub(crate) fn run_layer(sims: &mut [&mut Simulation], layer: usize) -> SimResult<()> {
    let Some(lead) = sims.first() else {
        return Ok(());
    };
    let model = Arc::clone(&lead.model);
    let desc = &model.layers[layer];
    trace!(layer = %desc.name, instances = sims.len(), "layer start");

    if let Some(name) = &desc.submodel {
        for sim in sims.iter_mut() {
            sim.run_submodel(name)?;
        }
        return Ok(());
    }

    let slots = resolve_slots(&model, desc)?;
    if slots.is_empty() {
        for sim in sims.iter() {
            sim.reset_race_flags();
        }
    } else {
        let outputs = launch_layer(sims, &model, &slots)?;
        for (sim, outputs) in sims.iter_mut().zip(outputs) {
            apply_layer(sim, &model, &slots, outputs)?;
        }
    }
    for sim in sims.iter_mut() {
        sim.run_host(&desc.host_functions)?;
    }
    Ok(())
}

// ── Launch ────────────────────────────────────────────────────────────────────

/// Launch every slot for every instance.  Returns outputs indexed
/// `[instance][slot]`.
fn launch_layer(
    sims:  &[&mut Simulation],
    model: &ModelDescription,
    slots: &[Slot],
) -> SimResult<Vec<Vec<LaunchOutput>>> {
    let views: Vec<&Simulation> = sims.iter().map(|s| &**s).collect();
    let lead = views[0];

    let kernels: Vec<&CompiledKernel> =
        slots.iter().map(|s| lead.kernel(model, *s)).collect::<SimResult<_>>()?;
    let snapshots: Vec<EnvSnapshot> = views.iter().map(|s| s.env.snapshot()).collect();
    let exceptions: Vec<Vec<DeviceExceptionBuffer>> =
        views.iter().map(|_| slots.iter().map(|_| DeviceExceptionBuffer::new()).collect()).collect();

    // contexts[slot][instance]
    let mut contexts: Vec<Vec<LaunchContext<'_>>> = Vec::with_capacity(slots.len());
    for (j, slot) in slots.iter().enumerate() {
        let mut per_instance = Vec::with_capacity(views.len());
        for (i, sim) in views.iter().enumerate() {
            per_instance.push(sim.launch_context(model, *slot, &snapshots[i], &exceptions[i][j])?);
        }
        contexts.push(per_instance);
    }

    let concurrent = lead.config.in_layer_concurrency && slots.len() > 1;
    let mut results: Vec<Option<RuntimeResult<Vec<LaunchOutput>>>> = slots.iter().map(|_| None).collect();
    {
        let mut streams = Stream::set(if concurrent { slots.len() } else { 1 });
        // Flags are cleared on the layer's streams and joined before any
        // launch, so no clear can overtake a write from this layer.
        for sim in &views {
            sim.macros.reset_race_flags(&mut streams);
        }
        Stream::synchronize_all(&mut streams);
        for (j, (ctxs, out)) in contexts.iter().zip(results.iter_mut()).enumerate() {
            let entry = kernels[j].entry;
            let function = &*kernels[j].function;
            let stream = if concurrent { j } else { 0 };
            streams[stream].enqueue(move || {
                *out = Some(match ctxs.as_slice() {
                    [single] => launch(entry, single, function).map(|o| vec![o]),
                    batch => launch_ensemble(entry, batch, function),
                });
            });
        }
        Stream::synchronize_all(&mut streams);
    }

    let mut per_instance: Vec<Vec<LaunchOutput>> = views.iter().map(|_| Vec::with_capacity(slots.len())).collect();
    for result in results {
        let outputs = result.ok_or(AbError::NotInitialized("layer launch"))??;
        for (i, output) in outputs.into_iter().enumerate() {
            per_instance[i].push(output);
        }
    }
    Ok(per_instance)
}

impl Simulation {
    fn kernel(&self, model: &ModelDescription, slot: Slot) -> SimResult<&CompiledKernel> {
        self.kernels[slot.agent][slot.function].as_ref().ok_or_else(|| {
            AbError::NotInitialized(if model.agents[slot.agent].functions[slot.function].body.is_runtime() {
                "runtime-compiled agent function"
            } else {
                "agent function kernel"
            })
            .into()
        })
    }

    fn launch_context<'a>(
        &'a self,
        model:      &'a ModelDescription,
        slot:       Slot,
        snapshot:   &'a EnvSnapshot,
        exceptions: &'a DeviceExceptionBuffer,
    ) -> SimResult<LaunchContext<'a>> {
        let function = &model.agents[slot.agent].functions[slot.function];
        let state = self.agents[slot.agent].state(&function.initial_state)?;
        let mut ctx = LaunchContext::new(&function.name, state.columns(), snapshot, &self.macros, exceptions)
            .with_death(function.allow_death)
            .with_seed(self.rng.seed(), self.step_count);
        if let Some(message) = &function.message_input {
            ctx = ctx.with_message_in(&self.messages[self.message_index(message)?]);
        }
        if let Some(message) = &function.message_output {
            ctx = ctx.with_message_out(self.messages[self.message_index(message)?].schema(), function.optional_output);
        }
        if let Some((agent, _)) = &function.agent_output {
            ctx = ctx.with_agent_out(self.agents[self.agent_index(agent)?].schema());
        }
        if let Some(condition) = &function.condition {
            ctx = ctx.with_condition(&*condition.0);
        }
        Ok(ctx)
    }
}

// ── Apply ─────────────────────────────────────────────────────────────────────

fn apply_layer(
    sim:     &mut Simulation,
    model:   &ModelDescription,
    slots:   &[Slot],
    outputs: Vec<LaunchOutput>,
) -> SimResult<()> {
    let mut written: Set<usize> = Set::default();
    let mut births: Vec<(usize, String, Columns)> = Vec::new();

    for (slot, output) in slots.iter().zip(outputs) {
        let function = &model.agents[slot.agent].functions[slot.function];
        let LaunchOutput { agents, ran, alive, messages, births: born } = output;

        let population = &mut sim.agents[slot.agent];
        let from = population.state_index(&function.initial_state)?;
        population.state_at_mut(from).write_back(agents)?;

        let mut ran = ran;
        let mut deaths = 0;
        if let Some(alive) = alive {
            deaths = alive.iter().filter(|a| !**a).count();
            if deaths > 0 {
                ran = ran.iter().zip(&alive).filter(|(_, a)| **a).map(|(r, _)| *r).collect();
                population.state_at_mut(from).retain(&alive);
            }
        }

        let mut moved = 0;
        if function.end_state != function.initial_state {
            let to = population.state_index(&function.end_state)?;
            let rows = population.state_at_mut(from).extract(&ran);
            moved = rows.len();
            population.state_at_mut(to).append(&rows)?;
        }

        let mut emitted = 0;
        if let (Some(message), Some(rows)) = (&function.message_output, messages) {
            let m = sim.message_index(message)?;
            emitted = rows.len();
            sim.messages[m].append_output(&rows)?;
            written.insert(m);
        }

        if let (Some((agent, state)), Some(rows)) = (&function.agent_output, born) {
            if !rows.is_empty() {
                births.push((sim.agent_index(agent)?, state.clone(), rows));
            }
        }

        trace!(function = %function.name, deaths, moved, emitted, "launch applied");
    }

    for m in written {
        sim.messages[m].publish()?;
    }

    if !births.is_empty() {
        sim.lifecycle.ensure_ids(&mut sim.agents)?;
        let mut born = 0;
        for (agent, state, rows) in births {
            let list = sim.agents[agent].state_mut(&state)?;
            born += sim.lifecycle.merge_births(list, rows)?;
        }
        debug!(born, step = sim.step_count, "device births merged");
    }
    sim.charge_agents()
}
