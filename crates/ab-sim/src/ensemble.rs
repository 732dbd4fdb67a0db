//! Several instances of one model stepped in lockstep.
//!
//! Every instance gets its own populations, environment, seed and step
//! limit from a [`RunPlan`].  Each step runs layer by layer across all
//! still-running instances, so one ensemble launch covers an agent function
//! for every instance.  An instance that reaches its step limit or fires an
//! exit condition drops out; the rest carry on.

use std::sync::Arc;
use std::time::Instant;

use ab_core::SimConfig;
use ab_model::ModelDescription;
use ab_runtime::KernelCompiler;
use tracing::{debug, info};

use crate::scheduler;
use crate::{NoopObserver, RunLog, RunPlan, SimError, SimResult, Simulation, SimulationBuilder};

pub struct Ensemble {
    model:     Arc<ModelDescription>,
    instances: Vec<Simulation>,
}

impl Ensemble {
    /// One instance per plan, each built from `config` with the plan applied.
    pub fn new(model: Arc<ModelDescription>, config: SimConfig, plans: &[RunPlan]) -> SimResult<Self> {
        Self::with_compiler(model, config, plans, None)
    }

    pub fn with_compiler(
        model:    Arc<ModelDescription>,
        config:   SimConfig,
        plans:    &[RunPlan],
        compiler: Option<Arc<dyn KernelCompiler>>,
    ) -> SimResult<Self> {
        if plans.is_empty() {
            return Err(SimError::invalid("an ensemble needs at least one run plan"));
        }
        let mut instances = Vec::with_capacity(plans.len());
        for plan in plans {
            let mut builder = SimulationBuilder::new(Arc::clone(&model)).config(config.clone());
            if let Some(compiler) = &compiler {
                builder = builder.compiler(Arc::clone(compiler));
            }
            let mut sim = builder.build()?;
            sim.apply_plan(plan)?;
            instances.push(sim);
        }
        debug!(model = %model.name, instances = instances.len(), "ensemble created");
        Ok(Self { model, instances })
    }

    pub fn model(&self) -> &Arc<ModelDescription> {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[Simulation] {
        &self.instances
    }

    /// Mutable access to one instance, e.g. to seed its population.
    pub fn instance_mut(&mut self, index: usize) -> Option<&mut Simulation> {
        self.instances.get_mut(index)
    }

    pub fn logs(&self) -> Vec<&RunLog> {
        self.instances.iter().map(Simulation::run_log).collect()
    }

    /// Run every instance to completion.
    pub fn simulate(&mut self) -> SimResult<()> {
        let start = Instant::now();
        let mut observer = NoopObserver;
        for sim in &mut self.instances {
            sim.begin_simulation()?;
        }

        let n = self.instances.len();
        let mut running = vec![true; n];
        let mut completed = vec![0u32; n];
        let layers = self.model.layers.len();
        let mut batches = 0u64;
        loop {
            for (i, sim) in self.instances.iter().enumerate() {
                if sim.config.step_limit_reached(completed[i]) {
                    running[i] = false;
                }
            }
            let active: Vec<usize> = (0..n).filter(|&i| running[i]).collect();
            if active.is_empty() {
                break;
            }

            let mut batch: Vec<&mut Simulation> = self
                .instances
                .iter_mut()
                .zip(&running)
                .filter(|(_, r)| **r)
                .map(|(s, _)| s)
                .collect();
            let mut started = Vec::with_capacity(batch.len());
            for sim in batch.iter_mut() {
                started.push(sim.begin_step(&mut observer)?);
            }
            for layer in 0..layers {
                scheduler::run_layer(&mut batch, layer)?;
            }
            for ((sim, started), &i) in batch.iter_mut().zip(started).zip(&active) {
                let proceed = sim.end_step(&mut observer, started)?;
                completed[i] = completed[i].saturating_add(1);
                if !proceed {
                    running[i] = false;
                }
            }
            batches += 1;
        }

        for sim in &mut self.instances {
            sim.finish_simulation(&mut observer, start)?;
        }
        info!(
            model = %self.model.name,
            instances = n,
            batches,
            elapsed = ?start.elapsed(),
            "ensemble finished"
        );
        Ok(())
    }
}
