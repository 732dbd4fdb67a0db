//! Per-run overrides.

use ab_core::{Scalar, Value};
use ab_model::ModelDescription;

/// Step limit, seed and environment overrides for one run of one model.
///
/// A plan is bound to the model it was created for; handing it to a
/// simulation of another model fails with `InvalidArgument`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunPlan {
    model_id:        u64,
    pub steps:       u32,
    pub seed:        Option<u64>,
    pub environment: Vec<(String, Vec<Value>)>,
}

impl RunPlan {
    /// A single-step plan with no overrides.
    pub fn new(model: &ModelDescription) -> Self {
        Self { model_id: model.id, steps: 1, seed: None, environment: Vec::new() }
    }

    pub fn model_id(&self) -> u64 {
        self.model_id
    }

    /// `0` runs until an exit condition fires.
    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn set_env<T: Scalar>(self, name: impl Into<String>, value: T) -> Self {
        self.set_env_array(name, vec![value.into_value()])
    }

    pub fn set_env_array(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        let name = name.into();
        self.environment.retain(|(n, _)| *n != name);
        self.environment.push((name, values));
        self
    }

    /// `count` plans with consecutive seeds starting at `base_seed`.
    pub fn sweep_seeds(model: &ModelDescription, steps: u32, base_seed: u64, count: usize) -> Vec<RunPlan> {
        (0..count as u64).map(|i| RunPlan::new(model).steps(steps).seed(base_seed + i)).collect()
    }
}
