//! User-code extension points.
//!
//! | Trait             | Runs on | Called                                            |
//! |-------------------|---------|---------------------------------------------------|
//! | [`AgentFunction`] | device  | once per live agent of one state, inside a layer  |
//! | [`AgentCondition`]| device  | before an agent function, per agent               |
//! | [`HostFunction`]  | host    | in a layer, or as an init/step/exit function      |
//! | [`ExitCondition`] | host    | after step functions, every step                  |
//!
//! Every trait has a blanket impl for the matching closure type, so simple
//! models can pass closures directly.
//!
//! # Thread safety
//!
//! Agent functions and conditions are called for many agents in parallel and
//! from several streams at once, so they must be `Send + Sync`.  Per-agent
//! state lives in agent variables, not in the function object.
//!
//! # Example
//!
//! ```rust,ignore
//! let drift = |api: &mut DeviceApi<'_>| {
//!     let x: f32 = api.get("x");
//!     let dx: f32 = api.environment("speed");
//!     api.set("x", x + dx);
//!     AgentStatus::Alive
//! };
//! ```

use crate::{AgentStatus, DeviceApi, ExitStatus, HostApi, RuntimeResult};

pub trait AgentFunction: Send + Sync + 'static {
    fn run(&self, api: &mut DeviceApi<'_>) -> AgentStatus;
}

impl<F> AgentFunction for F
where
    F: Fn(&mut DeviceApi<'_>) -> AgentStatus + Send + Sync + 'static,
{
    fn run(&self, api: &mut DeviceApi<'_>) -> AgentStatus {
        self(api)
    }
}

/// Agents for which `check` returns `false` sit out the launch and keep
/// their state and variables unchanged.
pub trait AgentCondition: Send + Sync + 'static {
    fn check(&self, api: &DeviceApi<'_>) -> bool;
}

impl<F> AgentCondition for F
where
    F: Fn(&DeviceApi<'_>) -> bool + Send + Sync + 'static,
{
    fn check(&self, api: &DeviceApi<'_>) -> bool {
        self(api)
    }
}

pub trait HostFunction: Send + Sync + 'static {
    fn run(&self, api: &mut HostApi<'_>) -> RuntimeResult<()>;
}

impl<F> HostFunction for F
where
    F: Fn(&mut HostApi<'_>) -> RuntimeResult<()> + Send + Sync + 'static,
{
    fn run(&self, api: &mut HostApi<'_>) -> RuntimeResult<()> {
        self(api)
    }
}

pub trait ExitCondition: Send + Sync + 'static {
    fn check(&self, api: &mut HostApi<'_>) -> RuntimeResult<ExitStatus>;
}

impl<F> ExitCondition for F
where
    F: Fn(&mut HostApi<'_>) -> RuntimeResult<ExitStatus> + Send + Sync + 'static,
{
    fn check(&self, api: &mut HostApi<'_>) -> RuntimeResult<ExitStatus> {
        self(api)
    }
}
