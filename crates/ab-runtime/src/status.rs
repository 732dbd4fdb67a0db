//! Values returned by user functions to the scheduler.

/// What an agent function decided for the agent it ran on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AgentStatus {
    #[default]
    Alive,
    /// Remove the agent at the end of the launch.  Only valid for functions
    /// declared with death enabled.
    Dead,
}

/// Verdict of an exit condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ExitStatus {
    #[default]
    Continue,
    /// Stop the simulation after the current step.
    Exit,
}
