//! 任务监督模块：按重启策略运行后台任务，并通过状态机公开其生命周期。
//!
//! # Task Supervisor Module
//!
//! Long-running background tasks (the queue flush worker, the HTTP server)
//! run under a [`Supervisor`] that restarts them after errors or panics with
//! capped exponential backoff.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Supervisor`] | Spawns and restarts a task, exposes its state over a `watch` channel |
//! | [`SupervisorState`] | `Starting -> Running -> Crashed -> BackingOff -> ... -> Stopped` |
//! | [`RestartPolicy`] | Restart budget, backoff bounds, health-check interval |
//! | [`HealthProbe`] | Optional liveness check; failing it restarts the task |
//!
//! A task that returns `Ok(())`, or a supervisor asked to [`stop`](Supervisor::stop),
//! ends in `Stopped` without restarting. Exceeding `max_restarts` also ends in
//! `Stopped`, with the last failure kept in [`Supervisor::last_error`].

mod policy;
mod task;

pub use policy::RestartPolicy;
pub use task::{HealthProbe, Supervisor, SupervisorState};
