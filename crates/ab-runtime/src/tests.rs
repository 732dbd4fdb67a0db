//! Unit tests for ab-runtime.

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use ab_core::{Columns, DeviceId, VariableSpec};
    use ab_device::DeviceMemory;
    use ab_message::{MessageList, MessageType, SpatialBounds};

    pub fn agent_schema() -> Arc<[VariableSpec]> {
        vec![
            VariableSpec::agent_id(),
            VariableSpec::scalar::<f32>("x"),
            VariableSpec::scalar::<f32>("y"),
            VariableSpec::array::<u32>("hits", 2),
        ]
        .into()
    }

    /// `n` agents with ids `1..=n` and `x = i`.
    pub fn agents(n: usize) -> Columns {
        let mut cols = Columns::with_defaults(agent_schema(), n);
        for i in 0..n {
            cols.set::<u32>("_id", i, 0, i as u32 + 1).unwrap();
            cols.set::<f32>("x", i, 0, i as f32).unwrap();
        }
        cols
    }

    pub fn memory() -> Arc<DeviceMemory> {
        DeviceMemory::new(DeviceId(0), 1 << 24)
    }

    pub fn brute_force_list(values: &[u32]) -> MessageList {
        let schema: Arc<[VariableSpec]> = vec![VariableSpec::scalar::<u32>("value")].into();
        let mut list = MessageList::new("values", MessageType::BruteForce, Arc::clone(&schema)).unwrap();
        list.init(&memory()).unwrap();
        let mut rows = Columns::with_defaults(schema, values.len());
        for (i, &v) in values.iter().enumerate() {
            rows.set::<u32>("value", i, 0, v).unwrap();
        }
        list.append_output(&rows).unwrap();
        list.publish().unwrap();
        list
    }

    pub fn spatial_type() -> MessageType {
        MessageType::Spatial2D(SpatialBounds::new_2d([0.0, 0.0], [10.0, 10.0], 2.5))
    }

    pub fn spatial_schema() -> Arc<[VariableSpec]> {
        let mut vars = spatial_type().implicit_variables();
        vars.push(VariableSpec::scalar::<u32>("sender"));
        vars.into()
    }

    pub fn spatial_list(points: &[(f32, f32)]) -> MessageList {
        let mut list = MessageList::new("location", spatial_type(), spatial_schema()).unwrap();
        list.init(&memory()).unwrap();
        let mut rows = Columns::with_defaults(spatial_schema(), points.len());
        for (i, &(x, y)) in points.iter().enumerate() {
            rows.set::<f32>("x", i, 0, x).unwrap();
            rows.set::<f32>("y", i, 0, y).unwrap();
            rows.set::<u32>("sender", i, 0, i as u32).unwrap();
        }
        list.append_output(&rows).unwrap();
        list.publish().unwrap();
        list
    }
}

#[cfg(test)]
mod bindings {
    use crate::VarBindings;

    use super::support::agent_schema;

    #[test]
    fn resolves_every_variable() {
        let schema = agent_schema();
        let b = VarBindings::new(&schema);
        assert_eq!(b.len(), 4);
        for (i, v) in schema.iter().enumerate() {
            assert_eq!(b.position(&schema, &v.name), Some(i));
        }
        assert_eq!(b.position(&schema, "nope"), None);
    }
}

#[cfg(test)]
mod kernels {
    use ab_message::MessageKind;

    use crate::KernelTable;

    #[test]
    fn one_entry_per_function_and_kind_pair() {
        let mut table = KernelTable::new();
        table.register("move", MessageKind::None, MessageKind::Spatial2D);
        table.register("move", MessageKind::None, MessageKind::Spatial2D);
        table.register("move", MessageKind::BruteForce, MessageKind::None);
        table.register("eat", MessageKind::None, MessageKind::Spatial2D);
        assert_eq!(table.len(), 3);
        assert!(table.get("move", MessageKind::BruteForce, MessageKind::None).is_some());
        assert!(table.get("move", MessageKind::Spatial3D, MessageKind::None).is_none());
    }
}

#[cfg(test)]
mod launches {
    use ab_core::Columns;
    use ab_device::DeviceExceptionBuffer;
    use ab_env::{EnvSnapshot, EnvironmentStore, MacroEnvironmentStore};
    use ab_message::MessageKind;

    use super::support::*;
    use crate::{
        AgentStatus, DeviceApi, LaunchContext, RuntimeError, launch, launch_ensemble, specialise,
    };

    fn plain() -> crate::KernelFn {
        specialise(MessageKind::None, MessageKind::None)
    }

    fn env() -> EnvSnapshot {
        let mut env = EnvironmentStore::new();
        env.declare_scalar::<f32>("speed", 0.5, false).unwrap();
        env.snapshot()
    }

    #[test]
    fn function_updates_every_agent() {
        let agents = agents(5);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("drift", &agents, &env, &macros, &ex);
        let f = |api: &mut DeviceApi<'_>| {
            let x: f32 = api.get("x");
            let speed: f32 = api.environment("speed");
            api.set("x", x + speed);
            api.set_element::<u32>("hits", 1, api.index());
            AgentStatus::Alive
        };
        let out = launch(plain(), &ctx, &f).unwrap();
        assert_eq!(out.agents.len(), 5);
        assert!(out.ran.iter().all(|&r| r));
        assert!(out.alive.is_none());
        assert_eq!(out.agents.get::<f32>("x", 3, 0).unwrap(), 3.5);
        assert_eq!(out.agents.get::<u32>("hits", 4, 1).unwrap(), 4);
        assert_eq!(out.agents.get::<u32>("_id", 2, 0).unwrap(), 3);
    }

    #[test]
    fn death_requires_declaration() {
        let agents = agents(4);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let f = |api: &mut DeviceApi<'_>| {
            if api.get::<f32>("x") >= 2.0 { AgentStatus::Dead } else { AgentStatus::Alive }
        };

        let ctx = LaunchContext::new("cull", &agents, &env, &macros, &ex);
        let err = launch(plain(), &ctx, &f).unwrap_err();
        assert!(matches!(err, RuntimeError::AgentDeathNotEnabled { ref function } if function == "cull"));

        let ctx = LaunchContext::new("cull", &agents, &env, &macros, &ex).with_death(true);
        let out = launch(plain(), &ctx, &f).unwrap();
        assert_eq!(out.alive, Some(vec![true, true, false, false]));
    }

    #[test]
    fn condition_excludes_agents() {
        let agents = agents(4);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let cond = |api: &DeviceApi<'_>| api.get::<f32>("x") < 2.0;
        let ctx = LaunchContext::new("bump", &agents, &env, &macros, &ex).with_condition(&cond);
        let f = |api: &mut DeviceApi<'_>| {
            api.set::<f32>("y", 1.0);
            AgentStatus::Alive
        };
        let out = launch(plain(), &ctx, &f).unwrap();
        assert_eq!(out.ran, vec![true, true, false, false]);
        assert_eq!(out.agents.slice::<f32>("y").unwrap(), &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn device_misuse_is_reraised_with_the_function() {
        let agents = agents(3);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("bad", &agents, &env, &macros, &ex);
        let f = |api: &mut DeviceApi<'_>| {
            let _: f32 = api.get("missing");
            AgentStatus::Alive
        };
        match launch(plain(), &ctx, &f) {
            Err(RuntimeError::DeviceException { function, message }) => {
                assert_eq!(function, "bad");
                assert!(message.contains("missing"));
            }
            other => panic!("expected a device exception, got {other:?}"),
        }
        assert!(!ex.is_raised());
    }

    #[test]
    fn writing_the_id_is_rejected() {
        let agents = agents(1);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("forge", &agents, &env, &macros, &ex);
        let f = |api: &mut DeviceApi<'_>| {
            api.set::<u32>("_id", 99);
            AgentStatus::Alive
        };
        assert!(matches!(launch(plain(), &ctx, &f), Err(RuntimeError::DeviceException { .. })));
    }

    #[test]
    fn brute_force_input_sees_all_messages() {
        let agents = agents(3);
        let list = brute_force_list(&[1, 2, 3, 4]);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("sum", &agents, &env, &macros, &ex).with_message_in(&list);
        let f = |api: &mut DeviceApi<'_>| {
            let total: u32 = api.message_in().iter().map(|m| m.get::<u32>("value")).sum();
            api.set_element::<u32>("hits", 0, total);
            AgentStatus::Alive
        };
        let kernel = specialise(MessageKind::BruteForce, MessageKind::None);
        let out = launch(kernel, &ctx, &f).unwrap();
        assert_eq!(out.agents.get::<u32>("hits", 2, 0).unwrap(), 10);
    }

    #[test]
    fn spatial_input_returns_nearby_bins() {
        let mut agents = agents(2);
        agents.set::<f32>("x", 0, 0, 1.5).unwrap();
        agents.set::<f32>("y", 0, 0, 1.5).unwrap();
        agents.set::<f32>("x", 1, 0, 9.5).unwrap();
        agents.set::<f32>("y", 1, 0, 9.5).unwrap();
        let list = spatial_list(&[(1.0, 1.0), (9.0, 9.0), (8.0, 9.5)]);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("sense", &agents, &env, &macros, &ex).with_message_in(&list);
        let f = |api: &mut DeviceApi<'_>| {
            let pos = [api.get::<f32>("x"), api.get::<f32>("y"), 0.0];
            let seen = api.message_in().neighbours(pos).count() as u32;
            api.set_element::<u32>("hits", 0, seen);
            AgentStatus::Alive
        };
        let kernel = specialise(MessageKind::Spatial2D, MessageKind::None);
        let out = launch(kernel, &ctx, &f).unwrap();
        assert_eq!(out.agents.slice::<u32>("hits").unwrap(), &[1, 0, 2, 0]);
    }

    #[test]
    fn kind_mismatch_is_a_device_exception() {
        let agents = agents(1);
        let list = brute_force_list(&[1]);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("sense", &agents, &env, &macros, &ex).with_message_in(&list);
        let f = |_: &mut DeviceApi<'_>| AgentStatus::Alive;
        let kernel = specialise(MessageKind::Spatial2D, MessageKind::None);
        assert!(matches!(launch(kernel, &ctx, &f), Err(RuntimeError::DeviceException { .. })));
    }

    #[test]
    fn required_output_emits_for_every_agent() {
        let agents = agents(3);
        let schema = spatial_schema();
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let f = |api: &mut DeviceApi<'_>| {
            let x: f32 = api.get("x");
            if x > 0.0 {
                api.message_out().set::<f32>("x", x);
            }
            AgentStatus::Alive
        };
        let kernel = specialise(MessageKind::None, MessageKind::Spatial2D);

        let ctx = LaunchContext::new("emit", &agents, &env, &macros, &ex).with_message_out(&schema, false);
        let out = launch(kernel, &ctx, &f).unwrap();
        assert_eq!(out.messages.as_ref().map(Columns::len), Some(3));

        let ctx = LaunchContext::new("emit", &agents, &env, &macros, &ex).with_message_out(&schema, true);
        let out = launch(kernel, &ctx, &f).unwrap();
        let messages = out.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.slice::<f32>("x").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn agent_output_stages_births() {
        let agents = agents(3);
        let schema = agent_schema();
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let ctx = LaunchContext::new("split", &agents, &env, &macros, &ex).with_agent_out(&schema);
        let f = |api: &mut DeviceApi<'_>| {
            if api.index() % 2 == 0 {
                let x: f32 = api.get("x");
                api.agent_out().set::<f32>("x", x + 100.0);
            }
            AgentStatus::Alive
        };
        let out = launch(plain(), &ctx, &f).unwrap();
        let births = out.births.unwrap();
        assert_eq!(births.slice::<f32>("x").unwrap(), &[100.0, 102.0]);
        assert_eq!(births.slice::<u32>("_id").unwrap(), &[0, 0]);
    }

    #[test]
    fn rng_is_deterministic_per_seed() {
        let agents = agents(8);
        let (env, macros, ex) = (env(), MacroEnvironmentStore::new(), DeviceExceptionBuffer::new());
        let f = |api: &mut DeviceApi<'_>| {
            let r: f32 = api.rng().random();
            api.set::<f32>("y", r);
            AgentStatus::Alive
        };
        let run = |seed| {
            let ctx = LaunchContext::new("jitter", &agents, &env, &macros, &ex).with_seed(seed, 3);
            launch(plain(), &ctx, &f).unwrap().agents.slice::<f32>("y").unwrap().to_vec()
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn ensemble_splits_threads_by_instance() {
        let (a, b, c) = (agents(3), agents(0), agents(2));
        let (env, macros) = (env(), MacroEnvironmentStore::new());
        let ex = [DeviceExceptionBuffer::new(), DeviceExceptionBuffer::new(), DeviceExceptionBuffer::new()];
        let ctxs = [
            LaunchContext::new("tag", &a, &env, &macros, &ex[0]),
            LaunchContext::new("tag", &b, &env, &macros, &ex[1]),
            LaunchContext::new("tag", &c, &env, &macros, &ex[2]),
        ];
        let f = |api: &mut DeviceApi<'_>| {
            api.set_element::<u32>("hits", 0, api.index() + 10);
            AgentStatus::Alive
        };
        let outs = launch_ensemble(plain(), &ctxs, &f).unwrap();
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0].agents.len(), 3);
        assert!(outs[1].agents.is_empty());
        assert_eq!(outs[2].agents.get::<u32>("hits", 1, 0).unwrap(), 11);
        assert_eq!(outs[2].agents.get::<f32>("x", 1, 0).unwrap(), 1.0);
    }

    #[test]
    fn thread_count_must_fit_u32() {
        use ab_core::AbError;

        use crate::launch::thread_count;

        assert_eq!(thread_count("tag", 7).unwrap(), 7);
        assert_eq!(thread_count("tag", u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(
            thread_count("tag", u32::MAX as usize + 1),
            Err(RuntimeError::Core(AbError::InvalidArgument(_)))
        ));
    }
}

#[cfg(test)]
mod macros {
    use ab_core::DeviceId;
    use ab_device::{DeviceExceptionBuffer, DeviceMemory, Stream};
    use ab_env::{EnvironmentStore, MacroEnvironmentStore};
    use ab_message::MessageKind;

    use super::support::agents;
    use crate::{AgentStatus, DeviceApi, LaunchContext, launch, specialise};

    #[test]
    fn agents_accumulate_into_a_macro_property() {
        let memory = DeviceMemory::new(DeviceId(0), 1 << 20);
        let mut macros = MacroEnvironmentStore::new();
        macros.declare_typed::<u32>("count", [1, 1, 1, 1]).unwrap();
        macros.allocate(&memory).unwrap();

        let agents = agents(50);
        let env = EnvironmentStore::new().snapshot();
        let ex = DeviceExceptionBuffer::new();
        let ctx = LaunchContext::new("count", &agents, &env, &macros, &ex);
        let f = |api: &mut DeviceApi<'_>| {
            api.macro_property::<u32>("count").add([0, 0, 0, 0], 1);
            AgentStatus::Alive
        };
        launch(specialise(MessageKind::None, MessageKind::None), &ctx, &f).unwrap();

        let mut streams = Stream::set(1);
        macros.reset_race_flags(&mut streams);
        Stream::synchronize_all(&mut streams);
        drop(streams);
        let total = macros.get_accessor::<u32>("count", [1, 1, 1, 1]).unwrap();
        assert_eq!(total.get([0, 0, 0, 0]).unwrap(), 50);
    }
}

#[cfg(test)]
mod host {
    use ab_agent::{AgentPopulation, Reduction};
    use ab_core::{AbError, SimRng};
    use ab_env::{EnvironmentStore, MacroEnvironmentStore};

    use super::support::agent_schema;
    use crate::{HostApi, RuntimeError};

    fn population() -> AgentPopulation {
        AgentPopulation::new("walker", agent_schema(), &["default".to_owned()])
    }

    #[test]
    fn unknown_agent_is_invalid() {
        let mut pops = vec![population()];
        let env = EnvironmentStore::new();
        let macros = MacroEnvironmentStore::new();
        let mut rng = SimRng::new(1);
        let mut api = HostApi::new(&mut pops, &env, &macros, &mut rng, 0);
        assert!(matches!(api.agent("nobody"), Err(RuntimeError::Core(AbError::InvalidAgent(_)))));
    }

    #[test]
    fn births_are_staged_until_flushed() {
        let mut pops = vec![population()];
        let env = EnvironmentStore::new();
        let macros = MacroEnvironmentStore::new();
        let mut rng = SimRng::new(1);
        {
            let mut api = HostApi::new(&mut pops, &env, &macros, &mut rng, 0);
            let mut walker = api.agent("walker").unwrap();
            walker.new_agent("default").unwrap().set::<f32>("x", 4.0).unwrap();
            walker.new_agent("default").unwrap().set::<f32>("x", 6.0).unwrap();
            assert_eq!(walker.count("default").unwrap(), 0);
            assert!(!api.populations_replaced());
        }
        assert_eq!(pops[0].pending(), 2);
    }

    #[test]
    fn reduce_and_replace_population() {
        let mut pops = vec![population()];
        let env = EnvironmentStore::new();
        let macros = MacroEnvironmentStore::new();
        let mut rng = SimRng::new(1);
        let mut api = HostApi::new(&mut pops, &env, &macros, &mut rng, 0);
        let mut walker = api.agent("walker").unwrap();
        let mut v = walker.get_population("default").unwrap();
        for x in [1.0f32, 2.0, 6.0] {
            let i = v.push();
            v.set::<f32>(i, "x", x).unwrap();
        }
        walker.set_population("default", &v).unwrap();
        assert_eq!(walker.reduce("default", "x", Reduction::Sum).unwrap(), Some(9.0));
        assert_eq!(walker.reduce("default", "x", Reduction::Mean).unwrap(), Some(3.0));
        assert!(api.populations_replaced());
    }

    #[test]
    fn environment_access() {
        let mut pops = vec![population()];
        let mut env = EnvironmentStore::new();
        env.declare_scalar::<i32>("level", 2, false).unwrap();
        let macros = MacroEnvironmentStore::new();
        let mut rng = SimRng::new(1);
        let api = HostApi::new(&mut pops, &env, &macros, &mut rng, 7);
        assert_eq!(api.set_env::<i32>("level", 5).unwrap(), 2);
        assert_eq!(api.get_env::<i32>("level").unwrap(), 5);
        assert!(matches!(
            api.set_env::<i32>("_level", 1),
            Err(RuntimeError::Core(AbError::ReservedName(_)))
        ));
        assert_eq!(api.step_count(), 7);
    }
}

#[cfg(test)]
mod compiler {
    use ab_message::MessageKind;

    use crate::{AgentStatus, DeviceApi, KernelCompiler, KernelRegistry, RuntimeError};

    #[test]
    fn unknown_source_fails_to_compile() {
        let mut registry = KernelRegistry::new();
        registry.register("idle_src", |_: &mut DeviceApi<'_>| AgentStatus::Alive);
        assert!(registry.contains("idle_src"));
        let compiled = registry.compile("idle", "idle_src", MessageKind::None, MessageKind::None).unwrap();
        assert_eq!(compiled.function_hash, ab_core::namespace_hash("idle"));

        let err = registry.compile("idle", "other_src", MessageKind::None, MessageKind::None).unwrap_err();
        assert!(matches!(err, RuntimeError::Compile { ref function, .. } if function == "idle"));
    }
}
