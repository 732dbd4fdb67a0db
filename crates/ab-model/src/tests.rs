//! Unit tests for ab-model.

#[cfg(test)]
mod support {
    use ab_core::VariableSpec;
    use ab_message::{MessageType, SpatialBounds};
    use ab_runtime::{AgentStatus, DeviceApi, ExitStatus, HostApi, RuntimeResult};

    use crate::{AgentBuilder, AgentFunctionBuilder, ModelBuilder};

    pub fn noop(_: &mut DeviceApi<'_>) -> AgentStatus {
        AgentStatus::Alive
    }

    pub fn never(_: &DeviceApi<'_>) -> bool {
        false
    }

    pub fn host_noop(_: &mut HostApi<'_>) -> RuntimeResult<()> {
        Ok(())
    }

    pub fn exit_now(_: &mut HostApi<'_>) -> RuntimeResult<ExitStatus> {
        Ok(ExitStatus::Exit)
    }

    pub fn location() -> MessageType {
        MessageType::Spatial2D(SpatialBounds::new_2d([0.0, 0.0], [10.0, 10.0], 1.0))
    }

    /// A `bird` agent with an emitter, a reader and a second emitter.
    pub fn bird() -> AgentBuilder {
        AgentBuilder::new("bird")
            .variable(VariableSpec::scalar::<f32>("x"))
            .variable(VariableSpec::scalar::<f32>("y"))
            .function(AgentFunctionBuilder::new("emit", noop).message_output("location"))
            .function(AgentFunctionBuilder::new("read", noop).message_input("location"))
            .function(AgentFunctionBuilder::new("emit_again", noop).message_output("location"))
    }

    pub fn base() -> ModelBuilder {
        ModelBuilder::new("flock")
            .message("location", location(), vec![VariableSpec::scalar::<u32>("id")])
            .agent(bird())
    }
}

#[cfg(test)]
mod building {
    use ab_core::{AbError, VarType, Value, VariableSpec};
    use ab_message::MessageKind;

    use crate::{
        AgentBuilder, AgentFunctionBuilder, DEFAULT_STATE, LayerBuilder, ModelBuilder, ModelError,
        SubmodelBuilder,
    };

    use super::support::*;

    #[test]
    fn agent_gets_id_and_default_state() {
        let model = base().build().unwrap();
        let bird = model.agent("bird").unwrap();
        assert_eq!(bird.schema[0].name, "_id");
        assert_eq!(bird.schema.len(), 3);
        assert_eq!(bird.states, vec![DEFAULT_STATE.to_owned()]);
        let emit = bird.function("emit").unwrap();
        assert_eq!(emit.initial_state, DEFAULT_STATE);
        assert_eq!(emit.end_state, DEFAULT_STATE);
    }

    #[test]
    fn spatial_message_schema_has_location_first() {
        let model = base().build().unwrap();
        let message = model.message("location").unwrap();
        let names: Vec<_> = message.schema.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["x", "y", "id"]);
        assert_eq!(message.kind(), MessageKind::Spatial2D);
    }

    #[test]
    fn model_ids_are_unique() {
        let a = base().build().unwrap();
        let b = base().build().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn environment_declarations() {
        let model = ModelBuilder::new("env")
            .environment("speed", 2.0f32)
            .constant("cells", 16u32)
            .environment_array("weights", &[Value::F64(0.5), Value::F64(1.5)], false)
            .macro_property::<u32>("grid", [4, 4, 1, 1])
            .build()
            .unwrap();
        assert_eq!(model.environment.len(), 3);
        assert!(model.environment[1].is_const);
        assert_eq!(model.macro_properties[0].ty, VarType::U32);
    }

    #[test]
    fn duplicate_agent_rejected() {
        let err = base().agent(AgentBuilder::new("bird")).build().unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::DuplicateName { what: "agent", .. })));
    }

    #[test]
    fn reserved_variable_rejected() {
        let err = ModelBuilder::new("m")
            .agent(AgentBuilder::new("a").variable(VariableSpec::scalar::<u32>("_secret")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::ReservedName(_))));
    }

    #[test]
    fn location_collision_rejected() {
        let err = ModelBuilder::new("m")
            .message("location", location(), vec![VariableSpec::scalar::<f32>("x")])
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::DuplicateName { .. })));
    }

    #[test]
    fn unknown_message_rejected() {
        let err = ModelBuilder::new("m")
            .agent(AgentBuilder::new("a").function(AgentFunctionBuilder::new("f", noop).message_input("nope")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::NotFound { what: "message", .. })));
    }

    #[test]
    fn unknown_state_rejected() {
        let err = ModelBuilder::new("m")
            .agent(
                AgentBuilder::new("a")
                    .state("idle")
                    .function(AgentFunctionBuilder::new("f", noop).end_state("busy")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::InvalidState { .. })));
    }

    #[test]
    fn agent_output_target_checked() {
        let err = ModelBuilder::new("m")
            .agent(AgentBuilder::new("a").function(AgentFunctionBuilder::new("f", noop).agent_output("b", "default")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::InvalidAgent(_))));
    }

    #[test]
    fn optional_output_needs_output() {
        let err = ModelBuilder::new("m")
            .agent(AgentBuilder::new("a").function(AgentFunctionBuilder::new("f", noop).optional_output()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::InvalidArgument(_))));
    }

    #[test]
    fn zero_radius_rejected() {
        use ab_message::{MessageType, SpatialBounds};
        let bad = MessageType::Spatial2D(SpatialBounds::new_2d([0.0, 0.0], [1.0, 1.0], 0.0));
        let err = ModelBuilder::new("m").message("m", bad, Vec::new()).build().unwrap_err();
        assert!(matches!(err, ModelError::Message(_)));
    }

    #[test]
    fn macro_zero_dimension_rejected() {
        let err = ModelBuilder::new("m").macro_property::<f32>("grid", [4, 0, 1, 1]).build().unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::InvalidArgument(_))));
    }

    #[test]
    fn condition_and_death_recorded() {
        let model = ModelBuilder::new("m")
            .agent(
                AgentBuilder::new("a")
                    .function(AgentFunctionBuilder::new("f", noop).condition(never).allow_death()),
            )
            .layer(LayerBuilder::new("l").agent_function("a", "f"))
            .build()
            .unwrap();
        let f = model.agent("a").unwrap().function("f").unwrap();
        assert!(f.allow_death);
        assert!(f.condition.is_some());
    }

    #[test]
    fn runtime_functions_detected() {
        let model = ModelBuilder::new("m")
            .agent(AgentBuilder::new("a").function(AgentFunctionBuilder::runtime("f", "move_v1")))
            .build()
            .unwrap();
        assert!(model.has_runtime_functions());
        assert!(!base().build().unwrap().has_runtime_functions());
    }

    #[test]
    fn spatial_sort_targets_follow_spatial_inputs() {
        let model = base().build().unwrap();
        assert_eq!(
            model.spatial_sort_targets(),
            vec![("bird".to_owned(), DEFAULT_STATE.to_owned(), "location".to_owned())]
        );
    }

    #[test]
    fn submodel_mapping_checked() {
        let inner = ModelBuilder::new("inner")
            .environment("speed", 1.0f32)
            .exit_condition("stop", exit_now)
            .build()
            .unwrap();
        let ok = ModelBuilder::new("outer")
            .environment("speed", 3.0f32)
            .submodel(SubmodelBuilder::new("sub", inner.clone()).map_environment("speed", "speed"))
            .layer(LayerBuilder::new("run_sub").submodel("sub"))
            .build();
        assert!(ok.is_ok());

        let err = ModelBuilder::new("outer")
            .environment("speed", 3u32)
            .submodel(SubmodelBuilder::new("sub", inner.clone()).map_environment("speed", "speed"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::TypeMismatch { .. })));

        let err = ModelBuilder::new("outer")
            .submodel(SubmodelBuilder::new("sub", inner).map_environment("speed", "missing"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::NotFound { .. })));
    }

    #[test]
    fn submodel_needs_a_way_to_stop() {
        let inner = ModelBuilder::new("inner").build().unwrap();
        let err = ModelBuilder::new("outer").submodel(SubmodelBuilder::new("sub", inner)).build().unwrap_err();
        assert!(matches!(err, ModelError::Submodel { .. }));
    }

    #[test]
    fn host_hooks_recorded() {
        let model = ModelBuilder::new("m")
            .init_function("init", host_noop)
            .step_function("step", host_noop)
            .exit_function("exit", host_noop)
            .exit_condition("stop", exit_now)
            .build()
            .unwrap();
        assert_eq!(model.init_functions[0].name, "init");
        assert_eq!(model.step_functions.len(), 1);
        assert_eq!(model.exit_functions.len(), 1);
        assert_eq!(model.exit_conditions[0].name, "stop");
    }
}

#[cfg(test)]
mod layers {
    use ab_core::AbError;

    use crate::{AgentBuilder, AgentFunctionBuilder, LayerBuilder, ModelBuilder, ModelError};

    use super::support::*;

    fn layer_error(result: Result<std::sync::Arc<crate::ModelDescription>, ModelError>) -> usize {
        match result {
            Err(ModelError::Layer { layer, .. }) => layer,
            other => panic!("expected a layer error, got {other:?}"),
        }
    }

    #[test]
    fn emit_then_read_is_valid() {
        let model = base()
            .layer(LayerBuilder::new("emit").agent_function("bird", "emit"))
            .layer(LayerBuilder::new("read").agent_function("bird", "read"))
            .build()
            .unwrap();
        assert_eq!(model.layers.len(), 2);
    }

    #[test]
    fn function_in_two_layers() {
        let result = base()
            .layer(LayerBuilder::new("a").agent_function("bird", "emit"))
            .layer(LayerBuilder::new("b").agent_function("bird", "emit"))
            .build();
        assert_eq!(layer_error(result), 1);
    }

    #[test]
    fn same_output_twice_in_layer() {
        let model = ModelBuilder::new("m")
            .message("location", location(), Vec::new())
            .agent(
                AgentBuilder::new("a")
                    .state("s1")
                    .state("s2")
                    .function(AgentFunctionBuilder::new("e1", noop).initial_state("s1").message_output("location"))
                    .function(AgentFunctionBuilder::new("e2", noop).initial_state("s2").message_output("location")),
            )
            .layer(LayerBuilder::new("both").agent_function("a", "e1").agent_function("a", "e2"))
            .build();
        assert_eq!(layer_error(model), 0);
    }

    #[test]
    fn read_own_layer_output() {
        let model = ModelBuilder::new("m")
            .message("location", location(), Vec::new())
            .agent(
                AgentBuilder::new("a")
                    .state("s1")
                    .state("s2")
                    .function(AgentFunctionBuilder::new("emit", noop).initial_state("s1").message_output("location"))
                    .function(AgentFunctionBuilder::new("read", noop).initial_state("s2").message_input("location")),
            )
            .layer(LayerBuilder::new("mixed").agent_function("a", "emit").agent_function("a", "read"))
            .build();
        assert_eq!(layer_error(model), 0);
    }

    #[test]
    fn shared_initial_state() {
        let result = ModelBuilder::new("m")
            .agent(
                AgentBuilder::new("a")
                    .function(AgentFunctionBuilder::new("f", noop))
                    .function(AgentFunctionBuilder::new("g", noop)),
            )
            .layer(LayerBuilder::new("l").agent_function("a", "f").agent_function("a", "g"))
            .build();
        assert_eq!(layer_error(result), 0);
    }

    #[test]
    fn empty_layer() {
        let result = ModelBuilder::new("m").layer(LayerBuilder::new("empty")).build();
        assert_eq!(layer_error(result), 0);
    }

    #[test]
    fn submodel_layer_is_exclusive() {
        let inner = ModelBuilder::new("inner").exit_condition("stop", exit_now).build().unwrap();
        let result = base()
            .submodel(crate::SubmodelBuilder::new("sub", inner))
            .layer(LayerBuilder::new("l").submodel("sub").host_function("h", host_noop))
            .build();
        assert_eq!(layer_error(result), 0);
    }

    #[test]
    fn unknown_function_in_layer() {
        let err = base().layer(LayerBuilder::new("l").agent_function("bird", "fly")).build().unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::NotFound { what: "agent function", .. })));
        let err = base().layer(LayerBuilder::new("l").agent_function("fish", "emit")).build().unwrap_err();
        assert!(matches!(err, ModelError::Core(AbError::InvalidAgent(_))));
    }

    #[test]
    fn host_only_layer_is_valid() {
        let model = ModelBuilder::new("m").layer(LayerBuilder::new("h").host_function("h", host_noop)).build();
        assert!(model.is_ok());
    }
}
