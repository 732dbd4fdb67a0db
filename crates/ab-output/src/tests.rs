//! Unit tests for ab-output.

#[cfg(test)]
mod support {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use ab_agent::{AgentVector, Reduction};
    use ab_core::{SimConfig, Value, VariableSpec};
    use ab_model::{AgentBuilder, AgentFunctionBuilder, LayerBuilder, ModelBuilder, ModelDescription};
    use ab_runtime::{AgentStatus, DeviceApi};
    use ab_sim::{AgentLogConfig, AgentRecord, LogFrame, LoggingConfig, ReductionRecord};
    use tempfile::TempDir;

    pub fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    /// Step 3: `speed = 1.5`, `bounds = [0, 10]`, two walkers with max x 4.
    pub fn frame() -> LogFrame {
        let mut environment = BTreeMap::new();
        environment.insert("speed".to_string(), vec![Value::F32(1.5)]);
        environment.insert("bounds".to_string(), vec![Value::U32(0), Value::U32(10)]);
        LogFrame {
            step: 3,
            environment,
            agents: vec![AgentRecord {
                agent:      "walker".into(),
                state:      "default".into(),
                count:      Some(2),
                reductions: vec![
                    ReductionRecord { variable: "x".into(), reduction: Reduction::Max, value: Some(4.0) },
                    ReductionRecord { variable: "y".into(), reduction: Reduction::Mean, value: None },
                ],
            }],
        }
    }

    fn drift(api: &mut DeviceApi<'_>) -> AgentStatus {
        let x: f32 = api.get("x");
        let speed: f32 = api.environment("speed");
        api.set("x", x + speed);
        AgentStatus::Alive
    }

    pub fn drifting() -> Arc<ModelDescription> {
        ModelBuilder::new("drift")
            .environment("speed", 1.5f32)
            .agent(
                AgentBuilder::new("walker")
                    .variable(VariableSpec::scalar::<f32>("x"))
                    .function(AgentFunctionBuilder::new("drift", drift)),
            )
            .layer(LayerBuilder::new("move").agent_function("walker", "drift"))
            .build()
            .unwrap()
    }

    pub fn walkers(model: &ModelDescription, n: usize) -> AgentVector {
        let schema = Arc::clone(&model.agent("walker").unwrap().schema);
        let mut v = AgentVector::new("walker", schema, n);
        for i in 0..n {
            v.set::<f32>(i, "x", i as f32).unwrap();
        }
        v
    }

    pub fn logging() -> LoggingConfig {
        LoggingConfig::new()
            .environment("speed")
            .agent(AgentLogConfig::new("walker", "default").count().reduce("x", Reduction::Max))
    }

    pub fn config(steps: u32) -> SimConfig {
        SimConfig { steps, random_seed: Some(7), timing: true, ..SimConfig::default() }
    }

    pub fn records(dir: &TempDir, file: &str) -> (Vec<String>, Vec<Vec<String>>) {
        let mut rdr = ::csv::Reader::from_path(dir.path().join(file)).unwrap();
        let headers = rdr.headers().unwrap().iter().map(str::to_owned).collect();
        let rows = rdr.records().map(|r| r.unwrap().iter().map(str::to_owned).collect()).collect();
        (headers, rows)
    }
}

#[cfg(test)]
mod rows {
    use std::time::Duration;

    use ab_sim::RunLog;

    use super::support::frame;
    use crate::row::{agent_rows, environment_rows, timing_rows};
    use crate::FrameKind;

    #[test]
    fn environment_arrays_flatten_by_element() {
        let rows = environment_rows(FrameKind::Step, &frame());
        let flat: Vec<(&str, usize, f64)> = rows.iter().map(|r| (r.property.as_str(), r.index, r.value)).collect();
        assert_eq!(flat, vec![("bounds", 0, 0.0), ("bounds", 1, 10.0), ("speed", 0, 1.5)]);
        assert!(rows.iter().all(|r| r.step == 3 && r.frame == FrameKind::Step));
    }

    #[test]
    fn agent_rows_put_count_first() {
        let rows = agent_rows(FrameKind::Exit, &frame());
        let metrics: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, ["count", "max", "mean"]);
        assert_eq!(rows[0].variable, None);
        assert_eq!(rows[0].value, Some(2.0));
        assert_eq!(rows[1].variable.as_deref(), Some("x"));
        assert_eq!(rows[2].value, None);
    }

    #[test]
    fn timings_list_steps_then_phases() {
        let log = RunLog {
            step_timings: vec![Duration::from_millis(500), Duration::from_millis(250)],
            simulate: Duration::from_secs(1),
            ..RunLog::default()
        };
        let rows = timing_rows(&log);
        let phases: Vec<&str> = rows.iter().map(|r| r.phase.as_str()).collect();
        assert_eq!(phases, ["step", "step", "rtc_init", "init_functions", "exit_functions", "simulate"]);
        assert_eq!(rows[1].step, Some(1));
        assert_eq!(rows[1].seconds, 0.25);
        assert_eq!(rows[5].step, None);
        assert_eq!(rows[5].seconds, 1.0);
    }
}

#[cfg(test)]
mod csv_tests {
    use super::support::{frame, records, tmp};
    use crate::csv::CsvWriter;
    use crate::observer::write_frame;
    use crate::writer::OutputWriter;
    use crate::{FrameKind, OutputError};

    #[test]
    fn csv_files_created() {
        let dir = tmp();
        let _w = CsvWriter::new(dir.path()).unwrap();
        assert!(dir.path().join("environment.csv").exists());
        assert!(dir.path().join("agents.csv").exists());
        assert!(dir.path().join("timings.csv").exists());
    }

    #[test]
    fn csv_headers_correct() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        w.finish().unwrap();

        assert_eq!(records(&dir, "environment.csv").0, ["frame", "step", "property", "index", "value"]);
        assert_eq!(
            records(&dir, "agents.csv").0,
            ["frame", "step", "agent", "state", "metric", "variable", "value"]
        );
        assert_eq!(records(&dir, "timings.csv").0, ["phase", "step", "seconds"]);
    }

    #[test]
    fn csv_frame_rows() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        write_frame(&mut w, FrameKind::Step, &frame()).unwrap();
        w.finish().unwrap();

        let (_, env) = records(&dir, "environment.csv");
        assert_eq!(env.len(), 3);
        assert_eq!(env[2], ["step", "3", "speed", "0", "1.5"]);

        let (_, agents) = records(&dir, "agents.csv");
        assert_eq!(agents[0], ["step", "3", "walker", "default", "count", "", "2"]);
        assert_eq!(agents[1], ["step", "3", "walker", "default", "max", "x", "4"]);
        // Empty-state reduction.
        assert_eq!(&agents[2][6], "");
    }

    #[test]
    fn csv_finish_idempotent() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        w.finish().unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn csv_write_after_finish_fails() {
        let dir = tmp();
        let mut w = CsvWriter::new(dir.path()).unwrap();
        w.finish().unwrap();
        assert!(matches!(w.write_timings(&[]), Err(OutputError::Finished)));
    }

    #[test]
    fn csv_missing_dir_fails() {
        let dir = tmp();
        let err = CsvWriter::new(&dir.path().join("missing")).err().unwrap();
        assert!(matches!(err, OutputError::Csv(_)));
    }
}

#[cfg(test)]
mod json_tests {
    use std::fs::File;

    use super::support::{frame, tmp};
    use crate::json::JsonWriter;
    use crate::observer::write_frame;
    use crate::writer::OutputWriter;
    use crate::{FrameKind, OutputError};

    fn read(path: &std::path::Path) -> serde_json::Value {
        serde_json::from_reader(File::open(path).unwrap()).unwrap()
    }

    #[test]
    fn json_document_written_on_finish() {
        let dir = tmp();
        let mut w = JsonWriter::new(dir.path()).unwrap().pretty();
        write_frame(&mut w, FrameKind::Exit, &frame()).unwrap();
        w.finish().unwrap();

        let doc = read(w.path());
        assert_eq!(doc["environment"].as_array().unwrap().len(), 3);
        assert_eq!(doc["timings"].as_array().unwrap().len(), 0);
        let agents = doc["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 3);
        assert_eq!(agents[0]["frame"], "exit");
        assert_eq!(agents[0]["metric"], "count");
        assert!(agents[0]["variable"].is_null());
        assert_eq!(agents[1]["variable"], "x");
        assert_eq!(agents[1]["value"], 4.0);
        assert!(agents[2]["value"].is_null());
    }

    #[test]
    fn json_finish_idempotent() {
        let dir = tmp();
        let mut w = JsonWriter::new(dir.path()).unwrap();
        w.finish().unwrap();
        w.finish().unwrap();
        assert!(matches!(w.write_agents(&[]), Err(OutputError::Finished)));
        assert_eq!(read(w.path())["agents"], serde_json::json!([]));
    }
}

#[cfg(test)]
mod observer_tests {
    use ab_sim::{SimObserver, SimulationBuilder, StepLoggingConfig};

    use super::support::*;
    use crate::observer::{SimOutputObserver, write_run_log};
    use crate::writer::OutputWriter;
    use crate::{AgentRow, CsvWriter, EnvironmentRow, JsonWriter, OutputError, OutputResult, TimingRow};

    #[test]
    fn integration_csv() {
        let model = drifting();
        let mut sim = SimulationBuilder::new(model.clone())
            .config(config(4))
            .step_logging(StepLoggingConfig::new(logging()).frequency(2))
            .exit_logging(logging())
            .build()
            .unwrap();
        sim.set_population_data("walker", "default", &walkers(&model, 3)).unwrap();

        let dir = tmp();
        let mut obs = SimOutputObserver::new(CsvWriter::new(dir.path()).unwrap());
        sim.simulate_with(&mut obs).unwrap();
        assert!(obs.take_error().is_none(), "no write errors expected");
        assert_eq!(obs.frames(), 3);

        // Frames at steps 2 and 4, then the exit frame.
        let (_, env) = records(&dir, "environment.csv");
        let frames: Vec<(&str, &str)> = env.iter().map(|r| (r[0].as_str(), r[1].as_str())).collect();
        assert_eq!(frames, [("step", "2"), ("step", "4"), ("exit", "4")]);

        let (_, agents) = records(&dir, "agents.csv");
        assert_eq!(agents.len(), 6);
        assert_eq!(agents[0], ["step", "2", "walker", "default", "count", "", "3"]);
        assert_eq!(agents[1], ["step", "2", "walker", "default", "max", "x", "5"]);
        assert_eq!(agents[5], ["exit", "4", "walker", "default", "max", "x", "8"]);

        let (_, timings) = records(&dir, "timings.csv");
        assert_eq!(timings.len(), 4 + 4);
        assert_eq!(&timings[7][0], "simulate");
    }

    #[test]
    fn finished_log_written_afterwards() {
        let model = drifting();
        let mut sim = SimulationBuilder::new(model.clone())
            .config(config(3))
            .step_logging(StepLoggingConfig::new(logging()))
            .build()
            .unwrap();
        sim.set_population_data("walker", "default", &walkers(&model, 2)).unwrap();
        sim.simulate().unwrap();

        let dir = tmp();
        let mut w = JsonWriter::new(dir.path()).unwrap();
        write_run_log(&mut w, sim.run_log()).unwrap();

        let doc: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(w.path()).unwrap()).unwrap();
        // Three step frames, one speed element each.
        let steps: Vec<u64> =
            doc["environment"].as_array().unwrap().iter().map(|r| r["step"].as_u64().unwrap()).collect();
        assert_eq!(steps, [1, 2, 3]);
        assert_eq!(doc["timings"].as_array().unwrap().len(), 3 + 4);
    }

    /// Fails every write.
    struct Broken {
        finishes: usize,
    }

    impl OutputWriter for Broken {
        fn write_environment(&mut self, _: &[EnvironmentRow]) -> OutputResult<()> {
            Err(OutputError::Io(std::io::Error::other("disk full")))
        }

        fn write_agents(&mut self, _: &[AgentRow]) -> OutputResult<()> {
            Err(OutputError::Finished)
        }

        fn write_timings(&mut self, _: &[TimingRow]) -> OutputResult<()> {
            Ok(())
        }

        fn finish(&mut self) -> OutputResult<()> {
            self.finishes += 1;
            Ok(())
        }
    }

    #[test]
    fn first_error_kept() {
        let mut obs = SimOutputObserver::new(Broken { finishes: 0 });
        obs.on_step_start(0);
        obs.on_log_frame(&frame());
        obs.on_log_frame(&frame());
        obs.on_step_end(1, 2);
        obs.on_sim_end(&ab_sim::RunLog::default());

        assert!(matches!(obs.take_error(), Some(OutputError::Io(_))));
        assert!(obs.take_error().is_none());
        assert_eq!(obs.into_writer().finishes, 1);
    }
}
