//! JSON exporter for step records.
//!
//! Frames are the engine's own `StepRecord`s; an external viewer or
//! analysis script reads them back from the JSON file.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use swarm_core::{RunSummary, StepRecord};

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name (or config file path)
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Last exported step
    pub last_step: u64,

    /// Exported frames
    pub frames: Vec<StepRecord>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            last_step: 0,
            frames: Vec::new(),
            passed: false,
            summary: None,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: StepRecord) {
        self.last_step = frame.step;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, summary: RunSummary, failure_reason: Option<String>) {
        self.passed = passed;
        self.summary = Some(summary);
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{Simulation, StepOutcome, SwarmParams};

    fn one_record() -> (StepRecord, RunSummary) {
        let params = SwarmParams { num_agents: 4, max_steps: 1, ..Default::default() };
        let mut sim = Simulation::new(params).unwrap();
        let record = match sim.step().unwrap() {
            StepOutcome::Advanced(record) => record,
            other => panic!("unexpected {:?}", other),
        };
        (record, sim.finish())
    }

    #[test]
    fn test_export_round_trips_through_json() {
        let (record, summary) = one_record();
        let mut export = SimExport::new("unit", 42);
        export.add_frame(record);
        export.finalize(true, summary, None);

        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("failure_reason"));
        let back: SimExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frames.len(), 1);
        assert_eq!(back.frames[0].agents.len(), 4);
        assert_eq!(back.frames[0].leaders, export.frames[0].leaders);
        assert_eq!(back.summary.map(|s| s.steps), Some(1));
    }

    #[test]
    fn test_write_to_file() {
        let (record, summary) = one_record();
        let mut export = SimExport::new("unit", 7);
        export.add_frame(record);
        export.finalize(false, summary, Some("checked".to_string()));

        let path = std::env::temp_dir().join(format!("swarm_export_{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(text.contains("\"failure_reason\": \"checked\""));
    }
}
