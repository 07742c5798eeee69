//! End-to-end runs of the built-in scenarios through the public harness API.

use approx::assert_relative_eq;
use swarm_core::{
    FailureKind, FinishReason, Goal, OperatorEvent, PendingCommand, Simulation, StepOutcome, StepRecord,
};
use swarm_core::metrics::angle_between;
use swarm_sim::scenarios::{ScenarioId, ScriptedEvent};
use swarm_sim::{drive_scripted, ScenarioRunner};

fn run_records(scenario: ScenarioId, seed: u64) -> (Simulation, Vec<StepRecord>) {
    let mut sim = Simulation::new(scenario.params(seed)).unwrap();
    let records = drive_scripted(&mut sim, &scenario.script()).unwrap();
    (sim, records)
}

#[test]
fn test_line_articulation_and_single_leader() {
    let (_, records) = run_records(ScenarioId::Line, 42);
    assert_eq!(records.len(), 10);

    let first = &records[0];
    assert_eq!(first.articulation, (1..=8).collect::<Vec<_>>());
    assert_eq!(first.leaders.len(), 1);
    assert_eq!(first.metrics.component_count, 1);

    // Endpoints see one more agent per hop; the middle sees two
    assert_eq!(first.agents[0].reach, [1, 2, 3, 4]);
    assert_eq!(first.agents[4].reach, [2, 4, 6, 8]);

    for record in &records {
        assert_eq!(record.leaders.len(), 1, "step {}", record.step);
        assert!(record.agents.iter().all(|a| a.nearest_leader == Some(record.leaders[0])));
    }
}

#[test]
fn test_bowtie_center_is_only_cut_vertex() {
    let (_, records) = run_records(ScenarioId::Bowtie, 42);
    assert_eq!(records[0].articulation, vec![2]);
    assert!(records[0].agents[2].is_articulation);
    assert_eq!(records[0].agents[2].reach[0], 4);
}

#[test]
fn test_full_mesh_has_no_cut_vertex() {
    let result = ScenarioRunner::new(42).run(ScenarioId::FullMesh);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.metrics.max_articulation, 0);
    assert_eq!(result.total_steps, 20);
}

#[test]
fn test_heading_drift_window() {
    let (sim, records) = run_records(ScenarioId::HeadingDrift, 42);

    let active: Vec<u64> = records.iter().filter(|r| r.failure.is_some()).map(|r| r.step).collect();
    assert_eq!(active, (5..15).collect::<Vec<_>>());

    let during = records[5].failure.unwrap();
    assert_eq!(during.kind, FailureKind::HeadingDrift);
    assert_relative_eq!(during.magnitude, 0.2);
    assert_eq!(during.started_at, 5);
    assert_eq!(during.commands_remove_failure, 10);

    assert_eq!(sim.injector().completed(), 1);
    assert!(sim.injector().queue().is_empty());
}

#[test]
fn test_heading_drift_offsets_mean_heading_by_bias() {
    let mut baseline_params = ScenarioId::HeadingDrift.params(42);
    baseline_params.failures.clear();
    let mut baseline = Simulation::new(baseline_params).unwrap();
    let mut nominal = Vec::new();
    baseline.run_until_finished(|r| nominal.push(r.metrics.mean_heading)).unwrap();

    let (_, records) = run_records(ScenarioId::HeadingDrift, 42);
    assert_eq!(records.len(), nominal.len());

    for (record, &unbiased) in records.iter().zip(&nominal) {
        let offset = angle_between(record.metrics.mean_heading, unbiased);
        match record.step {
            // Same inputs up to the activation step, so the offset is exact
            5 => assert_relative_eq!(offset, 0.2, epsilon = 1e-9),
            6..=14 => assert!((offset - 0.2).abs() < 0.05, "step {}: offset {}", record.step, offset),
            s if s < 5 => assert_relative_eq!(offset, 0.0, epsilon = 1e-9),
            _ => assert!(offset < 0.05, "step {}: offset {} after clearing", record.step, offset),
        }
    }
}

#[test]
fn test_milling_trust_drop_and_acknowledgment() {
    let (_, records) = run_records(ScenarioId::MillingTrust, 42);

    assert_relative_eq!(records[2].trust.level, 1.0);
    assert!(records[2].trust.verified);

    assert_relative_eq!(records[3].trust.level, 0.7, epsilon = 1e-9);
    assert!(!records[3].trust.verified);
    assert_eq!(records[3].failure.map(|f| f.kind), Some(FailureKind::Milling));

    assert_eq!(records[4].goal, Goal::Heading { heading: -0.5, speed: 1.0 });
    assert_eq!(records[4].trust.pending, PendingCommand::GoalChange);

    assert!(records[6].trust.verified);
    assert_eq!(records[6].trust.pending, PendingCommand::None);
}

#[test]
fn test_scenarios_are_deterministic() {
    let (_, a) = run_records(ScenarioId::HeadingDrift, 7);
    let (_, b) = run_records(ScenarioId::HeadingDrift, 7);
    assert_eq!(a, b);
}

#[test]
fn test_structural_scenarios_pass_across_seeds() {
    for seed in [1, 42, 1234] {
        let runner = ScenarioRunner::new(seed);
        for scenario in [
            ScenarioId::Line,
            ScenarioId::Bowtie,
            ScenarioId::FullMesh,
            ScenarioId::HeadingDrift,
            ScenarioId::MillingTrust,
        ] {
            let result = runner.run(scenario);
            assert!(result.passed, "{} seed={}: {:?}", scenario, seed, result.failure_reason);
        }
    }
}

#[test]
fn test_scripted_stop_ends_run() {
    let mut sim = Simulation::new(ScenarioId::FullMesh.params(42)).unwrap();
    let script = [ScriptedEvent::new(3, OperatorEvent::Stop)];
    let records = drive_scripted(&mut sim, &script).unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(sim.finish_reason(), Some(FinishReason::Stopped));
    assert_eq!(sim.step().unwrap(), StepOutcome::Finished(FinishReason::Stopped));
}

#[test]
fn test_unresumed_pause_is_reported() {
    let mut sim = Simulation::new(ScenarioId::Line.params(42)).unwrap();
    let script = [ScriptedEvent::new(2, OperatorEvent::Pause)];
    let err = drive_scripted(&mut sim, &script).unwrap_err();
    assert!(err.contains("paused at step 2"), "{}", err);
}
