//! Failure injection state machine.
//!
//! Failures wait in a strict FIFO queue. At most one is active: while it
//! runs, nothing behind it can activate, and pushing a new failure only
//! appends to the queue. Each active failure counts the commands issued
//! since it started and retires once that count reaches its duration.
//!
//! ```text
//!            trigger met, queue non-empty
//!   ┌──────┐ ─────────────────────────────► ┌────────┐
//!   │ IDLE │                                │ ACTIVE │ ─┐ commands_since += 1
//!   └──────┘ ◄───────────────────────────── └────────┘ ◄┘
//!            commands_since == commands_remove
//! ```

use crate::error::ConfigError;
use crate::leader::LeaderAssignment;

use rand::seq::index::sample;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use swarm_env::stream_rng;

/// RNG stream used to choose affected agents.
const TARGETING_STREAM: u64 = 2;

/// RNG stream used to generate random schedules.
const SCHEDULE_STREAM: u64 = 3;

/// What an active failure does to affected agents' commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Persistent bias added to the heading
    HeadingDrift,
    /// Push away from the local centroid
    Spread,
    /// Circle the local centroid
    Milling,
    /// Placeholder failure with no effect
    None,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::HeadingDrift => "heading_drift",
            FailureKind::Spread => "spread",
            FailureKind::Milling => "milling",
            FailureKind::None => "none",
        }
    }

    /// True for every kind that perturbs motion.
    pub fn is_effective(&self) -> bool {
        !matches!(self, FailureKind::None)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// When a queued failure may activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureTrigger {
    /// At (or, if the injector is busy, after) the given step
    Step { at: u64 },
    /// After this many operator commands since the injector last went idle
    Commands { count: u64 },
}

/// A failure as written in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureSpec {
    pub kind: FailureKind,
    pub trigger: FailureTrigger,

    /// Commands (steps) the failure stays active; must be positive
    pub duration: i64,

    /// Bias angle in radians for heading drift, speed fraction otherwise
    pub magnitude: f64,
}

impl FailureSpec {
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.duration <= 0 || self.duration > u32::MAX as i64 {
            return Err(ConfigError::InvalidFailureDuration { index, duration: self.duration });
        }
        if !self.magnitude.is_finite() {
            return Err(ConfigError::InvalidFailureMagnitude { index });
        }
        Ok(())
    }
}

/// Which agents an active failure perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailureTarget {
    All,
    /// A seeded random subset, fixed for the failure's lifetime
    RandomSubset { fraction: f64 },
    /// Whoever leads at each step
    LeadersOnly,
}

impl Default for FailureTarget {
    fn default() -> Self {
        FailureTarget::All
    }
}

impl FailureTarget {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            FailureTarget::RandomSubset { fraction } if !(fraction > 0.0 && fraction <= 1.0) => {
                Err(ConfigError::InvalidSubsetFraction(fraction))
            }
            _ => Ok(()),
        }
    }
}

/// Recipe for a seeded random failure schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomFailurePlan {
    pub count: usize,
    pub first_step: u64,
    /// Idle steps between consecutive failures, inclusive range
    pub spacing: (u64, u64),
    /// Active duration, inclusive range
    pub duration: (i64, i64),
    /// Magnitude, inclusive range
    pub magnitude: (f64, f64),
}

impl RandomFailurePlan {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = self.duration;
        if lo <= 0 || hi < lo {
            return Err(ConfigError::InvalidFailureDuration { index: 0, duration: lo.min(hi) });
        }
        let (mlo, mhi) = self.magnitude;
        if !mlo.is_finite() || !mhi.is_finite() || mhi < mlo {
            return Err(ConfigError::InvalidFailureMagnitude { index: 0 });
        }
        if self.spacing.1 < self.spacing.0 {
            return Err(ConfigError::Negative {
                field: "random failure spacing",
                value: self.spacing.1 as f64 - self.spacing.0 as f64,
            });
        }
        Ok(())
    }

    /// Builds the schedule. Step triggers are laid out so failures never overlap.
    pub fn generate(&self, seed: u64) -> Vec<FailureSpec> {
        let mut rng = stream_rng(seed, SCHEDULE_STREAM);
        let kinds = [FailureKind::HeadingDrift, FailureKind::Spread, FailureKind::Milling];
        let spacing = Uniform::new_inclusive(self.spacing.0, self.spacing.1);
        let duration = Uniform::new_inclusive(self.duration.0, self.duration.1);
        let magnitude = Uniform::new_inclusive(self.magnitude.0, self.magnitude.1);

        let mut at = self.first_step;
        (0..self.count)
            .map(|_| {
                let spec = FailureSpec {
                    kind: kinds[rng.gen_range(0..kinds.len())],
                    trigger: FailureTrigger::Step { at },
                    duration: duration.sample(&mut rng),
                    magnitude: magnitude.sample(&mut rng),
                };
                at += spec.duration as u64 + spacing.sample(&mut rng);
                spec
            })
            .collect()
    }
}

/// FIFO of pending failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureQueue {
    pending: VecDeque<FailureSpec>,
}

impl FailureQueue {
    pub fn new(specs: Vec<FailureSpec>) -> Result<Self, ConfigError> {
        for (index, spec) in specs.iter().enumerate() {
            spec.validate(index)?;
        }
        Ok(Self { pending: specs.into() })
    }

    pub fn push(&mut self, spec: FailureSpec) -> Result<(), ConfigError> {
        spec.validate(self.pending.len())?;
        self.pending.push_back(spec);
        Ok(())
    }

    pub fn peek(&self) -> Option<&FailureSpec> {
        self.pending.front()
    }

    pub fn pop(&mut self) -> Option<FailureSpec> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The failure currently perturbing the swarm.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFailure {
    pub kind: FailureKind,
    pub magnitude: f64,
    pub commands_since_failure: u32,
    pub commands_remove_failure: u32,
    pub started_at: u64,
    leaders_only: bool,
    affected: Vec<bool>,
}

impl ActiveFailure {
    /// True if `agent` is perturbed at this step.
    pub fn targets(&self, agent: usize, leaders: &LeaderAssignment) -> bool {
        if self.leaders_only {
            leaders.is_leader(agent)
        } else {
            self.affected.get(agent).copied().unwrap_or(false)
        }
    }

    /// Heading bias in radians (zero unless drifting).
    pub fn heading_bias(&self) -> f64 {
        match self.kind {
            FailureKind::HeadingDrift => self.magnitude,
            _ => 0.0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.commands_remove_failure - self.commands_since_failure
    }
}

/// Injector state.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectorState {
    Idle,
    Active(ActiveFailure),
}

/// State change reported by `FailureInjector::advance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureTransition {
    Activated { kind: FailureKind, magnitude: f64, step: u64 },
    Cleared { kind: FailureKind, step: u64, active_steps: u32 },
}

/// Owns the queue and the single active failure.
#[derive(Debug, Clone)]
pub struct FailureInjector {
    queue: FailureQueue,
    state: InjectorState,
    target: FailureTarget,
    rng: ChaCha8Rng,
    commands_since_idle: u64,
    completed: usize,
}

impl FailureInjector {
    pub fn new(specs: Vec<FailureSpec>, target: FailureTarget, seed: u64) -> Result<Self, ConfigError> {
        target.validate()?;
        Ok(Self {
            queue: FailureQueue::new(specs)?,
            state: InjectorState::Idle,
            target,
            rng: stream_rng(seed, TARGETING_STREAM),
            commands_since_idle: 0,
            completed: 0,
        })
    }

    /// Appends a failure behind everything already queued.
    pub fn schedule(&mut self, spec: FailureSpec) -> Result<(), ConfigError> {
        self.queue.push(spec)
    }

    /// Counts an operator command toward command-based triggers.
    pub fn record_command(&mut self) {
        self.commands_since_idle += 1;
    }

    pub fn state(&self) -> &InjectorState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveFailure> {
        match &self.state {
            InjectorState::Active(failure) => Some(failure),
            InjectorState::Idle => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    pub fn queue(&self) -> &FailureQueue {
        &self.queue
    }

    /// Failures that have run to completion.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Advances the state machine by one step.
    ///
    /// At most one transition happens per step, so a failure that clears
    /// leaves the injector idle for at least that step.
    pub fn advance(&mut self, step: u64, population: usize) -> Option<FailureTransition> {
        if let InjectorState::Active(failure) = &mut self.state {
            failure.commands_since_failure += 1;
            if failure.commands_since_failure < failure.commands_remove_failure {
                return None;
            }
            let transition = FailureTransition::Cleared {
                kind: failure.kind,
                step,
                active_steps: failure.commands_since_failure,
            };
            self.state = InjectorState::Idle;
            self.commands_since_idle = 0;
            self.completed += 1;
            return Some(transition);
        }

        let due = match self.queue.peek()?.trigger {
            FailureTrigger::Step { at } => step >= at,
            FailureTrigger::Commands { count } => self.commands_since_idle >= count,
        };
        if !due {
            return None;
        }

        let spec = self.queue.pop()?;
        let affected = self.choose_affected(population);
        self.state = InjectorState::Active(ActiveFailure {
            kind: spec.kind,
            magnitude: spec.magnitude,
            commands_since_failure: 0,
            commands_remove_failure: spec.duration as u32,
            started_at: step,
            leaders_only: matches!(self.target, FailureTarget::LeadersOnly),
            affected,
        });
        Some(FailureTransition::Activated {
            kind: spec.kind,
            magnitude: spec.magnitude,
            step,
        })
    }

    fn choose_affected(&mut self, population: usize) -> Vec<bool> {
        match self.target {
            FailureTarget::All => vec![true; population],
            FailureTarget::LeadersOnly => Vec::new(),
            FailureTarget::RandomSubset { fraction } => {
                let mut affected = vec![false; population];
                if population == 0 {
                    return affected;
                }
                let amount = ((fraction * population as f64).ceil() as usize).clamp(1, population);
                for i in sample(&mut self.rng, population, amount) {
                    affected[i] = true;
                }
                affected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drift_at(step: u64, duration: i64) -> FailureSpec {
        FailureSpec {
            kind: FailureKind::HeadingDrift,
            trigger: FailureTrigger::Step { at: step },
            duration,
            magnitude: 0.2,
        }
    }

    #[test]
    fn test_activates_and_clears_on_schedule() {
        let mut injector = FailureInjector::new(vec![drift_at(5, 10)], FailureTarget::All, 1).unwrap();

        for step in 0..5 {
            assert_eq!(injector.advance(step, 4), None);
        }
        assert!(matches!(
            injector.advance(5, 4),
            Some(FailureTransition::Activated { kind: FailureKind::HeadingDrift, step: 5, .. })
        ));
        assert_eq!(injector.active().unwrap().heading_bias(), 0.2);

        for step in 6..15 {
            assert_eq!(injector.advance(step, 4), None);
            assert!(injector.is_active());
        }
        assert_eq!(
            injector.advance(15, 4),
            Some(FailureTransition::Cleared { kind: FailureKind::HeadingDrift, step: 15, active_steps: 10 })
        );
        assert!(!injector.is_active());
        assert_eq!(injector.completed(), 1);
    }

    #[test]
    fn test_queue_is_fifo_and_never_overlaps() {
        let specs = vec![drift_at(0, 3), drift_at(1, 2)];
        let mut injector = FailureInjector::new(specs, FailureTarget::All, 1).unwrap();

        let mut transitions = Vec::new();
        for step in 0..20 {
            if let Some(t) = injector.advance(step, 2) {
                transitions.push(t);
            }
            if let Some(active) = injector.active() {
                assert!(active.commands_since_failure <= active.commands_remove_failure);
            }
        }

        // Second failure waits for the first, plus one idle step
        let steps: Vec<u64> = transitions
            .iter()
            .map(|t| match t {
                FailureTransition::Activated { step, .. } | FailureTransition::Cleared { step, .. } => *step,
            })
            .collect();
        assert_eq!(steps, vec![0, 3, 4, 6]);
        assert!(injector.queue().is_empty());
    }

    #[test]
    fn test_empty_queue_stays_idle() {
        let mut injector = FailureInjector::new(Vec::new(), FailureTarget::All, 1).unwrap();
        for step in 0..10 {
            assert_eq!(injector.advance(step, 3), None);
        }
        assert_eq!(injector.state(), &InjectorState::Idle);
    }

    #[test]
    fn test_command_trigger() {
        let spec = FailureSpec {
            kind: FailureKind::Spread,
            trigger: FailureTrigger::Commands { count: 2 },
            duration: 1,
            magnitude: 0.5,
        };
        let mut injector = FailureInjector::new(vec![spec], FailureTarget::All, 1).unwrap();
        assert_eq!(injector.advance(0, 1), None);
        injector.record_command();
        assert_eq!(injector.advance(1, 1), None);
        injector.record_command();
        assert!(injector.advance(2, 1).is_some());
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        assert_eq!(
            FailureInjector::new(vec![drift_at(0, -3)], FailureTarget::All, 1).err(),
            Some(ConfigError::InvalidFailureDuration { index: 0, duration: -3 })
        );
        let mut injector = FailureInjector::new(Vec::new(), FailureTarget::All, 1).unwrap();
        assert!(injector.schedule(drift_at(0, 0)).is_err());
    }

    #[test]
    fn test_random_subset_is_seeded() {
        let target = FailureTarget::RandomSubset { fraction: 0.25 };
        let pick = |seed| {
            let mut injector = FailureInjector::new(vec![drift_at(0, 5)], target, seed).unwrap();
            injector.advance(0, 40);
            let leaders = LeaderAssignment::empty(40);
            let active = injector.active().unwrap().clone();
            (0..40).filter(|&i| active.targets(i, &leaders)).collect::<Vec<_>>()
        };
        assert_eq!(pick(7).len(), 10);
        assert_eq!(pick(7), pick(7));
    }

    #[test]
    fn test_leaders_only_follows_leadership() {
        let mut injector = FailureInjector::new(vec![drift_at(0, 5)], FailureTarget::LeadersOnly, 1).unwrap();
        injector.advance(0, 3);
        let mut leaders = LeaderAssignment::empty(3);
        leaders.is_leader[2] = true;
        let active = injector.active().unwrap();
        assert!(active.targets(2, &leaders));
        assert!(!active.targets(0, &leaders));
    }

    #[test]
    fn test_random_plan_does_not_overlap() {
        let plan = RandomFailurePlan {
            count: 6,
            first_step: 10,
            spacing: (5, 20),
            duration: (3, 12),
            magnitude: (0.1, 0.6),
        };
        let specs = plan.generate(99);
        assert_eq!(specs, plan.generate(99));
        for pair in specs.windows(2) {
            let (FailureTrigger::Step { at: a }, FailureTrigger::Step { at: b }) = (pair[0].trigger, pair[1].trigger) else {
                panic!("random plans use step triggers");
            };
            assert!(b >= a + pair[0].duration as u64);
            assert!(pair[0].kind.is_effective());
        }
    }
}
