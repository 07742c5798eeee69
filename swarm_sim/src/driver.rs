//! Async step loop driven by a context clock and an operator link.
//!
//! The same loop serves realtime sessions (`TokioContext`, stdin operator)
//! and virtual-clock runs (`SimContext`): only the context changes.

use std::time::Duration;
use swarm_core::{OperatorEvent, RunSummary, Simulation, StepOutcome, StepRecord, SwarmError};
use swarm_env::{EnvError, OperatorLink, SwarmContext};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Runs `sim` to completion, one step per `tick` of `ctx`.
///
/// Operator events are drained from `link` at every step boundary. While
/// paused the loop blocks on the link instead of ticking; if the link has
/// closed there is nobody left to resume, so the run stops.
pub async fn drive<C, L, F>(
    mut sim: Simulation,
    ctx: &C,
    link: &L,
    tick: Duration,
    mut on_step: F,
) -> Result<RunSummary, DriveError>
where
    C: SwarmContext,
    L: OperatorLink<OperatorEvent>,
    F: FnMut(&StepRecord),
{
    let mut link_open = true;

    loop {
        while link_open {
            match link.try_recv() {
                Ok(Some(event)) => sim.submit(event),
                Ok(None) => break,
                Err(EnvError::LinkClosed) => {
                    debug!("Operator link closed at step {}", sim.current_step());
                    link_open = false;
                }
                Err(e) => return Err(e.into()),
            }
        }

        match sim.step()? {
            StepOutcome::Advanced(record) => on_step(&record),
            StepOutcome::Paused => {
                if !link_open {
                    warn!("Paused with operator link closed; stopping");
                    sim.submit(OperatorEvent::Stop);
                    continue;
                }
                match link.recv().await {
                    Some(event) => sim.submit(event),
                    None => link_open = false,
                }
                continue;
            }
            StepOutcome::Finished(reason) => {
                info!("Run finished at t={:.2}s: {:?}", ctx.now().as_secs_f64(), reason);
                break;
            }
        }

        ctx.sleep(tick).await;
    }

    Ok(sim.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use swarm_core::{FinishReason, Goal, SwarmParams};
    use swarm_env::operator_channel;

    fn sim(max_steps: u64) -> Simulation {
        Simulation::new(SwarmParams { num_agents: 6, max_steps, ..Default::default() }).unwrap()
    }

    #[tokio::test]
    async fn test_virtual_clock_advances_per_step() {
        let ctx = SimContext::new();
        let (handle, link) = operator_channel::<OperatorEvent>(8);
        drop(handle);

        let mut steps = 0;
        let summary = drive(sim(5), &ctx, &link, Duration::from_millis(100), |_| steps += 1)
            .await
            .unwrap();

        assert_eq!(steps, 5);
        assert_eq!(summary.reason, Some(FinishReason::MaxSteps));
        assert_eq!(ctx.now(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_operator_events_reach_the_engine() {
        let ctx = SimContext::new();
        let (handle, link) = operator_channel::<OperatorEvent>(8);
        handle
            .send(OperatorEvent::ChangeGoal { goal: Goal::Point { x: 10.0, y: 10.0 } })
            .unwrap();
        drop(handle);

        let mut goals = Vec::new();
        drive(sim(2), &ctx, &link, Duration::from_millis(10), |r| goals.push(r.goal))
            .await
            .unwrap();
        assert_eq!(goals, vec![Goal::Point { x: 10.0, y: 10.0 }; 2]);
    }

    #[tokio::test]
    async fn test_pause_with_closed_link_stops() {
        let ctx = SimContext::new();
        let (handle, link) = operator_channel::<OperatorEvent>(8);
        handle.send(OperatorEvent::Pause).unwrap();
        drop(handle);

        let summary = drive(sim(100), &ctx, &link, Duration::from_millis(10), |_| {})
            .await
            .unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.reason, Some(FinishReason::Stopped));
    }

    #[tokio::test]
    async fn test_pause_waits_for_resume() {
        let ctx = SimContext::new();
        let (handle, link) = operator_channel::<OperatorEvent>(8);
        handle.send(OperatorEvent::Pause).unwrap();

        let resume = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            resume.send(OperatorEvent::Resume).unwrap();
        });
        drop(handle);

        let summary = drive(sim(3), &ctx, &link, Duration::from_millis(10), |_| {})
            .await
            .unwrap();
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.reason, Some(FinishReason::MaxSteps));
    }
}
