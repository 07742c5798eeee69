//! Text commands for the interactive operator.
//!
//! ```text
//! pause | resume | p            pause control (p toggles)
//! goal heading:0.5,1.0          change goal (also point:x,y / region:x,y,w,h)
//! ack [level]                   acknowledge trust, optionally reporting a level
//! reset-trust                   restore initial trust
//! fail <kind> <duration> <mag>  queue a failure (heading_drift|spread|milling|none)
//! stop | q                      end the run
//! ```

use swarm_core::{FailureKind, FailureSpec, FailureTrigger, Goal, OperatorEvent};

/// Parses one operator command line.
pub fn parse_command(line: &str) -> Result<OperatorEvent, String> {
    let mut words = line.split_whitespace();
    let command = words.next().ok_or("empty command")?.to_lowercase();
    let rest: Vec<&str> = words.collect();

    let event = match (command.as_str(), rest.as_slice()) {
        ("pause", []) => OperatorEvent::Pause,
        ("resume", []) => OperatorEvent::Resume,
        ("p", []) => OperatorEvent::TogglePause,
        ("goal", [spec]) => OperatorEvent::ChangeGoal {
            goal: spec.parse::<Goal>().map_err(|e| e.to_string())?,
        },
        ("ack", []) => OperatorEvent::AcknowledgeTrust { reported: None },
        ("ack", [level]) => OperatorEvent::AcknowledgeTrust {
            reported: Some(level.parse().map_err(|_| format!("bad trust level: {}", level))?),
        },
        ("reset-trust", []) => OperatorEvent::ResetTrust,
        ("fail", [kind, duration, magnitude]) => OperatorEvent::ScheduleFailure {
            spec: FailureSpec {
                kind: parse_kind(kind)?,
                // Fires as soon as the injector is idle
                trigger: FailureTrigger::Step { at: 0 },
                duration: duration.parse().map_err(|_| format!("bad duration: {}", duration))?,
                magnitude: magnitude.parse().map_err(|_| format!("bad magnitude: {}", magnitude))?,
            },
        },
        ("stop", []) | ("q", []) => OperatorEvent::Stop,
        _ => return Err(format!("unrecognized command: {}", line.trim())),
    };
    Ok(event)
}

fn parse_kind(s: &str) -> Result<FailureKind, String> {
    match s.to_lowercase().as_str() {
        "heading_drift" | "drift" => Ok(FailureKind::HeadingDrift),
        "spread" => Ok(FailureKind::Spread),
        "milling" => Ok(FailureKind::Milling),
        "none" => Ok(FailureKind::None),
        _ => Err(format!("unknown failure kind: {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("pause"), Ok(OperatorEvent::Pause));
        assert_eq!(parse_command("  P "), Ok(OperatorEvent::TogglePause));
        assert_eq!(
            parse_command("goal point:3,4"),
            Ok(OperatorEvent::ChangeGoal { goal: Goal::Point { x: 3.0, y: 4.0 } })
        );
        assert_eq!(
            parse_command("ack 0.6"),
            Ok(OperatorEvent::AcknowledgeTrust { reported: Some(0.6) })
        );
        assert_eq!(parse_command("q"), Ok(OperatorEvent::Stop));
    }

    #[test]
    fn test_parse_failure() {
        let event = parse_command("fail milling 12 0.4").unwrap();
        let OperatorEvent::ScheduleFailure { spec } = event else {
            panic!("expected a failure, got {:?}", event);
        };
        assert_eq!(spec.kind, FailureKind::Milling);
        assert_eq!(spec.duration, 12);
        assert_eq!(spec.trigger, FailureTrigger::Step { at: 0 });
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_command("").is_err());
        assert!(parse_command("goal orbit:1").is_err());
        assert!(parse_command("fail wobble 3 1").is_err());
        assert!(parse_command("ack lots").is_err());
        assert!(parse_command("pause now").is_err());
    }
}
