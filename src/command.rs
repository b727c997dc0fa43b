//! Wire command parsing
//!
//! One whitespace-tokenized ASCII line per command; token 0 selects the
//! command, the rest are arguments. Client revisions disagree on separators
//! (spaces vs commas) and command case (`jump` vs `JUMP`), so commas are
//! normalized to spaces and the command word is matched case-insensitively.

use crate::queue::CoordinateJob;
use crate::{ControlError, Result};

/// Wire line terminator
pub const LINE_ENDING: &str = "\r\n";

/// Response tokens placed on the wire
pub mod reply {
    /// Immediate acknowledgement of an accepted long-running command
    pub const ACK: &str = "ack";
    pub const POSITION_REACHED: &str = "POSITION_REACHED";
    pub const QUEUE_APPENDED: &str = "QUEUE_APPENDED";
    pub const QUEUE_CLEARED: &str = "QUEUE_CLEARED";
    pub const INSERT_DONE: &str = "INSERT_DONE";
    pub const TEST_DONE: &str = "TEST_DONE";
    pub const MAGAZINE_LOADED: &str = "MAGAZINE_LOADED";
    pub const MOTOR_ON: &str = "MOTOR_ON";
    pub const MOTOR_OFF: &str = "MOTOR_OFF";
    pub const INVALID_MOTOR: &str = "INVALID_MOTOR";
    pub const STOPPED: &str = "STOPPED";
    /// Operation aborted by an actuator fault
    pub const TASK_FAILED: &str = "taskfailed";

    pub fn error(reason: &str) -> String {
        format!("ERROR {}", reason)
    }
}

/// A parsed client command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move { x: f64, y: f64, z: f64, u: f64 },
    Queue(Vec<CoordinateJob>),
    ClearQueue,
    Insert,
    Test,
    LoadMagazine(u32),
    Speed(u8),
    Motor(bool),
    Stop,
    Echo(String),
    Where,
}

/// Fast-path check used by the network layer before normal dispatch
pub fn is_stop_line(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("stop")
}

fn parse_real(token: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| ControlError::Protocol("invalid_number".to_string()))
}

/// Parse one received line into a command
pub fn parse(line: &str) -> Result<Command> {
    let normalized = line.replace(',', " ");
    let mut tokens = normalized.split_whitespace();
    let word = tokens
        .next()
        .ok_or_else(|| ControlError::Protocol("empty_command".to_string()))?
        .to_ascii_lowercase();
    let args: Vec<&str> = tokens.collect();

    match word.as_str() {
        "move" => {
            if args.len() != 4 {
                return Err(ControlError::Protocol("invalid_arguments".to_string()));
            }
            Ok(Command::Move {
                x: parse_real(args[0])?,
                y: parse_real(args[1])?,
                z: parse_real(args[2])?,
                u: parse_real(args[3])?,
            })
        }
        "queue" => {
            if args.is_empty() {
                return Err(ControlError::Protocol("missing_arguments".to_string()));
            }
            if args.len() % 2 != 0 {
                return Err(ControlError::Protocol("odd_argument_count".to_string()));
            }
            let mut jobs = Vec::with_capacity(args.len() / 2);
            for pair in args.chunks(2) {
                jobs.push(CoordinateJob {
                    x: parse_real(pair[0])?,
                    y: parse_real(pair[1])?,
                });
            }
            Ok(Command::Queue(jobs))
        }
        "clearqueue" => Ok(Command::ClearQueue),
        "insert" => Ok(Command::Insert),
        "test" => Ok(Command::Test),
        "loadmagazine" => {
            let count = args
                .first()
                .and_then(|t| t.parse::<u32>().ok())
                .ok_or_else(|| ControlError::Protocol("invalid_arguments".to_string()))?;
            Ok(Command::LoadMagazine(count))
        }
        "speed" => {
            let factor = args
                .first()
                .and_then(|t| t.parse::<u8>().ok())
                .ok_or_else(|| ControlError::Protocol("invalid_arguments".to_string()))?;
            if !(1..=100).contains(&factor) {
                return Err(ControlError::Protocol("speed_out_of_range".to_string()));
            }
            Ok(Command::Speed(factor))
        }
        "motor" => match args.first().map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("on") => Ok(Command::Motor(true)),
            Some("off") => Ok(Command::Motor(false)),
            _ => Err(ControlError::Protocol("invalid_motor".to_string())),
        },
        "stop" => Ok(Command::Stop),
        "echo" => Ok(Command::Echo(args.join(" "))),
        "where" => Ok(Command::Where),
        _ => Err(ControlError::Protocol("unknown_command".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_with_four_reals() {
        let command = parse("move 10 20 30 0").unwrap();
        assert_eq!(
            command,
            Command::Move {
                x: 10.0,
                y: 20.0,
                z: 30.0,
                u: 0.0
            }
        );
    }

    #[test]
    fn move_with_wrong_arity_is_rejected() {
        assert!(parse("move 10 20 30").is_err());
        assert!(parse("move 10 20 30 0 5").is_err());
    }

    #[test]
    fn comma_separated_and_uppercase_variants_parse() {
        // One client revision sends "MOVE,100.00,200.00,-75.00,0.00"
        let command = parse("MOVE,100.00,200.00,-75.00,0.00").unwrap();
        assert_eq!(
            command,
            Command::Move {
                x: 100.0,
                y: 200.0,
                z: -75.0,
                u: 0.0
            }
        );
    }

    #[test]
    fn queue_pairs_kept_in_order() {
        let command = parse("queue 1 2 3 4 5 6").unwrap();
        match command {
            Command::Queue(jobs) => {
                assert_eq!(jobs.len(), 3);
                assert_eq!(jobs[0], CoordinateJob { x: 1.0, y: 2.0 });
                assert_eq!(jobs[2], CoordinateJob { x: 5.0, y: 6.0 });
            }
            other => panic!("expected queue, got {:?}", other),
        }
    }

    #[test]
    fn odd_queue_argument_count_is_rejected() {
        let err = parse("queue 1 2 3").unwrap_err();
        assert!(err.to_string().contains("odd_argument_count"));
    }

    #[test]
    fn empty_queue_submission_is_rejected() {
        // Zero arguments is its own failure, not an odd count
        let err = parse("queue").unwrap_err();
        assert!(err.to_string().contains("missing_arguments"));
    }

    #[test]
    fn speed_range_enforced_at_parse() {
        assert_eq!(parse("speed 100").unwrap(), Command::Speed(100));
        assert!(parse("speed 0").is_err());
        assert!(parse("speed 150").is_err());
    }

    #[test]
    fn motor_accepts_only_on_off() {
        assert_eq!(parse("motor on").unwrap(), Command::Motor(true));
        assert_eq!(parse("motor OFF").unwrap(), Command::Motor(false));
        assert!(parse("motor sideways").is_err());
        assert!(parse("motor").is_err());
    }

    #[test]
    fn unknown_command_reports_token() {
        let err = parse("launch 1 2").unwrap_err();
        assert!(err.to_string().contains("unknown_command"));
    }

    #[test]
    fn stop_line_detected_for_fast_path() {
        assert!(is_stop_line("stop"));
        assert!(is_stop_line("  STOP  "));
        assert!(!is_stop_line("stopall"));
    }

    #[test]
    fn echo_carries_arguments_through() {
        assert_eq!(
            parse("echo 0 1 2 3").unwrap(),
            Command::Echo("0 1 2 3".to_string())
        );
    }
}
