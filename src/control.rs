//! Host control actions read from stdin
//!
//! One word per line: `start`, `stop`, `stop-alarm`, `status`, `quit`.
//! `status` is answered directly with the current state as a JSON line.

use std::io::{BufRead, Write};

use tokio::sync::mpsc;

use alarm_app::{ControlAction, ServiceHandle};
use alarm_core::prelude::*;

/// A parsed stdin line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinCommand {
    Action(ControlAction),
    Status,
    Empty,
    Unknown,
}

pub fn parse_line(line: &str) -> StdinCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return StdinCommand::Empty;
    }
    if trimmed.eq_ignore_ascii_case("status") {
        return StdinCommand::Status;
    }
    match ControlAction::parse(trimmed) {
        Some(action) => StdinCommand::Action(action),
        None => StdinCommand::Unknown,
    }
}

/// Read control actions from stdin on a dedicated thread.
pub fn spawn_stdin_reader(tx: mpsc::Sender<ControlAction>, handle: ServiceHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        read_actions(stdin.lock(), &tx, &handle);
        info!("Stdin reader exiting");
    });
}

fn read_actions(reader: impl BufRead, tx: &mpsc::Sender<ControlAction>, handle: &ServiceHandle) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        match parse_line(&line) {
            StdinCommand::Action(action) => {
                info!("Stdin: {:?} requested", action);
                if tx.blocking_send(action).is_err() || action == ControlAction::Quit {
                    break;
                }
            }
            StdinCommand::Status => print_status(handle),
            StdinCommand::Empty => {}
            StdinCommand::Unknown => warn!("Unknown stdin command: {}", line.trim()),
        }
    }
}

fn print_status(handle: &ServiceHandle) {
    let json = match serde_json::to_string(&handle.state()) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize state: {}", e);
            return;
        }
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", json).and_then(|_| stdout.flush()) {
        error!("Failed to write status to stdout: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("start\n"),
            StdinCommand::Action(ControlAction::StartCore)
        );
        assert_eq!(
            parse_line("stop-alarm"),
            StdinCommand::Action(ControlAction::StopAlarm)
        );
        assert_eq!(parse_line("  quit "), StdinCommand::Action(ControlAction::Quit));
        assert_eq!(parse_line("STATUS"), StdinCommand::Status);
        assert_eq!(parse_line("   "), StdinCommand::Empty);
        assert_eq!(parse_line("reload"), StdinCommand::Unknown);
    }
}
