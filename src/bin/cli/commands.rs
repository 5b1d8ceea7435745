use serde_json::Value;
use stomp_websocket::{OutboundRequest, SessionManager};

use super::state::SharedState;

/// Result of executing a command
pub enum CommandResult {
    Ok,
    Quit,
    Info(String),
    Error(String),
}

/// Parse and execute one stdin line.
pub async fn execute_command(
    line: &str,
    session: &SessionManager,
    state: &SharedState,
) -> CommandResult {
    let line = line.trim();
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match cmd {
        "" => CommandResult::Ok,

        "quit" | "exit" | "q" => CommandResult::Quit,

        "sub" | "subscribe" => {
            if rest.is_empty() {
                return CommandResult::Error("Usage: sub <topic>".to_string());
            }
            session_result(session.set_topic(rest))
        }

        "unsub" | "unsubscribe" => session_result(session.clear_topic()),

        "send" => {
            let Some((destination, body)) = rest.split_once(' ') else {
                return CommandResult::Error("Usage: send <destination> <json>".to_string());
            };
            let body: Value = match serde_json::from_str(body.trim()) {
                Ok(v) => v,
                Err(e) => return CommandResult::Error(format!("Body is not JSON: {}", e)),
            };
            session_result(session.request_send(OutboundRequest::new(destination, body)))
        }

        "request" => match serde_json::from_str::<OutboundRequest>(rest) {
            Ok(request) => session_result(session.request_send(request)),
            Err(e) => CommandResult::Error(format!(
                "Usage: request {{\"destination\": ..., \"body\": ..., \"headers\": {{...}}}} ({})",
                e
            )),
        },

        "last" => {
            let mut s = state.lock().await;
            match s.take_latest() {
                Some((at, Some(value))) => {
                    CommandResult::Info(format!("[{}] {}", at.format("%H:%M:%S"), value))
                }
                Some((at, None)) => {
                    CommandResult::Info(format!("[{}] (undecodable message)", at.format("%H:%M:%S")))
                }
                None => CommandResult::Info("No message received since last read".to_string()),
            }
        }

        "summary" => CommandResult::Info(state.lock().await.generate_summary()),

        "help" | "?" => CommandResult::Info(help_text()),

        other => CommandResult::Error(format!(
            "Unknown command: {}. Type 'help' for commands.",
            other
        )),
    }
}

fn session_result(result: Result<(), stomp_websocket::SessionError>) -> CommandResult {
    match result {
        Ok(()) => CommandResult::Ok,
        Err(e) => CommandResult::Error(format!("Session error: {}", e)),
    }
}

pub fn help_text() -> String {
    [
        "Commands:",
        "  sub <topic>                  - Subscribe (replaces the current topic)",
        "  unsub                        - Drop the current subscription",
        "  send <destination> <json>    - Publish a JSON body",
        "  request <json>               - Publish {destination, body, headers}",
        "  last                         - Show and clear the latest message",
        "  summary                      - Print session summary",
        "  quit                         - Disconnect and exit",
    ]
    .join("\n")
}
