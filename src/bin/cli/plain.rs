use std::io::{self, BufRead, Write};
use std::time::Duration;
use stomp_websocket::{
    ConnectOptions, SessionConfig, SessionEvent, SessionManager, parse_heartbeat_header,
};
use tokio::sync::mpsc;

use super::args::Cli;
use super::commands::{CommandResult, execute_command, help_text};
use super::exit_codes;
use super::state::{SharedState, new_shared_state};

/// Build session settings from the command line.
pub fn session_config(cli: &Cli) -> Result<SessionConfig, (String, u8)> {
    if cli.heartbeat.split(',').count() != 2 {
        return Err((
            format!("Invalid heartbeat '{}': expected cx,cy", cli.heartbeat),
            exit_codes::USAGE_ERROR,
        ));
    }
    let (cx, cy) = parse_heartbeat_header(&cli.heartbeat);

    let mut connect = ConnectOptions::default().with_heartbeat(format!("{},{}", cx, cy));
    if let (Some(login), Some(passcode)) = (&cli.login, &cli.passcode) {
        connect = connect.with_credentials(login, passcode);
    } else if cli.login.is_some() || cli.passcode.is_some() {
        return Err((
            "--login and --passcode must be given together".to_string(),
            exit_codes::USAGE_ERROR,
        ));
    }
    if let Some(host) = &cli.host {
        connect = connect.with_host(host);
    }

    Ok(SessionConfig::default()
        .with_connect_options(connect)
        .with_reconnect_delay(Duration::from_millis(cli.reconnect_delay)))
}

/// Run the interactive client until `quit` or end of input.
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    let config = session_config(cli)?;
    let state = new_shared_state(cli.url.clone());

    let (session, mut events) = SessionManager::new(config);
    let session_failed = |e: stomp_websocket::SessionError| (e.to_string(), exit_codes::SESSION_ERROR);

    println!("Connecting to {}...", cli.url);
    session.start(cli.url.clone()).map_err(session_failed)?;
    if let Some(topic) = &cli.subscribe {
        session.set_topic(topic.clone()).map_err(session_failed)?;
    }

    let state_events = state.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            state_events.lock().await.record(&event);
            print_event(&event);
        }
    });

    // Channel to receive user commands from stdin reader
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.blocking_send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    println!("{}", help_text());
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let Some(line) = cmd_rx.recv().await else {
            break;
        };

        match execute_command(&line, &session, &state).await {
            CommandResult::Ok => {}
            CommandResult::Quit => break,
            CommandResult::Info(msg) => println!("{}", msg),
            CommandResult::Error(msg) => eprintln!("{}", msg),
        }
    }

    println!("Disconnecting...");
    session.stop().await.map_err(session_failed)?;
    if cli.summary {
        println!("{}", state.lock().await.generate_summary());
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connected => println!("\nConnected."),
        SessionEvent::Disconnected => println!("\nDisconnected."),
        SessionEvent::Subscribed { topic } => println!("\nSubscribed to: {}", topic),
        SessionEvent::Unsubscribed { topic } => println!("\nUnsubscribed from: {}", topic),
        SessionEvent::MessageReceived(msg) => {
            let dest = msg.destination.as_deref().unwrap_or("?");
            match &msg.body {
                Some(value) => println!("\n[{}] {}", dest, value),
                None => println!("\n[{}] (message body is not JSON)", dest),
            }
        }
        SessionEvent::SendCompleted { destination } => println!("\nSent to {}", destination),
        SessionEvent::BrokerError(err) => {
            eprintln!("\n[BROKER ERROR] {}", err);
            for (k, v) in &err.frame.headers {
                eprintln!("  {}: {}", k, v);
            }
        }
    }
    print!("> ");
    let _ = io::stdout().flush();
}
