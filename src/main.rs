use std::process::ExitCode;

use arena_signal::{
    Config, LoggingPeerTransport, Notification, SessionCoordinator, SessionState, WsConnector,
};

const USAGE: &str = "usage: arena-signal host | arena-signal join <ROOM_CODE>";

enum Command {
    Host,
    Join(String),
}

fn parse_args() -> Option<Command> {
    let mut args = std::env::args().skip(1);
    match args.next()?.as_str() {
        "host" => Some(Command::Host),
        "join" => args.next().map(Command::Join),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let Some(command) = parse_args() else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("   Arena Signal");
    println!("   Matchmaking server {}", config.server_url);
    println!("   Press Ctrl+C to cancel\n");

    let mut ticker = tokio::time::interval(config.tick_interval);
    let connector = WsConnector::new(config.connect_timeout);
    let mut coordinator = SessionCoordinator::new(config, connector, LoggingPeerTransport::default());
    let notifications = coordinator.notifications();

    let started = match command {
        Command::Host => coordinator.create_room(),
        Command::Join(code) => coordinator.join_room(code),
    };
    if let Err(e) = started {
        eprintln!("Could not start session: {}", e);
        return ExitCode::FAILURE;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                coordinator.tick();
            }
            _ = &mut ctrl_c => {
                println!("Cancelled");
                coordinator.reset();
                return ExitCode::FAILURE;
            }
        }

        while let Ok(notification) = notifications.try_recv() {
            match notification {
                Notification::RoomCreated(code) => println!("Room code: {}", code),
                Notification::Reconnecting { attempt, delay } => {
                    println!("Connection lost, retry {} in {:?}", attempt, delay)
                }
                Notification::SessionEstablished(role) => {
                    println!("Session established as {}", role)
                }
                Notification::SessionFailed(e) => println!("Session failed: {}", e),
                Notification::GameplayPush { kind, payload } => println!("{}: {}", kind, payload),
            }
        }

        match coordinator.state() {
            SessionState::Established => return ExitCode::SUCCESS,
            SessionState::Failed => return ExitCode::FAILURE,
            _ => {}
        }
    }
}
