use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use hablaconmigo_core::orchestrator::{
    Difficulty, SessionUpdate, Topic, TurnState, TutorConfig,
};
use hablaconmigo_core::responder;
use hablaconmigo_core::session::turn::Sender;
use hablaconmigo_core::session::TutorSession;
use hablaconmigo_core::speech::{LineCaptureDevice, TracingOutputDevice};
use hablaconmigo_core::telemetry::init_tracing;

const TARGET: &str = "hablaconmigo";

const HELP: &str = "\
Type a line to say it out loud. Commands:
  /type <text>      send a typed message
  /skip             stop the tutor speaking
  /repeat           repeat what the tutor is saying
  /retry [turn-id]  ask again for the latest answer
  /auto on|off      listen again automatically after the tutor speaks
  /topic <name>     general, travel, restaurant, shopping, emergency
  /level <name>     beginner, intermediate, advanced
  /clear            dismiss the current error
  /status           print the session snapshot
  /quit";

enum Command {
    Say(String),
    Type(String),
    Skip,
    Repeat,
    Retry(Option<String>),
    Auto(bool),
    Topic(Topic),
    Level(Difficulty),
    Clear,
    Status,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self> {
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Say(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "type" => Command::Type(arg.to_string()),
            "skip" => Command::Skip,
            "repeat" => Command::Repeat,
            "retry" if arg.is_empty() => Command::Retry(None),
            "retry" => Command::Retry(Some(arg.to_string())),
            "auto" => match arg {
                "on" => Command::Auto(true),
                "off" => Command::Auto(false),
                other => bail!("expected `on` or `off`, got `{other}`"),
            },
            "topic" => Command::Topic(arg.parse()?),
            "level" => Command::Level(arg.parse()?),
            "clear" => Command::Clear,
            "status" => Command::Status,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command `/{other}`, try /help"),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = TutorConfig::from_env().context("failed to load tutor configuration")?;
    let _log_guard = init_tracing(&config.log)?;
    let responder = responder::from_config(&config)?;

    let capture = Arc::new(LineCaptureDevice::default());
    let output = Arc::new(TracingOutputDevice::default());
    let (session, streams) = TutorSession::spawn(config, capture.clone(), output, responder);
    let printer = tokio::spawn(print_updates(streams.updates));

    info!(target: TARGET, session_id = session.session_id(), "session ready");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match Command::parse(line) {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if let Err(err) = run(&session, &capture, command).await {
            warn!(target: TARGET, %err, "command rejected");
            println!("! {err}");
        }
    }

    session.teardown().await?;
    printer.abort();
    Ok(())
}

async fn run(session: &TutorSession, capture: &LineCaptureDevice, command: Command) -> Result<()> {
    match command {
        Command::Say(text) => {
            if session.snapshot().await?.state != TurnState::Listening {
                session.toggle_listening().await?;
            }
            if !capture.feed(&text) {
                bail!("microphone is not open");
            }
            session.toggle_listening().await?;
        }
        Command::Type(text) => session.send_text(text).await?,
        Command::Skip => session.skip().await?,
        Command::Repeat => session.retry_last_speech().await?,
        Command::Retry(turn_id) => {
            let turn_id = match turn_id {
                Some(id) => id,
                None => session
                    .snapshot()
                    .await?
                    .turns
                    .iter()
                    .rev()
                    .find(|turn| turn.is_ai())
                    .map(|turn| turn.id.clone())
                    .context("nothing to retry yet")?,
            };
            session.retry_turn(turn_id).await?;
        }
        Command::Auto(enabled) => session.set_auto_listen(enabled).await?,
        Command::Topic(topic) => session.set_topic(topic).await?,
        Command::Level(level) => session.set_difficulty(level).await?,
        Command::Clear => session.clear_error().await?,
        Command::Status => {
            let snapshot = session.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn print_updates(mut updates: broadcast::Receiver<SessionUpdate>) {
    loop {
        match updates.recv().await {
            Ok(SessionUpdate::TurnAppended(turn)) | Ok(SessionUpdate::TurnReplaced(turn)) => {
                let who = match turn.sender {
                    Sender::User => "tú",
                    Sender::Ai => "tutor",
                };
                println!("[{}] {who}: {}", turn.id, turn.text);
            }
            Ok(SessionUpdate::StateChanged { to, .. }) => println!("  ({})", to.as_str()),
            Ok(SessionUpdate::Notice(notice)) => println!("  * {}", notice.message),
            Ok(SessionUpdate::RecoverableError(message)) => println!("! {message}"),
            Ok(SessionUpdate::Unavailable(capability)) => {
                println!("! {} unavailable", capability.as_str())
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: TARGET, skipped, "update printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
