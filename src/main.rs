use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use scribe_capture::{
    ApiClient, Config, CpalFactory, DeviceCatalog, RecorderEvent, RecordingStateMachine,
    RecordingStatus,
};

#[derive(Parser)]
#[command(name = "scribe-capture", about = "Record a session and ship it for transcription")]
struct Cli {
    /// Config file (without extension), e.g. config/scribe-capture
    #[arg(long, default_value = "config/scribe-capture")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input devices and the initial selection
    Devices,
    /// Record until "stop" (or Ctrl-C); "pause" and "resume" control the
    /// session from stdin
    Record {
        /// Server session id (defaults to a fresh UUID)
        #[arg(long)]
        session: Option<String>,
        /// Input device id from `devices`
        #[arg(long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            info!("no config loaded ({}); using defaults", e);
            Config::default()
        }
    };

    match cli.command {
        Command::Devices => list_devices(),
        Command::Record { session, device } => {
            let session_id =
                session.unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));
            run_record(config, session_id, device).await
        }
    }
}

fn level_bar(rms: f32) -> String {
    let filled = ((rms * 8.0).round() as usize).min(8);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(8 - filled))
}

fn list_devices() -> Result<()> {
    let catalog = DeviceCatalog::detect();

    if catalog.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    for device in catalog.devices() {
        let marker = if device.id == catalog.selected() {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, device.label);
    }

    Ok(())
}

async fn run_record(config: Config, session_id: String, device: Option<String>) -> Result<()> {
    // Opening an already-transcribed session short-circuits to done.
    let client = ApiClient::new(&config.server.base_url);
    let opened = match client.fetch_session(&session_id).await {
        Ok(view) => Some(view),
        Err(e) => {
            warn!("could not fetch session {}: {}", session_id, e);
            None
        }
    };

    let catalog = DeviceCatalog::detect();
    let mut machine = RecordingStateMachine::new(
        session_id.as_str(),
        opened.as_ref(),
        catalog,
        Box::new(CpalFactory),
        &config,
    );

    if machine.status() == RecordingStatus::Done {
        println!("Session {} is already transcribed.", session_id);
        if let Some(view) = opened {
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        return Ok(());
    }

    if let Some(device) = device {
        if !machine.select_device(&device) {
            anyhow::bail!("unknown input device: {device}");
        }
    }

    let level = Arc::new(Mutex::new(0.0f32));

    let mut events = machine.subscribe();
    let level_for_printer = Arc::clone(&level);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RecorderEvent::StatusChanged(status)) => {
                    println!("[{}]", status.label());
                }
                Ok(RecorderEvent::StatusMessage(message)) => println!("{message}"),
                Ok(RecorderEvent::TimerTick(display)) => {
                    let rms = *level_for_printer.lock().unwrap();
                    println!("  {display} {}", level_bar(rms));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    machine.start().await?;

    // The meter lives exactly as long as the stream; the task ends with it.
    if let Some(mut meter) = machine.level_meter() {
        let level = Arc::clone(&level);
        tokio::spawn(async move {
            while let Some(frame) = meter.next().await {
                *level.lock().unwrap() = frame.rms;
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    Some("pause") => { machine.pause().await?; }
                    Some("resume") => { machine.resume().await?; }
                    Some("stop") | None => {
                        machine.stop().await?;
                        break;
                    }
                    Some(other) => {
                        if !other.is_empty() {
                            println!("commands: pause, resume, stop");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                machine.stop().await?;
                break;
            }
        }
    }

    println!("Final status: {}", machine.status().label());
    Ok(())
}
