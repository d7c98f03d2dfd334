mod commands;
mod handlers;
mod render;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::UnboundedReceiver,
};

use crate::{scan::ScanEvent, AppState};

pub use commands::{parse_line, Command, Input};

fn print_result(result: Result<String, String>) {
    match result {
        Ok(text) if text.is_empty() => {}
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("{err}"),
    }
}

async fn on_event(state: &AppState, event: ScanEvent) {
    match event {
        ScanEvent::StateChanged(snapshot) => {
            log::debug!("scan state: {snapshot:?}");
        }
        ScanEvent::Status(message) => println!("{}", render::message_line(&message)),
        ScanEvent::Error(message) => eprintln!("{}", render::message_line(&message)),
        ScanEvent::Navigate { code } => {
            state.scan.unmount().await;
            print_result(handlers::student_detail(state, &code).await);
            println!("Type `back` to return to scanning.");
        }
        ScanEvent::SessionExpired => {
            state.scan.unmount().await;
            if let Err(err) = state.credentials.clear() {
                log::warn!("Failed to clear credentials: {err:#}");
            }
            eprintln!("Session expired. Please login again.");
        }
    }
}

/// Reads operator commands from stdin and renders scan events until `quit` or EOF.
pub async fn run(state: Arc<AppState>, mut events: UnboundedReceiver<ScanEvent>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("AttendScan ready. Type help for commands.");
    if !state.credentials.is_authenticated() {
        println!("Not logged in.");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(Input::Empty) => {}
                    Ok(Input::Command(Command::Quit)) => break,
                    Ok(Input::Command(command)) => {
                        print_result(handlers::execute(&state, command).await);
                    }
                    Ok(Input::Scan(raw)) => print_result(handlers::feed_scanner(&state, &raw).await),
                    Err(err) => eprintln!("{err}"),
                }
            }
            Some(event) = events.recv() => on_event(&state, event).await,
        }
    }

    state.scan.unmount().await;
    log::info!("Console closed");
    Ok(())
}
