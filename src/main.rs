use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind};
use crossterm::terminal;
use rand::rngs::StdRng;
use rand::SeedableRng;

use clavier::{
    compile, spawn_player, ActionSink, NullKeyboard, OutputMode, Performance, PlayerCommand,
    PlayerHandle, PlayerUpdate, StandardLayout,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = env::args()
        .nth(1)
        .ok_or("usage: clavier <performance.ron>")?;
    let performance = Performance::load(Path::new(&path))?;

    let mapper = StandardLayout::new();
    let timeline = compile(
        &performance.notes,
        &performance.sections,
        &performance.pedal_events,
        performance.config.mistakes(),
        &mapper,
        &mut StdRng::from_entropy(),
    );

    let sink = match performance.config.output_mode {
        OutputMode::Key => ActionSink::direct(Box::new(NullKeyboard), timeline.key_states.clone()),
        OutputMode::NumpadMacro => ActionSink::numpad(Box::new(NullKeyboard)),
    };

    println!(
        "{}: {} events, {:.1}s",
        performance.name,
        timeline.events.len(),
        timeline.total_duration
    );
    println!("space pause/resume | left/right seek 5s | q quit");
    println!("dry run: actuations are logged via tracing, no host input is injected");

    let handle = spawn_player(timeline, sink, mapper, performance.config.countdown);

    terminal::enable_raw_mode()?;
    let result = control_loop(&handle);
    terminal::disable_raw_mode()?;
    result
}

fn control_loop(handle: &PlayerHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut paused = false;
    let mut position = 0.0f64;

    loop {
        while let Ok(update) = handle.update_rx.try_recv() {
            match update {
                PlayerUpdate::Status(text) => {
                    print!("{text}\r\n");
                    io::stdout().flush()?;
                }
                PlayerUpdate::Progress(t) => position = t,
                PlayerUpdate::NoteActive { .. } => {}
                PlayerUpdate::AutoPaused => paused = true,
                PlayerUpdate::Finished => return Ok(()),
            }
        }

        if event::poll(Duration::from_millis(50))? {
            if let TermEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let command = match key.code {
                    KeyCode::Char(' ') => {
                        let command = if paused {
                            PlayerCommand::Resume
                        } else {
                            PlayerCommand::Pause
                        };
                        paused = !paused;
                        Some(command)
                    }
                    KeyCode::Left => Some(PlayerCommand::Seek((position - 5.0).max(0.0))),
                    KeyCode::Right => Some(PlayerCommand::Seek(position + 5.0)),
                    KeyCode::Char('q') | KeyCode::Esc => Some(PlayerCommand::Stop),
                    _ => None,
                };
                if let Some(command) = command {
                    let _ = handle.command_tx.send(command);
                }
            }
        }
    }
}
