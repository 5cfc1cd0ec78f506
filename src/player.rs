use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, info};

use crate::compile::Timeline;
use crate::mapper::KeyMapper;
use crate::model::{Action, Tier};
use crate::sink::ActionSink;
use crate::transport::Transport;

/// Sleep while paused before re-polling the control channel.
const PAUSE_POLL: Duration = Duration::from_millis(50);
/// Sleep while running but ahead of the next event.
const IDLE_POLL: Duration = Duration::from_millis(1);
/// Seconds past the last event before the session auto-pauses.
const END_GRACE: f64 = 0.1;
/// Minimum spacing of idle progress updates; every batch also reports.
const PROGRESS_INTERVAL: f64 = 0.05;

/// Control messages. The dispatcher thread is their only consumer; there is
/// no shared mutable transport state outside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Pause,
    Resume,
    Seek(f64),
    Stop,
}

/// Notifications for the presentation layer. Progress is non-authoritative,
/// for display only.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerUpdate {
    Status(String),
    Progress(f64),
    NoteActive { pitch: u8, on: bool },
    AutoPaused,
    Finished,
}

pub struct PlayerHandle {
    pub command_tx: Sender<PlayerCommand>,
    pub update_rx: Receiver<PlayerUpdate>,
}

/// Spawns the dispatch loop on its own thread and returns its channel ends.
/// The sink must have been built from the timeline's key-state table.
pub fn spawn_player<M>(
    timeline: Timeline,
    sink: ActionSink,
    mapper: M,
    countdown: bool,
) -> PlayerHandle
where
    M: KeyMapper + Send + 'static,
{
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    thread::spawn(move || {
        let session = Session {
            timeline,
            sink,
            mapper,
            command_rx,
            update_tx,
        };
        session.run(countdown);
    });

    PlayerHandle {
        command_tx,
        update_rx,
    }
}

struct Session<M> {
    timeline: Timeline,
    sink: ActionSink,
    mapper: M,
    command_rx: Receiver<PlayerCommand>,
    update_tx: Sender<PlayerUpdate>,
}

impl<M: KeyMapper> Session<M> {
    fn run(mut self, countdown: bool) {
        if countdown && !self.run_countdown() {
            self.sink.shutdown();
            let _ = self.update_tx.send(PlayerUpdate::Finished);
            return;
        }

        self.status("Playing!");
        info!(
            events = self.timeline.events.len(),
            duration = self.timeline.total_duration,
            "starting playback"
        );
        let mut transport = Transport::start(Instant::now());
        let mut last_progress = f64::NEG_INFINITY;

        loop {
            loop {
                match self.command_rx.try_recv() {
                    Ok(command) => self.handle(command, &mut transport),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        // Controller gone; never leave keys held.
                        transport.stop();
                        self.release_all();
                        break;
                    }
                }
            }

            if transport.stopped {
                self.sink.shutdown();
                self.status("Shutdown complete.");
                let _ = self.update_tx.send(PlayerUpdate::Finished);
                info!("playback finished");
                return;
            }

            if transport.paused {
                thread::sleep(PAUSE_POLL);
                continue;
            }

            let now = Instant::now();
            let playback_time = transport.playback_time(now);

            if transport.cursor >= self.timeline.events.len() {
                if playback_time > self.timeline.total_duration + END_GRACE {
                    transport.pause(now);
                    self.sink.shutdown();
                    let _ = self.update_tx.send(PlayerUpdate::AutoPaused);
                    self.status("Playback finished. Paused.");
                    thread::sleep(PAUSE_POLL);
                } else {
                    thread::sleep(IDLE_POLL);
                }
                continue;
            }

            let dispatched = if self.timeline.events[transport.cursor].time <= playback_time {
                // Everything that is due goes into one batch; a late loop
                // compresses missed timestamps together instead of dropping
                // them.
                let start = transport.cursor;
                let mut end = start;
                while end < self.timeline.events.len()
                    && self.timeline.events[end].time <= playback_time
                {
                    end += 1;
                }
                transport.cursor = end;
                self.execute_batch(start, end, playback_time);
                true
            } else {
                thread::sleep(IDLE_POLL);
                false
            };

            // Progress is display-only; idle ticks report at a coarse rate
            // so an undrained observer never accumulates a flood.
            if dispatched || playback_time - last_progress >= PROGRESS_INTERVAL {
                last_progress = playback_time;
                let _ = self.update_tx.send(PlayerUpdate::Progress(playback_time));
            }
        }
    }

    fn handle(&mut self, command: PlayerCommand, transport: &mut Transport) {
        match command {
            PlayerCommand::Pause => {
                if !transport.paused {
                    transport.pause(Instant::now());
                    self.release_all();
                    self.status("Paused.");
                }
            }
            PlayerCommand::Resume => {
                if transport.paused {
                    let now = Instant::now();
                    if transport.cursor >= self.timeline.events.len() {
                        self.seek_to(transport, 0.0, now);
                    }
                    transport.resume(now);
                    self.status("Resuming...");
                }
            }
            PlayerCommand::Seek(target) => {
                self.seek_to(transport, target, Instant::now());
            }
            PlayerCommand::Stop => {
                self.status("Stopping playback...");
                transport.stop();
                self.release_all();
            }
        }
    }

    // Shutdown comes first so the abandoned position cannot leave stuck
    // keys behind.
    fn seek_to(&mut self, transport: &mut Transport, target: f64, now: Instant) {
        self.release_all();
        let cursor = self.timeline.events.partition_point(|e| e.time < target);
        transport.seek(now, target, cursor);
        let _ = self
            .update_tx
            .send(PlayerUpdate::Progress(target.max(0.0)));
    }

    fn release_all(&mut self) {
        self.status("Releasing all keys...");
        self.sink.shutdown();
    }

    /// Fixed cross-type ordering within a batch: pedal changes land first,
    /// then releases, then presses, regardless of fine-grained timestamp
    /// differences.
    fn execute_batch(&mut self, start: usize, end: usize, playback_time: f64) {
        for tier in [Tier::Pedal, Tier::Release, Tier::Press] {
            for event in self.timeline.events[start..end]
                .iter()
                .filter(|e| e.tier == tier)
            {
                debug!(
                    time = event.time,
                    lag = playback_time - event.time,
                    action = ?event.action,
                    "dispatch"
                );
                if let Some(pitch) = event.pitch {
                    let on = matches!(event.action, Action::Press { .. });
                    let _ = self.update_tx.send(PlayerUpdate::NoteActive { pitch, on });
                }
                self.sink.apply(event, &self.mapper);
            }
        }
    }

    /// Returns false if playback was cancelled before it began.
    fn run_countdown(&mut self) -> bool {
        self.status("Get ready...");
        for i in (1..=3).rev() {
            self.status(format!("{i}..."));
            let deadline = Instant::now() + Duration::from_secs(1);
            loop {
                match self.command_rx.recv_deadline(deadline) {
                    Ok(PlayerCommand::Stop) => {
                        self.status("Stopping playback...");
                        return false;
                    }
                    // Other controls are meaningless before playback starts.
                    Ok(_) => {}
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return false,
                }
            }
        }
        true
    }

    fn status(&self, text: impl Into<String>) {
        let _ = self.update_tx.send(PlayerUpdate::Status(text.into()));
    }
}
