//! Operator command input.
//!
//! The acquisition loop polls an [`OperatorInput`] once per iteration and never waits
//! on it. Every press is delivered exactly once: channel-backed input consumes each
//! event as it is received, and [`EdgeTrigger`] turns level-polled key state into
//! single press events so a held key does not repeat its command.

use super::OperatorCommand;
use std::collections::{HashSet, VecDeque};
use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Non-blocking source of operator commands.
pub trait OperatorInput {
    /// Next pending command, if any.
    fn poll_command(&mut self) -> Option<OperatorCommand>;
}

/// Input fed through a channel, e.g. by [`spawn_stdin_reader`].
pub struct ChannelInput {
    receiver: mpsc::UnboundedReceiver<OperatorCommand>,
}

impl ChannelInput {
    /// Creates the input and the sender that feeds it.
    pub fn new() -> (mpsc::UnboundedSender<OperatorCommand>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }
}

impl OperatorInput for ChannelInput {
    fn poll_command(&mut self) -> Option<OperatorCommand> {
        self.receiver.try_recv().ok()
    }
}

impl OperatorInput for VecDeque<OperatorCommand> {
    fn poll_command(&mut self) -> Option<OperatorCommand> {
        self.pop_front()
    }
}

/// Parses one input line: its first non-whitespace character is the key.
pub fn parse_line(line: &str) -> Option<OperatorCommand> {
    line.trim().chars().next().and_then(OperatorCommand::from_key)
}

/// Reads lines from stdin on a dedicated thread and forwards each recognised key as
/// one command.
///
/// Blocking reads stay off the runtime so they cannot hold up shutdown. The thread
/// ends on EOF or when the receiving side is dropped.
pub fn spawn_stdin_reader(sender: mpsc::UnboundedSender<OperatorCommand>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Operator input closed: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Some(command) => {
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => debug!("Ignoring operator input '{}'", line.trim()),
                }
            }
        })
}

/// Key state that can only be polled (pressed / not pressed).
pub trait KeyLevelSource {
    /// Whether `key` is currently held. Implementations match case-insensitively.
    fn is_pressed(&mut self, key: char) -> bool;
}

/// Converts level-polled key state into one command per press.
pub struct EdgeTrigger<S> {
    source: S,
    held: HashSet<char>,
    queued: VecDeque<OperatorCommand>,
}

impl<S: KeyLevelSource> EdgeTrigger<S> {
    /// Wraps a level source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            held: HashSet::new(),
            queued: VecDeque::new(),
        }
    }

    fn sample(&mut self) {
        for (key, command) in OperatorCommand::KEYS {
            let pressed = self.source.is_pressed(key);
            let was_held = self.held.contains(&key);
            match (pressed, was_held) {
                (true, false) => {
                    self.held.insert(key);
                    self.queued.push_back(command);
                }
                (false, true) => {
                    self.held.remove(&key);
                }
                _ => {}
            }
        }
    }
}

impl<S: KeyLevelSource> OperatorInput for EdgeTrigger<S> {
    fn poll_command(&mut self) -> Option<OperatorCommand> {
        if self.queued.is_empty() {
            self.sample();
        }
        self.queued.pop_front()
    }
}
