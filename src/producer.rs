//! Off-loop producers.
//!
//! A producer runs on its own thread, may block on its input, and hands
//! events to the event loop through a `calloop::channel`.  Dropping the
//! sender (producer finished or failed) shows up on the loop as `Closed`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use calloop::channel::{self, Channel, Sender};
use serde::de;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ipc::GestureInput;
use crate::tracking::LandmarkFrame;

/// Events delivered from a producer thread to the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerEvent {
    /// Raw detector output for one video frame.
    Landmarks(LandmarkFrame),
    /// A pre-classified gesture.
    Gesture(GestureInput),
}

/// Anything that can deliver `ProducerEvent`s over a channel.
pub trait LandmarkSource: Send + 'static {
    fn run(self: Box<Self>, tx: Sender<ProducerEvent>);
}

/// Spawn a source on its own thread and return the loop-side channel.
pub fn spawn_landmark_source<S: LandmarkSource>(source: S) -> io::Result<Channel<ProducerEvent>> {
    let (tx, rx) = channel::channel();
    thread::Builder::new()
        .name("landmark-source".into())
        .spawn(move || Box::new(source).run(tx))?;
    Ok(rx)
}

// ── Replay ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot open replay file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read error at line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one replay line.  Blank lines yield `None`.
///
/// Objects carrying `detected` or `landmarks` are landmark frames; any
/// other object is a recorded gesture input.
pub fn parse_line(line: usize, text: &str) -> Result<Option<ProducerEvent>, ReplayError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let parse_err = |source: serde_json::Error| ReplayError::Parse { line, source };

    let value: Value = serde_json::from_str(text).map_err(parse_err)?;
    if !value.is_object() {
        return Err(parse_err(de::Error::custom("expected a JSON object")));
    }
    let is_frame = value.get("detected").is_some() || value.get("landmarks").is_some();
    let event = if is_frame {
        ProducerEvent::Landmarks(serde_json::from_value(value).map_err(parse_err)?)
    } else {
        ProducerEvent::Gesture(serde_json::from_value(value).map_err(parse_err)?)
    };
    Ok(Some(event))
}

/// Replays a JSON-lines recording at a fixed frame rate.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    pub path: PathBuf,
    pub fps: f64,
    /// Start over at end of file instead of finishing.
    pub looping: bool,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, fps: f64, looping: bool) -> Self {
        Self {
            path: path.into(),
            fps,
            looping,
        }
    }

    fn frame_interval(&self) -> Duration {
        if self.fps > 0.0 && self.fps.is_finite() {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::ZERO
        }
    }

    /// Play the file once.  Returns the number of frames sent, or `None`
    /// when the loop side hung up.
    fn play_once(&self, tx: &Sender<ProducerEvent>) -> Result<Option<usize>, ReplayError> {
        let file = File::open(&self.path).map_err(|source| ReplayError::Open {
            path: self.path.clone(),
            source,
        })?;
        let interval = self.frame_interval();
        let mut next_frame = Instant::now();
        let mut sent = 0;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index + 1;
            let text = line.map_err(|source| ReplayError::Read { line: line_no, source })?;
            let event = match parse_line(line_no, &text) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!("skipping replay {}", e);
                    continue;
                }
            };

            let now = Instant::now();
            if next_frame > now {
                thread::sleep(next_frame - now);
            }
            next_frame += interval;

            if tx.send(event).is_err() {
                return Ok(None);
            }
            sent += 1;
        }
        Ok(Some(sent))
    }
}

impl LandmarkSource for ReplaySource {
    fn run(self: Box<Self>, tx: Sender<ProducerEvent>) {
        info!(path = %self.path.display(), fps = self.fps, looping = self.looping, "replay started");
        loop {
            match self.play_once(&tx) {
                Ok(Some(frames)) => {
                    debug!(frames, "replay pass finished");
                    if !self.looping || frames == 0 {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("event loop gone, stopping replay");
                    return;
                }
                Err(e) => {
                    warn!("replay failed: {}", e);
                    break;
                }
            }
        }
        info!("replay finished");
    }
}

// ── Tests ──────────────────────────────────────────────────
