//! Streaming Client: periodic capture with a bounded number of in-flight
//! scorer requests
//!
//! - One tick = at most one frame. If `in_flight >= cap` the tick is dropped,
//!   never queued.
//! - Each dispatched frame runs in its own task holding an `InFlightSlot`;
//!   the slot is released on drop, whatever way the task ends.
//! - Results flow back over a channel to the single loop that owns the
//!   tracker, so there is exactly one writer of the count.
//! - Stop and reset bump the epoch; results carrying an older epoch are
//!   discarded as stale.
//! - While a remote reset is outstanding no frame is dispatched, so the
//!   matcher's pre-reset count can never leak back into the local one.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::{EngineConfig, RemoteMode, RemoteRepTracker, ThresholdController};
use crate::types::{EngineError, RemoteScore, ThresholdMode, Thresholds};

// =============================================================================
// COLLABORATORS
// =============================================================================

/// One encoded camera frame
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Exclusively owned capture resource. Dropping it releases the device.
pub trait FrameSource: Send + 'static {
    /// Grab the current frame; None when nothing is available this tick
    fn capture(&mut self) -> Option<CapturedFrame>;
}

/// Frame plus the optional one-shot threshold override
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub frame: CapturedFrame,
    pub overrides: Option<Thresholds>,
}

/// Remote DTW-style matcher
pub trait Scorer: Send + Sync + 'static {
    /// Readiness probe, called once before the loop starts
    fn ready(&self) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn score(&self, request: ScoreRequest) -> impl Future<Output = Result<RemoteScore, EngineError>> + Send;

    /// Ask the matcher to clear its own matching state
    fn reset(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

// =============================================================================
// BACKPRESSURE
// =============================================================================

/// Counter of outstanding requests with a hard cap
#[derive(Debug, Clone)]
pub struct InFlightGate {
    in_flight: Arc<AtomicUsize>,
    cap: usize,
}

impl InFlightGate {
    pub fn new(cap: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            cap: cap.max(1),
        }
    }

    /// Take a slot, or None if the cap is reached
    pub fn try_acquire(&self) -> Option<InFlightSlot> {
        let cap = self.cap;
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < cap).then_some(n + 1))
            .ok()
            .map(|_| InFlightSlot { in_flight: Arc::clone(&self.in_flight) })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// Held for the lifetime of one request
#[derive(Debug)]
pub struct InFlightSlot {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Session liveness: a running flag plus an epoch captured at dispatch
#[derive(Debug, Clone)]
pub struct Liveness {
    live: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Results dispatched under `ticket` may still be applied
    pub fn is_current(&self, ticket: u64) -> bool {
        self.is_live() && self.ticket() == ticket
    }

    /// `is_current` as a Result, for the completion path
    pub fn check(&self, ticket: u64) -> Result<(), EngineError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            Err(EngineError::StaleSession)
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Invalidate everything dispatched so far
    pub fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn kill(&self) {
        self.live.store(false, Ordering::Release);
        self.bump();
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Observable state of a running stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub count: u64,
    pub last_distance: Option<f64>,
    pub threshold_mode: ThresholdMode,
    pub in_flight: usize,
    pub dispatched: u64,
    /// Ticks skipped: cap reached, no frame available or remote reset pending
    pub dropped: u64,
    pub failed: u64,
    pub stale: u64,
    pub running: bool,
}

#[derive(Debug)]
enum Command {
    SetManual(Thresholds),
    CommitOverride,
    SetAuto,
    Reset,
}

#[derive(Debug, Clone)]
pub struct StreamingClient<S: Scorer> {
    scorer: Arc<S>,
    tick_interval: Duration,
    in_flight_cap: usize,
    remote_mode: RemoteMode,
    confirm_frames: u32,
    initial_override: Option<Thresholds>,
}

impl<S: Scorer> StreamingClient<S> {
    pub fn new(scorer: S, config: &EngineConfig) -> Self {
        Self {
            scorer: Arc::new(scorer),
            tick_interval: config.tick_interval(),
            in_flight_cap: config.in_flight_cap,
            remote_mode: config.remote_mode,
            confirm_frames: config.remote_confirm_frames,
            initial_override: None,
        }
    }

    /// Start in MANUAL mode with `thresholds` committed for the first frame
    pub fn with_manual_override(mut self, thresholds: Thresholds) -> Self {
        self.initial_override = Some(thresholds);
        self
    }

    /// Probe the scorer and start the capture loop.
    ///
    /// `source` is owned by the loop from here on and dropped when the loop
    /// ends; if the scorer is not ready it is dropped right away.
    pub async fn start<F: FrameSource>(&self, source: F) -> Result<StreamHandle, EngineError> {
        if let Err(e) = self.scorer.ready().await {
            warn!(error = %e, "scorer not ready, releasing frame source");
            drop(source);
            return Err(e);
        }

        let gate = InFlightGate::new(self.in_flight_cap);
        let liveness = Liveness::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(StreamSnapshot {
            running: true,
            ..StreamSnapshot::default()
        });

        let mut thresholds = ThresholdController::new();
        if let Some(t) = self.initial_override {
            thresholds.set_manual(t);
            thresholds.commit_override();
        }

        let stream = StreamLoop {
            scorer: Arc::clone(&self.scorer),
            gate,
            liveness: liveness.clone(),
            tracker: RemoteRepTracker::new(self.remote_mode, self.confirm_frames),
            thresholds,
            resets_pending: 0,
            snapshot: StreamSnapshot::default(),
            snapshot_tx,
        };

        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            cap = self.in_flight_cap,
            "streaming started"
        );
        let task = tokio::spawn(stream.run(source, self.tick_interval, command_rx, shutdown_rx));

        Ok(StreamHandle {
            commands: command_tx,
            shutdown: shutdown_tx,
            snapshot: snapshot_rx,
            liveness,
            task: Some(task),
        })
    }
}

/// Control surface of a running stream. Dropping it stops the stream.
#[derive(Debug)]
pub struct StreamHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    snapshot: watch::Receiver<StreamSnapshot>,
    liveness: Liveness,
    task: Option<JoinHandle<StreamSnapshot>>,
}

impl StreamHandle {
    /// Adjust manual thresholds (switches to MANUAL, nothing sent yet)
    pub fn set_manual(&self, thresholds: Thresholds) {
        self.send(Command::SetManual(thresholds));
    }

    /// Attach the manual thresholds to the next outgoing frame only
    pub fn commit_override(&self) {
        self.send(Command::CommitOverride);
    }

    pub fn set_auto(&self) {
        self.send(Command::SetAuto);
    }

    /// Clear the local count and ask the remote matcher to clear its state.
    /// Dispatch is held until the remote acknowledges (or fails) the reset.
    pub fn reset(&self) {
        // Invalidate in-flight results now, not when the loop gets to it
        self.liveness.bump();
        self.send(Command::Reset);
    }

    /// Stop scheduling immediately. In-flight requests finish but their
    /// results are discarded.
    pub fn stop(&self) {
        if self.liveness.is_live() {
            info!("streaming stopped");
        }
        self.liveness.kill();
        let _ = self.shutdown.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.liveness.is_live()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.snapshot.clone()
    }

    /// Stop and wait for the loop to wind down; returns the final snapshot
    pub async fn join(mut self) -> StreamSnapshot {
        self.stop();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "streaming task ended abnormally");
                    self.snapshot()
                }
            },
            None => self.snapshot(),
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("command ignored, stream already ended");
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The single owner of the tracker and threshold controller
struct StreamLoop<S: Scorer> {
    scorer: Arc<S>,
    gate: InFlightGate,
    liveness: Liveness,
    tracker: RemoteRepTracker,
    thresholds: ThresholdController,
    /// Remote resets sent but not yet finished
    resets_pending: u32,
    snapshot: StreamSnapshot,
    snapshot_tx: watch::Sender<StreamSnapshot>,
}

/// Results flowing back from spawned tasks to the loop
enum Completion {
    Score(u64, Result<RemoteScore, EngineError>),
    RemoteReset(Result<(), EngineError>),
}

impl<S: Scorer> StreamLoop<S> {
    async fn run<F: FrameSource>(
        mut self,
        mut source: F,
        tick: Duration,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) -> StreamSnapshot {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if !self.liveness.is_live() {
                        break;
                    }
                    self.on_tick(&mut source, &done_tx);
                }
                Some(completion) = done_rx.recv() => match completion {
                    Completion::Score(ticket, result) => self.on_completion(ticket, result),
                    Completion::RemoteReset(result) => self.on_remote_reset(result),
                },
                Some(command) = commands.recv() => self.on_command(command, &done_tx),
            }
            self.publish(true);
        }

        // Frame source is released here, on every exit path
        drop(source);
        self.publish(false);
        self.snapshot
    }

    fn on_tick<F: FrameSource>(&mut self, source: &mut F, done: &mpsc::UnboundedSender<Completion>) {
        if self.resets_pending > 0 {
            self.snapshot.dropped += 1;
            debug!("remote reset pending, tick dropped");
            return;
        }
        let Some(slot) = self.gate.try_acquire() else {
            self.snapshot.dropped += 1;
            debug!(in_flight = self.gate.in_flight(), "in-flight cap reached, tick dropped");
            return;
        };
        let Some(frame) = source.capture() else {
            self.snapshot.dropped += 1;
            debug!("no frame available, tick dropped");
            return;
        };

        let request = ScoreRequest {
            frame,
            overrides: self.thresholds.drain_override_for_next_frame(),
        };
        let ticket = self.liveness.ticket();
        let scorer = Arc::clone(&self.scorer);
        let done = done.clone();
        self.snapshot.dispatched += 1;

        tokio::spawn(async move {
            let _slot = slot;
            let result = scorer.score(request).await;
            // Loop may be gone already; the result is simply dropped then
            let _ = done.send(Completion::Score(ticket, result));
        });
    }

    fn on_completion(&mut self, ticket: u64, result: Result<RemoteScore, EngineError>) {
        if let Err(e) = self.liveness.check(ticket) {
            self.snapshot.stale += 1;
            debug!(ticket, error = %e, "scorer result dropped");
            return;
        }

        match result {
            Ok(score) => {
                if let Some(t) = score.thresholds {
                    self.thresholds.observe_server(t);
                }
                let update = self.tracker.apply(&score);
                if update.completed {
                    info!(count = update.count, distance = update.distance, "remote repetition");
                }
            }
            Err(e) => {
                self.snapshot.failed += 1;
                warn!(error = %e, "scorer call failed, tick dropped");
            }
        }
    }

    fn on_command(&mut self, command: Command, done: &mpsc::UnboundedSender<Completion>) {
        match command {
            Command::SetManual(t) => self.thresholds.set_manual(t),
            Command::CommitOverride => {
                if !self.thresholds.commit_override() {
                    debug!("override commit ignored outside manual mode");
                }
            }
            Command::SetAuto => {
                let restored = self.thresholds.set_auto();
                debug!(?restored, "threshold mode AUTO");
            }
            Command::Reset => {
                // Frames dispatched between the handle's bump and now saw the
                // old remote state
                self.liveness.bump();
                self.tracker.reset();
                self.resets_pending += 1;
                info!("stream reset, holding dispatch until remote clears its state");

                let scorer = Arc::clone(&self.scorer);
                let done = done.clone();
                tokio::spawn(async move {
                    let result = scorer.reset().await;
                    let _ = done.send(Completion::RemoteReset(result));
                });
            }
        }
    }

    fn on_remote_reset(&mut self, result: Result<(), EngineError>) {
        self.resets_pending = self.resets_pending.saturating_sub(1);
        match result {
            Ok(()) => debug!(pending = self.resets_pending, "remote reset acknowledged"),
            Err(e) => warn!(error = %e, "remote reset failed, remote count may resurface"),
        }
    }

    fn publish(&mut self, running: bool) {
        self.snapshot.count = self.tracker.count();
        self.snapshot.last_distance = self.tracker.last_distance();
        self.snapshot.threshold_mode = self.thresholds.mode();
        self.snapshot.in_flight = self.gate.in_flight();
        self.snapshot.running = running;
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}

// =============================================================================
// HTTP SCORER
// =============================================================================

/// Scorer speaking HTTP: `GET /health`, `POST /score` (multipart), `POST /reset`
#[derive(Debug, Clone)]
pub struct HttpScorer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScorer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Scorer for HttpScorer {
    async fn ready(&self) -> Result<(), EngineError> {
        self.client.get(self.url("/health")).send().await?.error_for_status()?;
        Ok(())
    }

    async fn score(&self, request: ScoreRequest) -> Result<RemoteScore, EngineError> {
        use reqwest::multipart::{Form, Part};

        let part = Part::bytes(request.frame.bytes)
            .file_name("frame")
            .mime_str(&request.frame.content_type)?;
        let mut form = Form::new().part("frame", part);
        if let Some(t) = request.overrides {
            form = form.text("enter", t.enter.to_string()).text("exit", t.exit.to_string());
        }

        let score = self
            .client
            .post(self.url("/score"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<RemoteScore>()
            .await?;
        Ok(score)
    }

    async fn reset(&self) -> Result<(), EngineError> {
        self.client.post(self.url("/reset")).send().await?.error_for_status()?;
        Ok(())
    }
}

// =============================================================================
// DIRECTORY SOURCE
// =============================================================================

/// Cycles over the image files of a directory, one per capture
#[derive(Debug)]
pub struct DirectoryFrameSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectoryFrameSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| image_content_type(p).is_some())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(EngineError::Config(format!(
                "no .jpg/.jpeg/.png frames in {}",
                dir.as_ref().display()
            )));
        }
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn capture(&mut self) -> Option<CapturedFrame> {
        let path = &self.files[self.next % self.files.len()];
        self.next = self.next.wrapping_add(1);

        let content_type = image_content_type(path)?;
        match std::fs::read(path) {
            Ok(bytes) => Some(CapturedFrame { bytes, content_type: content_type.to_string() }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "frame read failed");
                None
            }
        }
    }
}

fn image_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_caps_and_releases() {
        let gate = InFlightGate::new(2);
        let a = gate.try_acquire().unwrap();
        let b = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_flight(), 2);

        drop(a);
        assert_eq!(gate.in_flight(), 1);
        let _c = gate.try_acquire().unwrap();
        drop(b);
        assert_eq!(gate.in_flight(), 1);
    }

    #[test]
    fn test_slot_released_on_panic() {
        let gate = InFlightGate::new(1);
        let g = gate.clone();
        let result = std::panic::catch_unwind(move || {
            let _slot = g.try_acquire().unwrap();
            panic!("scorer blew up");
        });
        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_liveness_tickets() {
        let l = Liveness::new();
        let t0 = l.ticket();
        assert!(l.is_current(t0));
        l.bump();
        assert!(!l.is_current(t0));
        let t1 = l.ticket();
        l.kill();
        assert!(matches!(l.check(t1), Err(EngineError::StaleSession)));
        assert!(!l.is_live());
    }

    #[test]
    fn test_directory_source_cycles_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"png").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"jpg").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let mut source = DirectoryFrameSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        let first = source.capture().unwrap();
        assert_eq!(first.content_type, "image/jpeg");
        assert_eq!(source.capture().unwrap().bytes, b"png");
        assert_eq!(source.capture().unwrap().bytes, b"jpg");
    }

    #[test]
    fn test_directory_source_rejects_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryFrameSource::open(dir.path()).is_err());
    }
}
