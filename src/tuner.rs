//! Detection loop and note event stream
//!
//! Contains the per-frame decision logic (gate, onset settling, detection,
//! stability, rate limiting) and the polling loop that drives it on its own
//! thread, handing events to the display over a channel.

use crossbeam_channel::{RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::{Frame, FrameSource};
use crate::config::TunerConfig;
use crate::error::DetectError;
use crate::gate::SignalGate;
use crate::note::Note;
use crate::pitch::PitchDetector;
use crate::stability::{OnsetPhase, StabilityConfig, StabilityState};

/// Events for the presentation side, in the order they were produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TunerEvent {
    Note(Note),
    Level { rms: f32, db: f32 },
    Clear,
}

/// Where the tuner is in the silence / attack / sustain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Silent,
    Settling,
    Tracking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub idle_poll_ms: u64,
    pub settling_poll_ms: u64,
    pub tracking_poll_ms: u64,
    /// Backoff when the capture side has no new frame.
    pub retry_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 100,
            settling_poll_ms: 10,
            tracking_poll_ms: 50,
            retry_poll_ms: 10,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self, phase: Phase) -> Duration {
        let millis = match phase {
            Phase::Silent => self.idle_poll_ms,
            Phase::Settling => self.settling_poll_ms,
            Phase::Tracking => self.tracking_poll_ms,
        };
        Duration::from_millis(millis)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_poll_ms)
    }
}

pub struct Tuner<D: PitchDetector> {
    gate: SignalGate,
    detector: D,
    stability_config: StabilityConfig,
    timing: TimingConfig,
    state: StabilityState,
    phase: Phase,
    last_emit: Option<Instant>,
    last_level: Option<Instant>,
}

impl<D: PitchDetector> Tuner<D> {
    pub fn new(config: &TunerConfig, detector: D) -> Self {
        Self {
            gate: SignalGate::new(config.gate.clone()),
            detector,
            stability_config: config.stability.clone(),
            timing: config.timing.clone(),
            state: StabilityState::new(&config.stability),
            phase: Phase::Silent,
            last_emit: None,
            last_level: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn poll_interval(&self) -> Duration {
        self.timing.poll_interval(self.phase)
    }

    pub fn retry_interval(&self) -> Duration {
        self.timing.retry_interval()
    }

    pub fn stable_note(&self) -> Option<&Note> {
        self.state.notes.stable()
    }

    pub fn state(&self) -> &StabilityState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.phase = Phase::Silent;
        self.last_emit = None;
        self.last_level = None;
    }

    /// Runs one frame through the pipeline and returns the events it produced.
    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> Vec<TunerEvent> {
        let mut events = Vec::new();

        if frame.is_empty() {
            log::trace!("Skipping empty frame");
            return events;
        }
        if frame.len() < self.gate.config().min_frame_len {
            log::debug!("Skipping frame: {}", DetectError::FrameTooShort(frame.len()));
            return events;
        }

        let decision = self.gate.evaluate(&frame.samples);

        if self.stability_config.report_levels && self.due(self.last_level, self.stability_config.level_interval(), now) {
            log::debug!("Audio: RMS={:.6}, dB={:.1}", decision.rms(), decision.db());
            events.push(TunerEvent::Level {
                rms: decision.rms(),
                db: decision.db(),
            });
            self.last_level = Some(now);
        }

        if !decision.passes {
            self.go_silent(decision.db());
            events.push(TunerEvent::Clear);
            return events;
        }

        let onset = match self.state.onset.observe(decision.db(), now) {
            OnsetPhase::Settling => {
                self.phase = Phase::Settling;
                return events;
            }
            OnsetPhase::Settled { onset } => onset,
        };
        self.phase = Phase::Tracking;

        let candidate = match self.detector.detect(frame) {
            Ok(note) => note,
            Err(err) if err.is_below_threshold() => {
                log::trace!("Frame rejected: {}", err);
                self.go_silent(decision.db());
                events.push(TunerEvent::Clear);
                return events;
            }
            Err(err) => {
                log::debug!("Cannot detect pitch: {}", err);
                return events;
            }
        };

        let emit_due = self.due(self.last_emit, self.stability_config.emit_interval(), now);
        if let Some(note) = self.state.notes.observe(candidate, now, onset) {
            if emit_due {
                log::trace!("Emitting {}", note);
                events.push(TunerEvent::Note(note.clone()));
                self.last_emit = Some(now);
            }
        }

        events
    }

    fn go_silent(&mut self, db: f32) {
        self.state.onset.silence(db);
        self.state.notes.reset();
        self.phase = Phase::Silent;
    }

    fn due(&self, last: Option<Instant>, interval: Duration, now: Instant) -> bool {
        match last {
            Some(last) => now.saturating_duration_since(last) >= interval,
            None => true,
        }
    }
}

/// Polls `source` until `shutdown` fires (or its sender is dropped), sending
/// every event to `events`. Returns early if the event receiver goes away.
pub fn run_detection_loop<S, D>(
    source: &S,
    tuner: &mut Tuner<D>,
    events: &Sender<TunerEvent>,
    shutdown: &crossbeam_channel::Receiver<()>,
) where
    S: FrameSource,
    D: PitchDetector,
{
    log::info!("Detection loop started");

    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let pause = match source.latest_frame() {
            Some(frame) => {
                for event in tuner.process_frame(&frame, Instant::now()) {
                    if events.send(event).is_err() {
                        log::info!("Event receiver closed, stopping detection loop");
                        return;
                    }
                }
                tuner.poll_interval()
            }
            None => tuner.retry_interval(),
        };

        match shutdown.recv_timeout(pause) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Detection loop stopped");
}

/// Detection loop running on a dedicated thread.
pub struct DetectionWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    pub fn spawn<S, D>(source: S, mut tuner: Tuner<D>, events: Sender<TunerEvent>) -> std::io::Result<Self>
    where
        S: FrameSource + Send + 'static,
        D: PitchDetector + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let thread_handle = thread::Builder::new()
            .name("detection".into())
            .spawn(move || run_detection_loop(&source, &mut tuner, &events, &shutdown_rx))?;

        Ok(Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Detection thread panicked");
            }
        }
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
