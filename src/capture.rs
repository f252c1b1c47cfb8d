use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::constants::CAPTURE_PROGRESS_SAMPLE_MS;
use crate::types::SpawnedGhost;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureStatus {
    #[default]
    Idle,
    Capturing,
    Captured,
    Cancelled,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Captured => "captured",
            Self::Cancelled => "cancelled",
        }
    }

    /// Captured and Cancelled accept a new start just like Idle.
    pub fn can_start(&self) -> bool {
        !matches!(self, Self::Capturing)
    }
}

/// Side effects requested by a transition, carried out by the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEffect {
    PauseGhostAnimation,
    ResumeGhostAnimation,
    StartBeam,
    StopBeam,
    ShowProgress,
    HideProgress,
    ScheduleCompletion { after_ms: u64 },
    StartProgressSampling { every_ms: u64, duration_ms: u64 },
    ClearTimers,
    Captured(SpawnedGhost),
}

#[derive(Clone, Copy, Debug)]
pub struct CaptureContext<'a> {
    pub ghost_placed: bool,
    pub inventory_full: bool,
    pub ghost: Option<&'a SpawnedGhost>,
}

#[derive(Clone, Debug, Default)]
pub struct CaptureMachine {
    status: CaptureStatus,
    started_at_ms: u64,
    target: Option<SpawnedGhost>,
}

impl CaptureMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_capturing(&self) -> bool {
        self.status == CaptureStatus::Capturing
    }

    pub fn start(&mut self, now_ms: u64, ctx: CaptureContext<'_>) -> Vec<CaptureEffect> {
        if !self.status.can_start() || !ctx.ghost_placed || ctx.inventory_full {
            return Vec::new();
        }
        let Some(ghost) = ctx.ghost else {
            return Vec::new();
        };

        let duration_ms = ghost.capture_duration_ms;
        self.status = CaptureStatus::Capturing;
        self.started_at_ms = now_ms;
        self.target = Some(ghost.clone());
        debug!(ghost = %ghost.name, duration_ms, "capture started");
        vec![
            CaptureEffect::PauseGhostAnimation,
            CaptureEffect::StartBeam,
            CaptureEffect::ShowProgress,
            CaptureEffect::StartProgressSampling {
                every_ms: CAPTURE_PROGRESS_SAMPLE_MS,
                duration_ms,
            },
            CaptureEffect::ScheduleCompletion {
                after_ms: duration_ms,
            },
        ]
    }

    pub fn cancel(&mut self) -> Vec<CaptureEffect> {
        if !self.is_capturing() {
            return Vec::new();
        }
        self.status = CaptureStatus::Cancelled;
        self.target = None;
        debug!("capture cancelled");
        vec![
            CaptureEffect::ClearTimers,
            CaptureEffect::StopBeam,
            CaptureEffect::HideProgress,
            CaptureEffect::ResumeGhostAnimation,
        ]
    }

    /// Fraction of the hold completed, clamped to 1.
    pub fn progress(&self, now_ms: u64) -> Option<f64> {
        let target = self.target.as_ref().filter(|_| self.is_capturing())?;
        let elapsed = now_ms.saturating_sub(self.started_at_ms) as f64;
        Some((elapsed / target.capture_duration_ms.max(1) as f64).min(1.0))
    }

    /// Resolves the capture once the hold has lasted the full duration.
    pub fn complete(&mut self, now_ms: u64) -> Vec<CaptureEffect> {
        if self.progress(now_ms).map_or(true, |progress| progress < 1.0) {
            return Vec::new();
        }
        let Some(ghost) = self.target.take() else {
            return Vec::new();
        };
        self.status = CaptureStatus::Captured;
        debug!(ghost = %ghost.name, "capture completed");
        vec![
            CaptureEffect::ClearTimers,
            CaptureEffect::StopBeam,
            CaptureEffect::HideProgress,
            CaptureEffect::Captured(ghost),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureTick {
    Progress(f64),
    Elapsed,
}

/// Completion timer plus progress sampler. Both are always disarmed together.
#[derive(Debug, Default)]
pub struct CaptureTimers {
    completion: Option<JoinHandle<()>>,
    sampler: Option<JoinHandle<()>>,
}

impl CaptureTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.completion.is_some() || self.sampler.is_some()
    }

    /// Interprets the timer-related effects of a transition.
    pub fn apply(&mut self, effects: &[CaptureEffect], tx: &UnboundedSender<CaptureTick>) {
        for effect in effects {
            match effect {
                CaptureEffect::ScheduleCompletion { after_ms } => {
                    self.schedule_completion(*after_ms, tx.clone());
                }
                CaptureEffect::StartProgressSampling {
                    every_ms,
                    duration_ms,
                } => {
                    self.start_sampling(*every_ms, *duration_ms, tx.clone());
                }
                CaptureEffect::ClearTimers => self.disarm(),
                _ => {}
            }
        }
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.completion.take() {
            handle.abort();
        }
        if let Some(handle) = self.sampler.take() {
            handle.abort();
        }
    }

    fn schedule_completion(&mut self, after_ms: u64, tx: UnboundedSender<CaptureTick>) {
        if let Some(handle) = self.completion.take() {
            handle.abort();
        }
        self.completion = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            let _ = tx.send(CaptureTick::Elapsed);
        }));
    }

    fn start_sampling(&mut self, every_ms: u64, duration_ms: u64, tx: UnboundedSender<CaptureTick>) {
        if let Some(handle) = self.sampler.take() {
            handle.abort();
        }
        let started = Instant::now();
        let period = Duration::from_millis(every_ms.max(1));
        self.sampler = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started + period, period);
            loop {
                interval.tick().await;
                let elapsed = started.elapsed().as_millis() as f64;
                let progress = (elapsed / duration_ms.max(1) as f64).min(1.0);
                if tx.send(CaptureTick::Progress(progress)).is_err() || progress >= 1.0 {
                    break;
                }
            }
        }));
    }
}

impl Drop for CaptureTimers {
    fn drop(&mut self) {
        self.disarm();
    }
}
