use crate::config::ScheduleConfig;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub accuracy: f64,
    pub loss: f64,
    pub val_accuracy: f64,
    pub val_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochDecision {
    /// Validation loss improved on every earlier epoch.
    pub save_checkpoint: bool,
    pub stop: bool,
}

/// Multiplies the rate by `factor` on every epoch `e > 0` with
/// `e % every == 0`.
#[derive(Debug, Clone, Copy)]
pub struct StepDecay {
    pub factor: f64,
    pub every: usize,
}

impl StepDecay {
    pub fn next_rate(&self, epoch: usize, current: f64) -> f64 {
        if epoch > 0 && self.every > 0 && epoch % self.every == 0 {
            current * self.factor
        } else {
            current
        }
    }
}

/// Stops once `val_loss` has not improved for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    wait: usize,
    best: f64,
    best_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            wait: 0,
            best: f64::INFINITY,
            best_epoch: None,
        }
    }

    /// Returns whether `val_loss` is a new best, and whether to stop.
    pub fn update(&mut self, epoch: usize, val_loss: f64) -> (bool, bool) {
        if val_loss < self.best {
            self.best = val_loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return (true, false);
        }

        self.wait += 1;
        (false, self.wait >= self.patience && epoch > 0)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.best_epoch.map(|_| self.best)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MonitorError {
    #[error("Epoch {got} reported, expected {expected}")]
    OutOfOrder { expected: usize, got: usize },
    #[error("Epoch {0} reported a non-finite validation loss")]
    NonFinite(usize),
}

/// Per-epoch bookkeeping for a training run: the learning-rate schedule,
/// early stopping on validation loss and best-checkpoint selection.
#[derive(Debug, Clone)]
pub struct TrainingMonitor {
    decay: StepDecay,
    early_stopping: EarlyStopping,
    learning_rate: f64,
    next_epoch: usize,
    max_epochs: usize,
    started: Option<Instant>,
    history: Vec<EpochMetrics>,
}

impl TrainingMonitor {
    pub fn new(schedule: &ScheduleConfig) -> Self {
        Self {
            decay: StepDecay {
                factor: schedule.decay_factor,
                every: schedule.decay_every,
            },
            early_stopping: EarlyStopping::new(schedule.patience),
            learning_rate: schedule.initial_learning_rate,
            next_epoch: 0,
            max_epochs: schedule.epochs,
            started: None,
            history: Vec::new(),
        }
    }

    /// Learning rate to train epoch `next_epoch()` with.
    pub fn begin_epoch(&mut self) -> f64 {
        self.started = Some(Instant::now());
        self.learning_rate = self.decay.next_rate(self.next_epoch, self.learning_rate);
        self.learning_rate
    }

    pub fn end_epoch(&mut self, metrics: EpochMetrics) -> Result<EpochDecision, MonitorError> {
        if metrics.epoch != self.next_epoch {
            return Err(MonitorError::OutOfOrder {
                expected: self.next_epoch,
                got: metrics.epoch,
            });
        }
        if !metrics.val_loss.is_finite() {
            return Err(MonitorError::NonFinite(metrics.epoch));
        }

        let (improved, patience_exhausted) =
            self.early_stopping.update(metrics.epoch, metrics.val_loss);
        self.history.push(metrics);
        self.next_epoch += 1;

        let duration_ms = self
            .started
            .take()
            .map(|started| started.elapsed().as_millis() as u64);
        tracing::info!(
            epoch = metrics.epoch + 1,
            duration_ms,
            accuracy = metrics.accuracy,
            loss = metrics.loss,
            val_accuracy = metrics.val_accuracy,
            val_loss = metrics.val_loss,
            learning_rate = self.learning_rate,
            "Epoch complete"
        );
        if improved {
            tracing::info!(epoch = metrics.epoch + 1, val_loss = metrics.val_loss, "New best checkpoint");
        }
        if patience_exhausted {
            tracing::info!(epoch = metrics.epoch + 1, "Early stopping");
        }

        Ok(EpochDecision {
            save_checkpoint: improved,
            stop: patience_exhausted || self.next_epoch >= self.max_epochs,
        })
    }

    pub fn next_epoch(&self) -> usize {
        self.next_epoch
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Epoch whose weights are restored at the end of the run.
    pub fn best_epoch(&self) -> Option<&EpochMetrics> {
        self.early_stopping
            .best_epoch()
            .and_then(|epoch| self.history.get(epoch))
    }

    pub fn history(&self) -> &[EpochMetrics] {
        &self.history
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub best: Option<EpochMetrics>,
    pub final_learning_rate: f64,
}

/// Replays a recorded history through a fresh monitor.
pub fn replay(
    schedule: &ScheduleConfig,
    history: &[EpochMetrics],
) -> Result<RunSummary, MonitorError> {
    let mut monitor = TrainingMonitor::new(schedule);
    let mut stopped_early = false;

    for metrics in history {
        monitor.begin_epoch();
        let decision = monitor.end_epoch(*metrics)?;
        if decision.stop {
            stopped_early = monitor.next_epoch() < schedule.epochs;
            break;
        }
    }

    Ok(RunSummary {
        epochs_run: monitor.next_epoch(),
        stopped_early,
        best: monitor.best_epoch().copied(),
        final_learning_rate: monitor.learning_rate(),
    })
}
