//! Learning-rate decay.

use parking_lot::Mutex;

use crate::real;

/// Linear decay from `start_alpha` to `end_alpha` over the whole run.
#[derive(Debug)]
pub struct RateScheduler {
    start_alpha: real,
    end_alpha: real,
    epochs: usize,
    min_alpha_yet_reached: Mutex<real>,
}

impl RateScheduler {
    pub fn new(start_alpha: real, end_alpha: real, epochs: usize) -> Self {
        RateScheduler {
            start_alpha,
            end_alpha,
            epochs: epochs.max(1),
            min_alpha_yet_reached: Mutex::new(start_alpha),
        }
    }

    pub fn start_alpha(&self) -> real {
        self.start_alpha
    }

    pub fn end_alpha(&self) -> real {
        self.end_alpha
    }

    /// The rate at `epoch_progress` (0.0 to 1.0) of the way through `cur_epoch`.
    ///
    /// Never below `end_alpha`. Every value handed out is remembered in
    /// [`min_alpha_yet_reached`](Self::min_alpha_yet_reached).
    pub fn next_alpha(&self, epoch_progress: f64, cur_epoch: usize) -> real {
        let progress = (cur_epoch as f64 + epoch_progress) / self.epochs as f64;
        let start = self.start_alpha as f64;
        let end = self.end_alpha as f64;
        let alpha = (start - (start - end) * progress).max(end) as real;
        let mut min = self.min_alpha_yet_reached.lock();
        if alpha < *min {
            *min = alpha;
        }
        alpha
    }

    pub fn min_alpha_yet_reached(&self) -> real {
        *self.min_alpha_yet_reached.lock()
    }
}
