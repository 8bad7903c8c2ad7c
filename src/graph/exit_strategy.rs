//! Training termination policy, ported line-for-line from
//! `original_source/src/ml/exit_strategy.hpp` (spec section 4.3).

use std::time::Duration;

pub trait ExitStrategy {
    /// `elapsed` is wall-clock time since training started.
    fn is_done(&mut self, current_epoch: u64, loss: f32, elapsed: Duration) -> bool;
}

pub struct DefaultExitStrategy {
    min_epochs: u64,
    max_epochs: u64,
    max_elapsed: Duration,
    patience: u64,
    zero_tolerance: f32,
    improvement_tolerance: f32,
    lowest_loss: f32,
    lowest_loss_epoch: u64,
}

impl DefaultExitStrategy {
    pub fn new(min_epochs: u64, max_epochs: u64, max_elapsed: Duration, patience: u64) -> Self {
        DefaultExitStrategy {
            min_epochs,
            max_epochs,
            max_elapsed,
            patience,
            zero_tolerance: 1e-6,
            improvement_tolerance: 1e-4,
            lowest_loss: f32::INFINITY,
            lowest_loss_epoch: 0,
        }
    }

    pub fn with_zero_tolerance(mut self, tolerance: f32) -> Self {
        self.zero_tolerance = tolerance;
        self
    }

    pub fn with_improvement_tolerance(mut self, tolerance: f32) -> Self {
        self.improvement_tolerance = tolerance;
        self
    }
}

impl ExitStrategy for DefaultExitStrategy {
    fn is_done(&mut self, current_epoch: u64, loss: f32, elapsed: Duration) -> bool {
        if loss + self.improvement_tolerance <= self.lowest_loss {
            self.lowest_loss = loss;
            self.lowest_loss_epoch = current_epoch;
        }

        if current_epoch < self.min_epochs {
            return false;
        }

        current_epoch >= self.max_epochs
            || elapsed >= self.max_elapsed
            || (current_epoch - self.lowest_loss_epoch) >= self.patience
            || loss <= self.zero_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_epoch_cap() {
        let mut strategy = DefaultExitStrategy::new(0, 5, Duration::from_secs(3600), 100);
        for epoch in 0..4 {
            assert!(!strategy.is_done(epoch, 1.0, Duration::from_secs(0)));
        }
        assert!(strategy.is_done(5, 1.0, Duration::from_secs(0)));
    }

    #[test]
    fn stops_when_loss_hits_zero_tolerance() {
        let mut strategy = DefaultExitStrategy::new(0, 1000, Duration::from_secs(3600), 1000);
        assert!(strategy.is_done(0, 0.0, Duration::from_secs(0)));
    }

    #[test]
    fn respects_minimum_epoch_floor_before_patience_kicks_in() {
        let mut strategy = DefaultExitStrategy::new(10, 1000, Duration::from_secs(3600), 1);
        for epoch in 0..10 {
            assert!(!strategy.is_done(epoch, 1.0, Duration::from_secs(0)));
        }
    }

    #[test]
    fn stops_after_patience_epochs_without_improvement() {
        let mut strategy = DefaultExitStrategy::new(0, 1000, Duration::from_secs(3600), 2);
        assert!(!strategy.is_done(0, 1.0, Duration::from_secs(0)));
        assert!(!strategy.is_done(1, 1.0, Duration::from_secs(0)));
        assert!(strategy.is_done(2, 1.0, Duration::from_secs(0)));
    }
}
