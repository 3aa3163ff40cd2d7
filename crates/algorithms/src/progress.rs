//! Progress side-channel for long-running workflows.
//!
//! Workflows report a percentage at fixed milestones. Reporting is purely
//! observational: nothing a receiver does can change the run.

/// Receiver of progress percentages (0 to 100)
pub trait Progress {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> Progress for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Progress receiver that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn report(&mut self, _percent: u8) {}
}
