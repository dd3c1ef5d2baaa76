//! Terminators for controlling and interrupting long-running solves.
//!
//! The driver consults its terminator between iterations; termination is
//! cooperative and an iteration is never interrupted midway. Provided
//! implementations:
//! - [`InterruptTerminator`]: responds to Ctrl-C (SIGINT) or programmatic
//!   interrupts.
//! - [`TimeOutTerminator`]: stops after a wall-clock limit.
//! - [`IterationTerminator`]: stops after an iteration budget.
//! - [`ObjectiveTerminator`]: stops when the objective crosses a limit in
//!   the direction of optimization.
//! - [`MultipleTerminators`]: combines several terminators.
//!
//! # Note
//! [`InterruptTerminator`] installs a global signal handler and **can only
//! be constructed once** per process. Attempting to create multiple
//! instances will result in a panic.

use std::sync::{atomic::AtomicBool, Arc};

use crate::settings::ObjSense;
use crate::{is_unbounded, Status, E};

/// State a terminator inspects between iterations.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub iteration: usize,
    pub objective: E,
    pub sense: ObjSense,
}

pub trait Terminator {
    fn initialize(&mut self) {}

    fn terminate(&mut self, progress: &Progress) -> Option<Status>;
}

/// Terminator that never triggers.
#[derive(Default)]
pub struct NoTerminator;

impl Terminator for NoTerminator {
    fn terminate(&mut self, _progress: &Progress) -> Option<Status> {
        None
    }
}

/// Terminator that responds to Ctrl-C (SIGINT) or programmatic interrupts.
pub struct InterruptTerminator {
    interrupted: Arc<AtomicBool>,
}

impl InterruptTerminator {
    pub fn new() -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        ctrlc::set_handler({
            let interrupted_clone = interrupted.clone();
            move || {
                interrupted_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        })
        .expect("Error setting Ctrl-C handler");
        Self { interrupted }
    }

    pub fn interrupt(&mut self) {
        self.interrupted
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Terminator for InterruptTerminator {
    fn terminate(&mut self, _progress: &Progress) -> Option<Status> {
        if self.interrupted.load(std::sync::atomic::Ordering::SeqCst) {
            Some(Status::Interrupted)
        } else {
            None
        }
    }
}

/// Terminator that triggers after a wall-clock limit in seconds.
pub struct TimeOutTerminator {
    max_time_secs: E,
    start_time: std::time::Instant,
}

impl TimeOutTerminator {
    pub fn new(max_time_secs: E) -> Self {
        Self {
            max_time_secs,
            start_time: std::time::Instant::now(),
        }
    }
}

impl Terminator for TimeOutTerminator {
    fn initialize(&mut self) {
        self.start_time = std::time::Instant::now();
    }

    fn terminate(&mut self, _progress: &Progress) -> Option<Status> {
        if self.max_time_secs >= 0. && self.start_time.elapsed().as_secs_f64() >= self.max_time_secs
        {
            Some(Status::AbortTime)
        } else {
            None
        }
    }
}

/// Terminator that triggers after a fixed number of iterations.
pub struct IterationTerminator {
    max_iterations: usize,
}

impl IterationTerminator {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl Terminator for IterationTerminator {
    fn terminate(&mut self, progress: &Progress) -> Option<Status> {
        if progress.iteration >= self.max_iterations {
            Some(Status::AbortIter)
        } else {
            None
        }
    }
}

/// Terminator that triggers once the objective crosses `limit` in the
/// direction of optimization: at or below for minimization, at or above for
/// maximization.
pub struct ObjectiveTerminator {
    limit: E,
}

impl ObjectiveTerminator {
    pub fn new(limit: E) -> Self {
        Self { limit }
    }
}

impl Terminator for ObjectiveTerminator {
    fn terminate(&mut self, progress: &Progress) -> Option<Status> {
        if is_unbounded(self.limit) {
            return None;
        }
        let crossed = match progress.sense {
            ObjSense::Minimize => progress.objective <= self.limit,
            ObjSense::Maximize => progress.objective >= self.limit,
        };
        if crossed {
            Some(Status::AbortValue)
        } else {
            None
        }
    }
}

/// Terminator that combines multiple terminators and triggers if any of
/// them do.
pub struct MultipleTerminators {
    terminators: Vec<Box<dyn Terminator>>,
}

impl MultipleTerminators {
    pub fn new(terminators: Vec<Box<dyn Terminator>>) -> Self {
        Self { terminators }
    }

    /// The standard combination derived from solver settings: time limit,
    /// iteration limit, and objective limit.
    pub fn from_settings(settings: &crate::settings::Settings) -> Self {
        let mut terminators: Vec<Box<dyn Terminator>> = Vec::new();
        if settings.time_limit >= 0. {
            terminators.push(Box::new(TimeOutTerminator::new(settings.time_limit)));
        }
        if settings.iter_limit >= 0 {
            terminators.push(Box::new(IterationTerminator::new(
                settings.iter_limit as usize,
            )));
        }
        if !is_unbounded(settings.objval_limit) {
            terminators.push(Box::new(ObjectiveTerminator::new(settings.objval_limit)));
        }
        Self::new(terminators)
    }
}

impl Terminator for MultipleTerminators {
    fn initialize(&mut self) {
        for terminator in &mut self.terminators {
            terminator.initialize();
        }
    }

    fn terminate(&mut self, progress: &Progress) -> Option<Status> {
        for terminator in &mut self.terminators {
            if let Some(status) = terminator.as_mut().terminate(progress) {
                return Some(status);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(iteration: usize, objective: E) -> Progress {
        Progress {
            iteration,
            objective,
            sense: ObjSense::Minimize,
        }
    }

    #[test]
    fn test_iteration_terminator() {
        let mut t = IterationTerminator::new(10);
        assert_eq!(t.terminate(&progress(9, 0.)), None);
        assert_eq!(t.terminate(&progress(10, 0.)), Some(Status::AbortIter));
    }

    #[test]
    fn test_objective_terminator_direction() {
        let mut t = ObjectiveTerminator::new(-5.);
        assert_eq!(t.terminate(&progress(1, 0.)), None);
        assert_eq!(t.terminate(&progress(2, -5.5)), Some(Status::AbortValue));

        let mut max_progress = progress(3, 6.);
        max_progress.sense = ObjSense::Maximize;
        let mut t = ObjectiveTerminator::new(5.);
        assert_eq!(t.terminate(&max_progress), Some(Status::AbortValue));
    }

    #[test]
    fn test_programmatic_interrupt() {
        let mut t = InterruptTerminator::new();
        assert_eq!(t.terminate(&progress(0, 0.)), None);
        t.interrupt();
        assert_eq!(t.terminate(&progress(1, 0.)), Some(Status::Interrupted));
    }

    #[test]
    fn test_multiple_terminators() {
        let mut t = MultipleTerminators::new(vec![
            Box::new(NoTerminator),
            Box::new(IterationTerminator::new(2)),
        ]);
        t.initialize();
        assert_eq!(t.terminate(&progress(1, 0.)), None);
        assert_eq!(t.terminate(&progress(2, 0.)), Some(Status::AbortIter));
    }
}
