//! Per-iteration hooks and message output.
//!
//! Logging goes through a [`Logger`] configuration object handed to the
//! driver at construction; there is no global logging state. The sink is a
//! cloneable trait object so a configured logger can be shared between
//! solver instances.

use dyn_clone::DynClone;

use crate::{SolveStats, Status, E};

/// Message severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Error,
    Warning,
    Info1,
    Info2,
    Info3,
    Debug,
}

/// Receives formatted solver messages.
pub trait MessageSink: DynClone + Send {
    fn write(&mut self, level: Verbosity, message: &str);
}

dyn_clone::clone_trait_object!(MessageSink);

/// Sink that prints errors and warnings to stderr, everything else to
/// stdout.
#[derive(Clone, Default)]
pub struct ConsoleSink;

impl MessageSink for ConsoleSink {
    fn write(&mut self, level: Verbosity, message: &str) {
        match level {
            Verbosity::Error | Verbosity::Warning => eprintln!("{}", message),
            _ => println!("{}", message),
        }
    }
}

/// Sink that drops every message.
#[derive(Clone, Default)]
pub struct SilentSink;

impl MessageSink for SilentSink {
    fn write(&mut self, _level: Verbosity, _message: &str) {}
}

/// Logger configuration passed to the driver at construction.
#[derive(Clone)]
pub struct Logger {
    verbosity: Verbosity,
    sink: Box<dyn MessageSink>,
}

impl Logger {
    pub fn new(verbosity: Verbosity, sink: Box<dyn MessageSink>) -> Self {
        Self { verbosity, sink }
    }

    pub fn silent() -> Self {
        Self::new(Verbosity::Error, Box::new(SilentSink))
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn log(&mut self, level: Verbosity, message: &str) {
        if level <= self.verbosity {
            self.sink.write(level, message);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Verbosity::Warning, Box::new(ConsoleSink))
    }
}

/// Snapshot of the solver state at an iteration boundary.
#[derive(Debug, Clone, Copy)]
pub struct IterationState {
    pub iteration: usize,
    pub objective: E,
    pub primal_infeasibility: E,
    pub dual_infeasibility: E,
    pub status: Status,
    pub stats: SolveStats,
}

/// Hook invoked once per solver iteration for logging, monitoring, or early
/// stopping. The driver only calls it at iteration boundaries, never with a
/// half-updated basis.
pub trait Callback {
    /// Called at the end of each iteration with the current solver state.
    fn call(&mut self, state: &IterationState);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
#[derive(Default)]
pub struct NoOpCallback;

impl Callback for NoOpCallback {
    fn call(&mut self, _state: &IterationState) {
        // Do nothing
    }
}

/// Prints objective and infeasibilities each iteration.
pub struct ProgressOutput {
    logger: Logger,
    every: usize,
}

impl ProgressOutput {
    pub fn new(logger: Logger, every: usize) -> Self {
        Self {
            logger,
            every: every.max(1),
        }
    }
}

impl Callback for ProgressOutput {
    fn call(&mut self, state: &IterationState) {
        if state.iteration % self.every != 0 {
            return;
        }
        let txt = format!(
            "| {:6} | {:<14.6e} | {:<10.2e} | {:<10.2e} |",
            state.iteration,
            state.objective,
            state.primal_infeasibility,
            state.dual_infeasibility,
        );
        self.logger.log(Verbosity::Info2, &txt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<(Verbosity, String)>>>);

    impl MessageSink for Capture {
        fn write(&mut self, level: Verbosity, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_verbosity_filter() {
        let capture = Capture::default();
        let mut logger = Logger::new(Verbosity::Warning, Box::new(capture.clone()));
        logger.log(Verbosity::Error, "bad");
        logger.log(Verbosity::Info3, "chatty");
        let seen = capture.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "bad");
    }

    #[test]
    fn test_logger_is_cloneable() {
        let capture = Capture::default();
        let logger = Logger::new(Verbosity::Debug, Box::new(capture.clone()));
        let mut copy = logger.clone();
        copy.log(Verbosity::Debug, "from clone");
        assert_eq!(capture.0.lock().unwrap().len(), 1);
    }
}
