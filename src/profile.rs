//! Instrumentation hooks invoked by the search loops around each phase.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Phase {
    Iteration,
    Guard(String),
    Apply(String),
    Novelty,
    Rename,
    Difference,
}

impl Phase {
    pub fn kind(&self) -> &'static str {
        match self {
            Phase::Iteration => "iteration",
            Phase::Guard(_) => "guard",
            Phase::Apply(_) => "apply",
            Phase::Novelty => "novelty",
            Phase::Rename => "rename",
            Phase::Difference => "difference",
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Phase::Guard(label) | Phase::Apply(label) => Some(label),
            _ => None,
        }
    }
}

pub trait Observer {
    fn phase_started(&mut self, _phase: &Phase, _depth: usize) {}
    fn phase_finished(&mut self, _phase: &Phase, _depth: usize) {}
    fn new_states(&mut self, _depth: usize, _count: usize) {}
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Accumulates wall-clock time per depth, per label and per phase kind.
#[derive(Debug, Default)]
pub struct Profiler {
    running: HashMap<(Phase, usize), Instant>,
    per_depth: BTreeMap<usize, Duration>,
    per_label: BTreeMap<String, Duration>,
    per_kind: BTreeMap<&'static str, Duration>,
    new_states: BTreeMap<usize, usize>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration of the whole iteration at `depth`.
    pub fn depth_time(&self, depth: usize) -> Option<Duration> {
        self.per_depth.get(&depth).copied()
    }

    /// Time spent testing guards and applying effects of `label`.
    pub fn label_time(&self, label: &str) -> Option<Duration> {
        self.per_label.get(label).copied()
    }

    pub fn kind_time(&self, kind: &str) -> Option<Duration> {
        self.per_kind.get(kind).copied()
    }

    pub fn new_states_at(&self, depth: usize) -> usize {
        self.new_states.get(&depth).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Duration {
        self.per_depth.values().sum()
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "complete result: {:?} in {} iterations", self.total(), self.per_depth.len());
        for (depth, time) in &self.per_depth {
            let _ = writeln!(
                out,
                "  depth {}: {:?}, {} new states",
                depth,
                time,
                self.new_states_at(*depth)
            );
        }
        for (kind, time) in &self.per_kind {
            let _ = writeln!(out, "  {}: {:?}", kind, time);
        }
        for (label, time) in &self.per_label {
            let _ = writeln!(out, "  label {}: {:?}", label, time);
        }
        out
    }
}

impl Observer for Profiler {
    fn phase_started(&mut self, phase: &Phase, depth: usize) {
        self.running.insert((phase.clone(), depth), Instant::now());
    }

    fn phase_finished(&mut self, phase: &Phase, depth: usize) {
        let Some(start) = self.running.remove(&(phase.clone(), depth)) else {
            return;
        };
        let elapsed = start.elapsed();
        if *phase == Phase::Iteration {
            *self.per_depth.entry(depth).or_default() += elapsed;
        }
        if let Some(label) = phase.label() {
            *self.per_label.entry(label.to_string()).or_default() += elapsed;
        }
        *self.per_kind.entry(phase.kind()).or_default() += elapsed;
    }

    fn new_states(&mut self, depth: usize, count: usize) {
        *self.new_states.entry(depth).or_default() += count;
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_profiler_accumulates() {
        let mut profiler = Profiler::new();
        profiler.phase_started(&Phase::Iteration, 1);
        profiler.phase_started(&Phase::Guard("inc".to_string()), 1);
        profiler.phase_finished(&Phase::Guard("inc".to_string()), 1);
        profiler.phase_started(&Phase::Apply("inc".to_string()), 1);
        profiler.phase_finished(&Phase::Apply("inc".to_string()), 1);
        profiler.new_states(1, 2);
        profiler.phase_finished(&Phase::Iteration, 1);

        assert!(profiler.depth_time(1).is_some());
        assert!(profiler.depth_time(2).is_none());
        assert!(profiler.label_time("inc").is_some());
        assert!(profiler.kind_time("guard").is_some());
        assert_eq!(profiler.new_states_at(1), 2);

        let report = profiler.report();
        assert!(report.starts_with("complete result:"));
        assert!(report.contains("label inc"));
    }

    #[test]
    fn test_unmatched_finish_is_ignored() {
        let mut profiler = Profiler::new();
        profiler.phase_finished(&Phase::Novelty, 3);
        assert!(profiler.kind_time("novelty").is_none());
        let mut noop = NoopObserver;
        noop.phase_started(&Phase::Novelty, 0);
        noop.phase_finished(&Phase::Novelty, 0);
    }
}
