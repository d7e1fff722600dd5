//! Named wall-clock timers for the phases of a run.
//!
//! Printed at debug level once the run is over.
use std::time::Instant;

#[derive(Debug, Default)]
pub struct Benchmark {
    named_timers: Vec<NamedTimer>,
}

impl Benchmark {
    #[must_use]
    pub fn init() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timer: NamedTimer) {
        self.named_timers.push(timer);
    }

    /// One `name: seconds` line per stopped timer.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = String::from("\nmcscan Benchmark Summary");
        for timer in &self.named_timers {
            if let (Some(start), Some(end)) = (timer.start, timer.end) {
                summary.push_str(&format!(
                    "\n{0: <10} | {1: <10}",
                    timer.name,
                    end.duration_since(start).as_secs_f32().to_string()
                ));
            }
        }
        summary
    }
}

#[derive(Debug)]
pub struct NamedTimer {
    name: &'static str,
    start: Option<Instant>,
    end: Option<Instant>,
}

impl NamedTimer {
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Some(Instant::now()),
            end: None,
        }
    }

    pub fn end(&mut self) {
        self.end = Some(Instant::now());
    }
}
