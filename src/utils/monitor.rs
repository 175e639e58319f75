use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct StepTiming {
    pub step: String,
    pub elapsed: Duration,
}

/// Records wall-clock time spent in each provisioning step.
#[derive(Debug)]
pub struct StepMonitor {
    start_time: Instant,
    current: Option<(String, Instant)>,
    timings: Vec<StepTiming>,
    enabled: bool,
}

impl StepMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            start_time: Instant::now(),
            current: None,
            timings: Vec::new(),
            enabled,
        }
    }

    pub fn begin(&mut self, step: &str) {
        self.finish();
        self.current = Some((step.to_string(), Instant::now()));
    }

    /// Closes the running step, if any.
    pub fn finish(&mut self) {
        if let Some((step, started)) = self.current.take() {
            let elapsed = started.elapsed();
            if self.enabled {
                tracing::info!("⏱️ {} took {:.1?}", step, elapsed);
            } else {
                tracing::debug!("{} took {:.1?}", step, elapsed);
            }
            self.timings.push(StepTiming { step, elapsed });
        }
    }

    pub fn timings(&self) -> &[StepTiming] {
        &self.timings
    }

    pub fn total_elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn log_final_stats(&self) {
        if self.enabled {
            tracing::info!(
                "📊 Final Stats - {} steps, Total Time: {:.1?}",
                self.timings.len(),
                self.total_elapsed()
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for StepMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_closes_previous_step() {
        let mut monitor = StepMonitor::new(false);
        monitor.begin("resource group");
        monitor.begin("network");
        monitor.finish();

        let steps: Vec<&str> = monitor.timings().iter().map(|t| t.step.as_str()).collect();
        assert_eq!(steps, vec!["resource group", "network"]);
    }

    #[test]
    fn test_finish_without_step_is_noop() {
        let mut monitor = StepMonitor::default();
        monitor.finish();
        assert!(monitor.timings().is_empty());
        assert!(!monitor.is_enabled());
    }
}
