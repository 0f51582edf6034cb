use std::time::Duration;

/// Decides which completions deserve a progress line: every tenth, each new 5% band,
/// and the last one.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    total: usize,
    last_reported_band: f64,
}

const REPORT_EVERY: usize = 10;
const REPORT_BAND_PERCENT: f64 = 5.0;

impl ProgressThrottle {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            last_reported_band: 0.0,
        }
    }

    pub fn percent(&self, completed: usize) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            completed as f64 * 100.0 / self.total as f64
        }
    }

    /// Record one more completion; true when it should be reported.
    pub fn should_report(&mut self, completed: usize) -> bool {
        let percent = self.percent(completed);
        let report = completed == self.total
            || percent >= self.last_reported_band + REPORT_BAND_PERCENT
            || completed % REPORT_EVERY == 0;
        if report {
            self.last_reported_band = (percent / REPORT_BAND_PERCENT).floor() * REPORT_BAND_PERCENT;
        }
        report
    }
}

pub fn progress_message(completed: usize, total: usize, percent: f64, elapsed: Duration) -> String {
    format!(
        "Progress: {}/{} ({:.2}%) complete, elapsed {:.2}s",
        completed,
        total,
        percent,
        elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(total: usize) -> Vec<usize> {
        let mut throttle = ProgressThrottle::new(total);
        (1..=total)
            .filter(|completed| throttle.should_report(*completed))
            .collect()
    }

    #[test]
    fn small_sweeps_report_every_band() {
        // 5% of 8 tasks is less than one task, so every completion crosses a band.
        assert_eq!(reported(8), (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn large_sweeps_report_on_tens_and_bands() {
        let lines = reported(1000);
        assert_eq!(*lines.last().unwrap(), 1000);
        assert!(lines.contains(&10));
        assert!(lines.contains(&50));
        assert!(!lines.contains(&11));
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(lines.len(), 100);
    }

    #[test]
    fn final_completion_always_reports() {
        let mut throttle = ProgressThrottle::new(3);
        throttle.should_report(1);
        throttle.should_report(2);
        assert!(throttle.should_report(3));
    }

    #[test]
    fn message_carries_counts_and_percentage() {
        let message = progress_message(5, 20, 25.0, Duration::from_millis(1500));
        assert!(message.contains("5/20"));
        assert!(message.contains("25.00%"));
        assert!(message.contains("1.50s"));
    }
}
