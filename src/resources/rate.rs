//! Sliding-window call budgets for external services

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Length of the rolling rate window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Calls per minute for the services agents commonly call
pub fn default_rate_limits() -> BTreeMap<String, u32> {
    [
        ("openrouter", 60),
        ("kimi_k2", 100),
        ("anthropic", 50),
        ("openai", 60),
        ("gemini", 60),
    ]
    .into_iter()
    .map(|(service, limit)| (service.to_string(), limit))
    .collect()
}

/// Call timestamps for one service, oldest first
#[derive(Debug, Default)]
pub(crate) struct RateWindow {
    calls: VecDeque<Instant>,
}

impl RateWindow {
    pub(crate) fn record(&mut self, at: Instant) {
        self.calls.push_back(at);
    }

    /// Drop calls that have left the window
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.calls.front() {
            if now.duration_since(*oldest) >= RATE_WINDOW {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Calls inside the window at `now`
    pub(crate) fn count_recent(&self, now: Instant) -> usize {
        self.calls
            .iter()
            .filter(|at| now.duration_since(**at) < RATE_WINDOW)
            .count()
    }
}

/// Budget report for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateStatus {
    pub limit: u32,
    pub remaining: u32,
    pub usage_percent: f64,
}

impl RateStatus {
    pub(crate) fn new(limit: u32, remaining: u32) -> Self {
        let usage_percent = if limit == 0 {
            100.0
        } else {
            (1.0 - remaining as f64 / limit as f64) * 100.0
        };
        Self {
            limit,
            remaining,
            usage_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_forgets_old_calls() {
        let mut window = RateWindow::default();
        window.record(Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        window.record(Instant::now());
        assert_eq!(window.count_recent(Instant::now()), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(window.count_recent(Instant::now()), 1);
        window.prune(Instant::now());
        assert_eq!(window.calls.len(), 1);
    }

    #[test]
    fn usage_percent() {
        assert_eq!(RateStatus::new(50, 50).usage_percent, 0.0);
        assert_eq!(RateStatus::new(50, 25).usage_percent, 50.0);
        assert_eq!(RateStatus::new(0, 0).usage_percent, 100.0);
    }
}
