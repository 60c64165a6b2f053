use std::time::Duration;

/// Backoff parameters for the delayed-send schedule.
///
/// Attempt 1 waits `base_delay`; attempt n > 1 waits `growth^n + offset`
/// seconds. With the defaults that yields 2.0, 4.75, 5.87, 7.56, 10.09,
/// 13.89, 19.58, 28.12, 40.94, 60.16 seconds for attempts 1-10.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub growth: f64,
    pub offset: f64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs_f64(2.0),
            growth: 1.5,
            offset: 2.5,
            max_attempts: 10,
        }
    }
}

/// Tracks the consecutive-attempt count for one batch identity at a time
/// and turns it into a delay.
///
/// Asking for a different identity resets tracking to attempt 1 for that
/// identity. Once an identity reaches `max_attempts` the count saturates:
/// further consecutive retries reuse the cap's delay rather than wrapping,
/// so sustained failure keeps maximum backoff.
pub struct RetrySchedule {
    config: RetryConfig,
    current: Option<(String, u32)>,
}

impl RetrySchedule {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    pub fn delay_for(&mut self, id: &str) -> Duration {
        let attempt = self.advance(id);
        if attempt == 1 {
            self.config.base_delay
        } else {
            Duration::from_secs_f64(self.config.growth.powi(attempt as i32) + self.config.offset)
        }
    }

    pub fn attempt(&self, id: &str) -> u32 {
        match &self.current {
            Some((current, count)) if current == id => *count,
            _ => 0,
        }
    }

    fn advance(&mut self, id: &str) -> u32 {
        match &mut self.current {
            Some((current, count)) if current == id => {
                *count = (*count + 1).min(self.config.max_attempts);
                *count
            }
            _ => {
                self.current = Some((id.to_string(), 1));
                1
            }
        }
    }
}
