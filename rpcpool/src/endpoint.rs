use chrono::NaiveDate;

pub const DEFAULT_DAILY_LIMIT: u64 = 50_000;

/// Stop handing calls to an endpoint once it has burned this share of its
/// daily quota; the buffer absorbs accounting drift against the provider.
pub const QUOTA_SOFT_CAP: f64 = 0.9;

/// Hard failures before an endpoint is taken out of rotation until the next
/// daily reset.
pub const MAX_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    pub daily_limit: u64,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }
}

/// Per-upstream quota and failure state. Mutated only by the pool.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    pub daily_limit: u64,
    pub used_today: u64,
    pub reset_date: NaiveDate,
    pub enabled: bool,
    pub fail_count: u32,
}

impl Endpoint {
    pub fn new(config: EndpointConfig, today: NaiveDate) -> Self {
        Self {
            name: config.name,
            url: config.url,
            daily_limit: config.daily_limit,
            used_today: 0,
            reset_date: today,
            enabled: true,
            fail_count: 0,
        }
    }

    /// Daily reset: rehabilitates disabled endpoints and zeroes usage.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.reset_date != today {
            self.reset_date = today;
            self.used_today = 0;
            self.fail_count = 0;
            self.enabled = true;
        }
    }

    pub fn usable(&self) -> bool {
        self.enabled
            && (self.used_today as f64) < QUOTA_SOFT_CAP * self.daily_limit as f64
            && self.fail_count < MAX_FAILURES
    }

    pub fn remaining(&self) -> u64 {
        self.daily_limit.saturating_sub(self.used_today)
    }

    pub fn record_success(&mut self, cost: u64) {
        self.used_today += cost;
        self.fail_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.fail_count += 1;
        if self.fail_count >= MAX_FAILURES {
            self.enabled = false;
        }
    }
}
