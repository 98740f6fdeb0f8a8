use chrono::{Duration, Local, NaiveDateTime};
use std::sync::RwLock;

/// Source of wall-clock time used to name artifacts
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a settable instant, for deterministic naming in tests
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<NaiveDateTime>,
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl FixedClock {
    pub fn at(time: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.write() {
            *now += duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fixed_clock_advances() {
        let start = NaiveDate::from_ymd_opt(2023, 10, 10)
            .unwrap()
            .and_hms_opt(13, 55, 36)
            .unwrap();
        let clock = FixedClock::at(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(2));
        assert_eq!(clock.now(), start + Duration::seconds(2));
    }
}
