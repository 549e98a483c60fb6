//! Beat schedule: which tasks to enqueue, and how often
//!
//! Entries are written as `<task>@<every>` where `<every>` is a positive
//! integer followed by `ms`, `s`, `m` or `h`, e.g.
//! `maintenance.heartbeat@60s,maintenance.purge_failed@1h`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// One periodic task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub task: String,
    pub every: Duration,
}

impl ScheduleEntry {
    pub fn new(task: impl Into<String>, every: Duration) -> Self {
        Self {
            task: task.into(),
            every,
        }
    }

    /// Parse a single `<task>@<every>` entry
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();
        let invalid = |reason: &str| Error::InvalidSchedule {
            entry: input.to_string(),
            reason: reason.to_string(),
        };

        let (task, every) = input
            .rsplit_once('@')
            .ok_or_else(|| invalid("expected <task>@<interval>"))?;
        let task = task.trim();
        if task.is_empty() {
            return Err(invalid("task name is empty"));
        }

        let every = parse_interval(every.trim()).map_err(|reason| invalid(&reason))?;
        Ok(Self::new(task, every))
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.task, format_interval(self.every))
    }
}

/// Parse `90s`, `5m`, `250ms`, `1h`
fn parse_interval(s: &str) -> Result<Duration, String> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("interval '{s}' has no unit (ms, s, m, h)"))?;
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("interval '{s}' does not start with a number"))?;
    if value == 0 {
        return Err("interval must be positive".to_string());
    }

    let every = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("interval '{s}' is too large"))?,
        "h" => value
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("interval '{s}' is too large"))?,
        other => return Err(format!("unknown interval unit '{other}'")),
    };
    Ok(every)
}

fn format_interval(every: Duration) -> String {
    let millis = every.as_millis();
    if millis % 3_600_000 == 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

/// Ordered list of periodic tasks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeatSchedule {
    entries: Vec<ScheduleEntry>,
}

impl BeatSchedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for BeatSchedule {
    type Err = Error;

    /// Comma separated entries; blank segments are ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(ScheduleEntry::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }
}

impl fmt::Display for BeatSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            ScheduleEntry::parse("maintenance.heartbeat@60s").unwrap(),
            ScheduleEntry::new("maintenance.heartbeat", Duration::from_secs(60))
        );
        assert_eq!(
            ScheduleEntry::parse(" reports.digest @ 2h ").unwrap().every,
            Duration::from_secs(7200)
        );
        assert_eq!(
            ScheduleEntry::parse("tick@250ms").unwrap().every,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["heartbeat", "@5s", "heartbeat@", "heartbeat@0s", "heartbeat@5d", "heartbeat@s"] {
            assert!(ScheduleEntry::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_schedule_display() {
        let schedule: BeatSchedule = "a@60s, b@90s,,c@1500ms".parse().unwrap();
        assert_eq!(schedule.entries().len(), 3);
        assert_eq!(schedule.to_string(), "a@1m,b@90s,c@1500ms");
    }
}
