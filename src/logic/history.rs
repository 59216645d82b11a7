use crate::error::CropError;
use crate::models::TimestampedReading;
use chrono::{DateTime, Duration, Utc};

/// Look-back windows offered for historical readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryWindow {
    #[default]
    LastHour,
    Last24Hours,
    Last7Days,
}

impl HistoryWindow {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryWindow::LastHour => "Last Hour",
            HistoryWindow::Last24Hours => "Last 24 Hours",
            HistoryWindow::Last7Days => "Last 7 Days",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            HistoryWindow::LastHour => Duration::hours(1),
            HistoryWindow::Last24Hours => Duration::days(1),
            HistoryWindow::Last7Days => Duration::days(7),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    /// Entries at or after the cutoff, in their original order.
    pub fn filter<'a>(
        &self,
        entries: &'a [TimestampedReading],
        now: DateTime<Utc>,
    ) -> Vec<&'a TimestampedReading> {
        let cutoff = self.cutoff(now);
        entries.iter().filter(|e| e.timestamp >= cutoff).collect()
    }
}

impl std::str::FromStr for HistoryWindow {
    type Err = CropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1h" => Ok(HistoryWindow::LastHour),
            "24h" | "1d" => Ok(HistoryWindow::Last24Hours),
            "7d" | "1w" => Ok(HistoryWindow::Last7Days),
            other => Err(CropError::InvalidInput(format!(
                "unknown history window '{}' (expected 1h, 24h or 7d)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorReading;
    use chrono::TimeZone;

    fn entry(timestamp: DateTime<Utc>) -> TimestampedReading {
        TimestampedReading {
            id: None,
            timestamp,
            reading: SensorReading {
                n: 1.0,
                p: 1.0,
                k: 1.0,
                temperature: 20.0,
                humidity: 50.0,
                soil_moisture: 40.0,
            },
        }
    }

    #[test]
    fn parses_window_names() {
        assert_eq!("1h".parse::<HistoryWindow>().unwrap(), HistoryWindow::LastHour);
        assert_eq!("24H".parse::<HistoryWindow>().unwrap(), HistoryWindow::Last24Hours);
        assert_eq!("7d".parse::<HistoryWindow>().unwrap(), HistoryWindow::Last7Days);
        assert!("3d".parse::<HistoryWindow>().is_err());
        assert_eq!(HistoryWindow::default(), HistoryWindow::LastHour);
    }

    #[test]
    fn cutoff_is_inclusive_and_order_preserved() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let entries = vec![
            entry(now - Duration::minutes(30)),
            entry(now - Duration::hours(1)),
            entry(now - Duration::minutes(61)),
            entry(now - Duration::minutes(5)),
        ];

        let kept = HistoryWindow::LastHour.filter(&entries, now);
        let stamps: Vec<_> = kept.iter().map(|e| e.timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                now - Duration::minutes(30),
                now - Duration::hours(1),
                now - Duration::minutes(5),
            ]
        );
    }

    #[test]
    fn wider_windows_keep_older_entries() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let entries = vec![entry(now - Duration::hours(20)), entry(now - Duration::days(3))];
        assert_eq!(HistoryWindow::LastHour.filter(&entries, now).len(), 0);
        assert_eq!(HistoryWindow::Last24Hours.filter(&entries, now).len(), 1);
        assert_eq!(HistoryWindow::Last7Days.filter(&entries, now).len(), 2);
    }
}
