use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::cmp::Reverse;

use crate::core::error::TimeError;
use crate::models::{Matchbox, MatchingNight};

/// Broadcast time assumed when an event only has a date
pub const DEFAULT_BROADCAST_TIME: &str = "20:15";

/// An event that was aired on TV
pub trait Broadcast {
    fn broadcast_date(&self) -> Option<&str>;
    fn broadcast_time(&self) -> Option<&str>;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Broadcast for MatchingNight {
    fn broadcast_date(&self) -> Option<&str> {
        self.broadcast_date.as_deref()
    }

    fn broadcast_time(&self) -> Option<&str> {
        self.broadcast_time.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Broadcast for Matchbox {
    fn broadcast_date(&self) -> Option<&str> {
        self.broadcast_date.as_deref()
    }

    fn broadcast_time(&self) -> Option<&str> {
        self.broadcast_time.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(date: &str) -> Result<NaiveDate, TimeError> {
    let bytes = date.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(TimeError::InvalidDate(date.to_string()));
    }

    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| TimeError::InvalidDate(date.to_string()))
}

/// Parse a `HH:MM` time
pub fn parse_time(time: &str) -> Result<NaiveTime, TimeError> {
    let bytes = time.as_bytes();
    let shape_ok = bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if !shape_ok {
        return Err(TimeError::InvalidTime(time.to_string()));
    }

    let hour: u32 = time[0..2]
        .parse()
        .map_err(|_| TimeError::InvalidTime(time.to_string()))?;
    let minute: u32 = time[3..5]
        .parse()
        .map_err(|_| TimeError::InvalidTime(time.to_string()))?;

    if hour > 23 {
        return Err(TimeError::HourOutOfRange(hour));
    }
    if minute > 59 {
        return Err(TimeError::MinuteOutOfRange(minute));
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| TimeError::InvalidTime(time.to_string()))
}

/// Combine a broadcast date and time into one comparable instant
pub fn parse_broadcast(date: &str, time: &str) -> Result<NaiveDateTime, TimeError> {
    Ok(parse_date(date)?.and_time(parse_time(time)?))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolves effective broadcast instants and orders events by them
#[derive(Debug, Clone, Copy)]
pub struct BroadcastResolver {
    default_time: NaiveTime,
}

impl BroadcastResolver {
    pub fn new(default_time: &str) -> Result<Self, TimeError> {
        Ok(Self {
            default_time: parse_time(default_time)?,
        })
    }

    /// Effective instant of an event
    ///
    /// Broadcast date (plus time, or the default time) when a date is set,
    /// otherwise the creation time in UTC wall-clock.
    pub fn effective_instant<E: Broadcast>(&self, event: &E) -> Result<NaiveDateTime, TimeError> {
        match non_empty(event.broadcast_date()) {
            Some(date) => {
                let date = parse_date(date)?;
                let time = match non_empty(event.broadcast_time()) {
                    Some(time) => parse_time(time)?,
                    None => self.default_time,
                };
                Ok(date.and_time(time))
            }
            None => Ok(event.created_at().naive_utc()),
        }
    }

    /// Strictly earlier
    pub fn is_before<A: Broadcast, B: Broadcast>(&self, a: &A, b: &B) -> Result<bool, TimeError> {
        Ok(self.effective_instant(a)? < self.effective_instant(b)?)
    }

    /// Stable sort, oldest first
    pub fn sort_oldest_first<E: Broadcast + Clone>(&self, events: &[E]) -> Result<Vec<E>, TimeError> {
        let mut keyed = self.keyed(events)?;
        keyed.sort_by_key(|(instant, _)| *instant);
        Ok(keyed.into_iter().map(|(_, e)| e.clone()).collect())
    }

    /// Stable sort, newest first
    pub fn sort_newest_first<E: Broadcast + Clone>(&self, events: &[E]) -> Result<Vec<E>, TimeError> {
        let mut keyed = self.keyed(events)?;
        keyed.sort_by_key(|(instant, _)| Reverse(*instant));
        Ok(keyed.into_iter().map(|(_, e)| e.clone()).collect())
    }

    /// Matchboxes aired strictly before the given night
    pub fn valid_matchboxes_for<'a>(
        &self,
        night: &MatchingNight,
        matchboxes: &'a [Matchbox],
    ) -> Result<Vec<&'a Matchbox>, TimeError> {
        let cutoff = self.effective_instant(night)?;
        let mut valid = Vec::new();
        for matchbox in matchboxes {
            if self.effective_instant(matchbox)? < cutoff {
                valid.push(matchbox);
            }
        }
        Ok(valid)
    }

    fn keyed<'a, E: Broadcast>(&self, events: &'a [E]) -> Result<Vec<(NaiveDateTime, &'a E)>, TimeError> {
        events
            .iter()
            .map(|e| self.effective_instant(e).map(|instant| (instant, e)))
            .collect()
    }
}

impl Default for BroadcastResolver {
    fn default() -> Self {
        Self {
            default_time: NaiveTime::from_hms_opt(20, 15, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}
