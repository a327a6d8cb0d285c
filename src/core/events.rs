use crate::ledger::LedgerLeg;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Ledger legs that belong to one economic action, e.g. both sides of a
/// trade logged a few hundred milliseconds apart.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// Window-rounded time shared by every leg
    pub time: DateTime<Utc>,
    pub legs: &'a [LedgerLeg],
}

impl<'a> Event<'a> {
    pub fn date(&self) -> NaiveDate {
        self.time.date_naive()
    }

    pub fn inflows(&self) -> impl Iterator<Item = &'a LedgerLeg> {
        self.legs.iter().filter(|leg| leg.is_inflow())
    }

    pub fn outflows(&self) -> impl Iterator<Item = &'a LedgerLeg> {
        self.legs.iter().filter(|leg| leg.is_outflow())
    }

    pub fn fiat_inflows(&self, fiat: &BTreeSet<String>) -> Vec<&'a LedgerLeg> {
        self.inflows()
            .filter(|leg| fiat.contains(&leg.asset))
            .collect()
    }
}

/// Time-ordered ledger partitioned into [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventGrouper {
    legs: Vec<LedgerLeg>,
    window_ms: i64,
}

impl EventGrouper {
    /// Stable-sorts `legs` by timestamp, so simultaneous rows keep ledger order.
    pub fn new(mut legs: Vec<LedgerLeg>, window: Duration) -> Self {
        legs.sort_by_key(|leg| leg.timestamp);
        EventGrouper {
            legs,
            window_ms: window.num_milliseconds().max(1),
        }
    }

    /// Timestamp rounded to the nearest window multiple since the epoch;
    /// exact ties go to the even multiple.
    pub fn window_key(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let ms = timestamp.timestamp_millis();
        let w = self.window_ms;
        let mut q = ms.div_euclid(w);
        let twice_rem = 2 * ms.rem_euclid(w);
        if twice_rem > w || (twice_rem == w && q.rem_euclid(2) == 1) {
            q += 1;
        }
        DateTime::from_timestamp_millis(q * w).unwrap_or(timestamp)
    }

    /// Events in chronological order. Each call starts from the beginning.
    pub fn events(&self) -> impl Iterator<Item = Event<'_>> {
        self.legs
            .chunk_by(move |a, b| self.window_key(a.timestamp) == self.window_key(b.timestamp))
            .filter_map(move |legs| {
                legs.first().map(|first| Event {
                    time: self.window_key(first.timestamp),
                    legs,
                })
            })
    }

    pub fn legs(&self) -> &[LedgerLeg] {
        &self.legs
    }
}
