// Wall-clock helpers. Block and transaction stamps come from here; consensus
// only ever compares them against each other or against a fresh reading.

use chrono::{DateTime, Utc};

pub type Timestamp = DateTime<Utc>;

#[inline]
pub fn now() -> Timestamp {
    Utc::now()
}
