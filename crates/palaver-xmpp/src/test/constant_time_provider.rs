// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;

use crate::TimeProvider;

pub struct ConstantTimeProvider {
    time: RwLock<DateTime<Utc>>,
}

impl ConstantTimeProvider {
    pub fn new(time: DateTime<Utc>) -> Self {
        ConstantTimeProvider {
            time: RwLock::new(time),
        }
    }

    /// 2024-01-01T10:00:00Z
    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        Self::new(
            Utc.with_ymd_and_hms(year, month, day, 10, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.time.write() = time
    }
}

impl TimeProvider for ConstantTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read()
    }
}
