// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::time::{Duration, Instant};

use crate::transport::bosh::Body;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RequestKind {
    /// The session creation request.
    Connect,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RequestState {
    Unsent,
    InFlight,
    /// Completed with a status that calls for a retry.
    Failed(u16),
}

#[derive(Debug, Clone)]
pub(super) struct BoshRequest {
    pub id: u64,
    pub body: Body,
    pub kind: RequestKind,
    pub state: RequestState,
    pub sends: u32,
    /// When the request was (or will be, after backoff) put on the wire.
    pub date: Option<Instant>,
    /// When the request was first considered stuck.
    pub dead: Option<Instant>,
}

impl BoshRequest {
    pub fn new(id: u64, body: Body, kind: RequestKind) -> Self {
        BoshRequest {
            id,
            body,
            kind,
            state: RequestState::Unsent,
            sends: 0,
            date: None,
            dead: None,
        }
    }

    /// A fresh request carrying the same payload under a new request id and rid. The number of
    /// sends is preserved so that backoff and the retry limit keep counting.
    pub fn reissue(&self, id: u64, rid: u32) -> Self {
        let mut body = self.body.clone();
        body.set_rid(rid);

        BoshRequest {
            id,
            body,
            kind: self.kind,
            state: RequestState::Unsent,
            sends: self.sends,
            date: None,
            dead: None,
        }
    }

    pub fn rid(&self) -> u32 {
        self.body.rid().unwrap_or_default()
    }

    /// Time since the request was sent. Zero for requests that haven't been sent yet or whose
    /// send is still delayed.
    pub fn age(&self, now: Instant) -> Duration {
        self.date
            .map(|date| now.saturating_duration_since(date))
            .unwrap_or_default()
    }

    pub fn time_dead(&self, now: Instant) -> Option<Duration> {
        self.dead.map(|dead| now.saturating_duration_since(dead))
    }
}
