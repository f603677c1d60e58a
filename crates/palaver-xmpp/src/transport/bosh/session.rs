// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jid::{FullJid, Jid};
use minidom::Element;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::deps::KeyValueStore;
use crate::ns;
use crate::transport::bosh::request::{BoshRequest, RequestKind, RequestState};
use crate::transport::bosh::{BoshConfig, Body};
use crate::transport::{TransportError, TransportEvent, TransportStatus};
use crate::util::bare_jid_string;

pub const SESSION_STORAGE_KEY: &str = "palaver-bosh-session";

/// The part of a BOSH session that survives a restart of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub jid: String,
    pub rid: u32,
    pub sid: String,
}

/// What the driver needs to do on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum BoshAction {
    /// POST `body` after `delay` and report the outcome via `BoshSession::on_response`.
    Post {
        request_id: u64,
        body: String,
        delay: Duration,
    },
    /// Cancel an in-flight POST. Its outcome must not be reported anymore.
    Abort { request_id: u64 },
}

#[derive(Debug, Default, PartialEq)]
pub struct BoshStep {
    pub actions: Vec<BoshAction>,
    pub events: Vec<TransportEvent>,
}

enum Queued {
    Stanza(Element),
    Restart,
}

/// The BOSH protocol state without any I/O.
///
/// Time is passed in explicitly so that retries, dead-request detection and backoff can be
/// advanced deterministically. Every call returns the HTTP work to perform and the events to
/// surface.
pub struct BoshSession {
    config: BoshConfig,
    domain: Option<String>,
    rid: u32,
    sid: Option<String>,
    wait: u64,
    hold: u32,
    window: u32,
    inactivity: Option<u64>,
    requests: Vec<BoshRequest>,
    queue: Vec<Queued>,
    errors: u32,
    next_request_id: u64,
    connected: bool,
    disconnecting: bool,
    authenticated_as: Option<FullJid>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl BoshSession {
    pub fn new(config: BoshConfig) -> Self {
        Self::with_rid(config, rand::random::<u32>())
    }

    /// Creates a session whose first request uses `rid`.
    pub fn with_rid(config: BoshConfig, rid: u32) -> Self {
        BoshSession {
            wait: config.wait,
            hold: config.hold,
            window: config.window,
            config,
            domain: None,
            rid,
            sid: None,
            inactivity: None,
            requests: vec![],
            queue: vec![],
            errors: 0,
            next_request_id: 0,
            connected: false,
            disconnecting: false,
            authenticated_as: None,
            store: None,
        }
    }

    /// Persists `{jid, rid, sid}` into `store` whenever a body is built while authenticated.
    pub fn set_session_store(&mut self, store: Arc<dyn KeyValueStore>) {
        self.store = Some(store)
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn rid(&self) -> u32 {
        self.rid
    }

    pub fn wait(&self) -> u64 {
        self.wait
    }

    pub fn hold(&self) -> u32 {
        self.hold
    }

    pub fn inactivity(&self) -> Option<u64> {
        self.inactivity
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn status(&self) -> TransportStatus {
        match (self.connected, self.disconnecting, self.requests.is_empty()) {
            (_, true, _) => TransportStatus::Disconnecting,
            (true, _, _) => TransportStatus::Connected,
            (false, _, false) => TransportStatus::Connecting,
            (false, _, true) => TransportStatus::Disconnected,
        }
    }

    pub fn set_authenticated(&mut self, jid: Option<FullJid>) {
        self.authenticated_as = jid;
    }

    /// Starts a new session with the connection manager.
    pub fn connect(&mut self, domain: &str, now: Instant) -> BoshStep {
        let mut step = BoshStep::default();

        self.domain = Some(domain.to_string());
        self.disconnecting = false;

        let body = self
            .build_body()
            .attr("to", domain)
            .attr("xml:lang", "en")
            .attr("wait", self.config.wait.to_string())
            .attr("hold", self.config.hold.to_string())
            .attr("content", self.config.content_type.clone())
            .attr("ver", "1.6")
            .attr("xmpp:version", "1.0")
            .attr("xmlns:xmpp", ns::BOSH);

        self.push_request(body, RequestKind::Connect);
        self.throttled_request_handler(now, &mut step);
        step
    }

    /// Reattaches to a stored session. Succeeds if the stored bare JID equals the bare form of
    /// `jid`, or if `jid` is a bare domain equal to the stored session's domain.
    pub fn restore(&mut self, jid: &Jid) -> Result<FullJid, TransportError> {
        let stored = self
            .store
            .as_ref()
            .and_then(|store| store.get(SESSION_STORAGE_KEY))
            .and_then(|json| serde_json::from_str::<StoredSession>(&json).ok())
            .ok_or(TransportError::NoSession)?;

        let stored_jid = FullJid::from_str(&stored.jid).map_err(|_| TransportError::NoSession)?;
        let requested = jid.to_string();

        let matches_bare = bare_jid_string(&stored.jid) == bare_jid_string(&requested);
        let matches_domain =
            jid.node().is_none() && stored_jid.domain().as_str() == requested.as_str();

        if !matches_bare && !matches_domain {
            return Err(TransportError::NoSession);
        }

        self.domain = Some(stored_jid.domain().to_string());
        self.sid = Some(stored.sid);
        self.rid = stored.rid;
        self.connected = true;
        self.disconnecting = false;
        self.authenticated_as = Some(stored_jid.clone());

        Ok(stored_jid)
    }

    pub fn send(&mut self, stanza: Element, now: Instant) -> BoshStep {
        self.queue.push(Queued::Stanza(stanza));
        let mut step = BoshStep::default();
        self.flush(now, &mut step);
        step
    }

    /// Asks the connection manager to restart the XML stream.
    pub fn restart(&mut self, now: Instant) -> BoshStep {
        self.queue.push(Queued::Restart);
        let mut step = BoshStep::default();
        self.flush(now, &mut step);
        step
    }

    /// Terminates the session, sending `presence` along with the terminate body.
    pub fn disconnect(&mut self, presence: Option<Element>, now: Instant) -> BoshStep {
        let mut step = BoshStep::default();

        if !self.connected {
            warn!("Disconnect was called before the BOSH session was established");
            self.abort_all_requests(&mut step);
            self.reset();
            step.events.push(TransportEvent::Closed { error: None });
            return step;
        }

        debug!("Sending terminate");
        self.disconnecting = true;

        let mut body = self.build_body().attr("type", "terminate");
        if let Some(presence) = presence {
            body.push(presence);
        }
        self.push_request(body, RequestKind::Data);
        self.throttled_request_handler(now, &mut step);
        step
    }

    /// Drops all requests and forgets the session, starting over with a fresh rid.
    pub fn reset(&mut self) {
        self.rid = rand::random::<u32>();
        self.sid = None;
        self.errors = 0;
        self.requests.clear();
        self.queue.clear();
        self.connected = false;
        self.disconnecting = false;
        self.authenticated_as = None;
    }

    pub fn clear_stored_session(&self) {
        if let Some(store) = &self.store {
            store.remove(SESSION_STORAGE_KEY)
        }
    }

    /// Aborts all in-flight requests.
    pub fn abort_all_requests(&mut self, step: &mut BoshStep) {
        for request in self.requests.drain(..) {
            if request.state == RequestState::InFlight {
                step.actions.push(BoshAction::Abort {
                    request_id: request.id,
                });
            }
        }
    }

    /// The 100 ms idle cycle. Sends an empty poll if the session is otherwise quiet, flushes
    /// queued stanzas and restarts requests that timed out.
    pub fn tick(&mut self, now: Instant) -> BoshStep {
        let mut step = BoshStep::default();

        if self.authenticated_as.is_some()
            && self.requests.is_empty()
            && self.queue.is_empty()
            && !self.disconnecting
        {
            debug!("No requests during idle cycle, sending blank request");
            let body = self.build_body();
            self.push_request(body, RequestKind::Data);
            self.throttled_request_handler(now, &mut step);
        } else {
            self.flush(now, &mut step);
        }

        if let Some(request) = self.requests.first() {
            let secondary_timeout = self.secondary_timeout();
            let primary_timeout = self.primary_timeout();

            if request
                .time_dead(now)
                .map_or(false, |time_dead| time_dead > secondary_timeout)
            {
                self.throttled_request_handler(now, &mut step);
            }

            if let Some(request) = self.requests.first().filter(|r| r.age(now) > primary_timeout) {
                warn!(
                    "Request {} timed out, over {} seconds since last activity",
                    request.id,
                    primary_timeout.as_secs()
                );
                self.throttled_request_handler(now, &mut step);
            }
        }

        step
    }

    /// Reports the outcome of a POST. `status` is 0 if the request failed on the network level.
    pub fn on_response(
        &mut self,
        request_id: u64,
        status: u16,
        body: &str,
        now: Instant,
    ) -> BoshStep {
        let mut step = BoshStep::default();

        let Some(index) = self.requests.iter().position(|r| r.id == request_id) else {
            debug!("Ignoring response to aborted request {}", request_id);
            return step;
        };

        debug!(
            "Request id {}.{} state changed to {}",
            request_id, self.requests[index].sends, status
        );

        if self.disconnecting && status >= 400 {
            self.requests.remove(index);
            self.hit_error(status, &mut step);
            return step;
        }

        let is_first = index == 0;
        let is_second = index == 1;
        let valid_request = status > 0 && status < 500;
        let too_many_retries = self.requests[index].sends > self.config.max_retries;

        let request = if valid_request || too_many_retries {
            debug!("Request id {} should now be removed", request_id);
            Some(self.requests.remove(index))
        } else {
            self.requests[index].state = RequestState::Failed(status);
            None
        };

        if status == 200 {
            // If the second request finished, or the first one finished and the second is
            // overdue, the remaining request needs to be restarted.
            if is_second
                || (is_first
                    && self
                        .requests
                        .first()
                        .map_or(false, |r| r.age(now) > self.secondary_timeout()))
            {
                self.restart_request(0, now, &mut step);
            }

            if let Some(request) = request {
                debug!("Request id {}.{} got 200", request.id, request.sends);
                self.handle_body(request.kind, body, now, &mut step);
            }
            self.errors = 0;
        } else if status == 0 || (400..600).contains(&status) {
            error!(
                "Request id {} error {} happened",
                request_id, status
            );
            self.hit_error(status, &mut step);

            if (400..500).contains(&status) {
                self.abort_all_requests(&mut step);
                self.reset();
                step.events.push(TransportEvent::Closed {
                    error: Some(TransportError::Http { status }),
                });
                return step;
            }
        } else {
            error!("Request id {} error {} happened", request_id, status);
        }

        if !valid_request && !too_many_retries {
            self.throttled_request_handler(now, &mut step);
        } else if too_many_retries && !self.connected {
            self.abort_all_requests(&mut step);
            self.reset();
            step.events.push(TransportEvent::Failed {
                condition: "giving-up".to_string(),
            });
        }

        step
    }

    fn handle_body(&mut self, kind: RequestKind, body: &str, now: Instant, step: &mut BoshStep) {
        let body = match Element::from_str(body) {
            Ok(body) => body,
            Err(err) => {
                error!("Failed to parse BOSH body. {}", err);
                self.abort_all_requests(step);
                self.reset();
                step.events.push(TransportEvent::Closed {
                    error: Some(err.into()),
                });
                return;
            }
        };

        if kind == RequestKind::Connect {
            if !self.connect_cb(&body, step) {
                return;
            }
        } else {
            if self.disconnecting && self.queue.is_empty() && self.requests.is_empty() {
                self.reset();
                step.events.push(TransportEvent::Closed { error: None });
                return;
            }

            if body.attr("type") == Some("terminate") {
                if self.disconnecting {
                    return;
                }
                self.fail_with_terminate(&body, step);
                return;
            }
        }

        for child in body.children() {
            step.events.push(TransportEvent::Element(child.clone()));
        }

        self.flush(now, step);
    }

    /// Handles the session creation response. Returns false if the session was refused.
    fn connect_cb(&mut self, body: &Element, step: &mut BoshStep) -> bool {
        if body.attr("type") == Some("terminate") {
            self.fail_with_terminate(body, step);
            return false;
        }

        if self.sid.is_none() {
            self.sid = body.attr("sid").map(ToString::to_string);
        }
        if let Some(window) = body.attr("requests").and_then(|r| r.parse().ok()) {
            self.window = window;
        }
        if let Some(hold) = body.attr("hold").and_then(|h| h.parse().ok()) {
            self.hold = hold;
        }
        if let Some(wait) = body.attr("wait").and_then(|w| w.parse().ok()) {
            self.wait = wait;
        }
        if let Some(inactivity) = body.attr("inactivity").and_then(|i| i.parse().ok()) {
            self.inactivity = Some(inactivity);
        }

        self.connected = true;
        true
    }

    fn fail_with_terminate(&mut self, body: &Element, step: &mut BoshStep) {
        let condition = body.attr("condition").map(ToString::to_string);
        error!(
            "BOSH-Connection failed: {}",
            condition.as_deref().unwrap_or("unknown")
        );

        let condition = match condition {
            Some(condition) if condition == "remote-stream-error" && has_descendant(body, "conflict") => {
                "conflict".to_string()
            }
            Some(condition) => condition,
            None => "unknown".to_string(),
        };

        self.abort_all_requests(step);
        self.reset();
        step.events.push(TransportEvent::Failed { condition });
    }

    /// Moves queued data into a new request if fewer than two requests are outstanding.
    fn flush(&mut self, now: Instant, step: &mut BoshStep) {
        if self.sid.is_none() || self.queue.is_empty() || self.requests.len() >= 2 {
            return;
        }

        let mut body = self.build_body();
        for data in self.queue.drain(..) {
            match data {
                Queued::Stanza(stanza) => body.push(stanza),
                Queued::Restart => {
                    let domain = self.domain.clone().unwrap_or_default();
                    body.set_attr("to", domain);
                    body.set_attr("xml:lang", "en");
                    body.set_attr("xmpp:restart", "true");
                    body.set_attr("xmlns:xmpp", ns::BOSH);
                }
            }
        }

        self.push_request(body, RequestKind::Data);
        self.throttled_request_handler(now, step);
    }

    fn build_body(&mut self) -> Body {
        let body = Body::new(self.rid, self.sid.as_deref());
        self.rid = self.rid.wrapping_add(1);
        self.cache_session();
        body
    }

    fn cache_session(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let (Some(jid), Some(sid)) = (&self.authenticated_as, &self.sid) else {
            store.remove(SESSION_STORAGE_KEY);
            return;
        };

        let session = StoredSession {
            jid: jid.to_string(),
            rid: self.rid,
            sid: sid.clone(),
        };
        match serde_json::to_string(&session) {
            Ok(json) => store.set(SESSION_STORAGE_KEY, json),
            Err(err) => error!("Failed to persist BOSH session. {}", err),
        }
    }

    fn push_request(&mut self, body: Body, kind: RequestKind) {
        let id = self.next_request_id();
        self.requests.push(BoshRequest::new(id, body, kind));
    }

    fn throttled_request_handler(&mut self, now: Instant, step: &mut BoshStep) {
        debug!(
            "Throttled request handler called with {} requests",
            self.requests.len()
        );

        if self.requests.is_empty() {
            return;
        }

        self.process_request(0, now, step);

        if self.requests.len() > 1 {
            let gap = self.requests[0].rid().abs_diff(self.requests[1].rid());
            if gap < self.window {
                self.process_request(1, now, step);
            }
        }
    }

    fn restart_request(&mut self, index: usize, now: Instant, step: &mut BoshStep) {
        if let Some(request) = self.requests.get_mut(index) {
            if request.dead.is_none() {
                request.dead = Some(now);
            }
        }
        self.process_request(index, now, step);
    }

    fn process_request(&mut self, index: usize, now: Instant, step: &mut BoshStep) {
        let Some(request) = self.requests.get(index) else {
            return;
        };

        if request.sends > self.config.max_retries {
            self.on_disconnect_timeout(step);
            return;
        }

        let primary_timeout = request.age(now) > self.primary_timeout();
        let secondary_timeout = request
            .time_dead(now)
            .map_or(false, |time_dead| time_dead > self.secondary_timeout());
        let server_error =
            matches!(request.state, RequestState::Failed(status) if status < 1 || status >= 500);

        if primary_timeout || secondary_timeout || server_error {
            if secondary_timeout {
                error!("Request {} timed out (secondary), restarting", request.id);
            }
            if request.state == RequestState::InFlight {
                step.actions.push(BoshAction::Abort {
                    request_id: request.id,
                });
            }

            let id = self.next_request_id();
            let rid = self.rid;
            self.rid = self.rid.wrapping_add(1);
            let reissued = self.requests[index].reissue(id, rid);
            self.requests[index] = reissued;
        }

        let primary_timeout_secs = self.primary_timeout().as_secs();
        let request = &mut self.requests[index];

        if request.state != RequestState::Unsent {
            debug!(
                "Request {} ({} request) is still pending",
                request.id,
                if index == 0 { "first" } else { "second" }
            );
            return;
        }

        debug!("Request id {}.{} posting", request.id, request.sends);

        // The first retry goes out immediately, subsequent ones back off on a cubic curve.
        let delay = if request.sends > 1 {
            Duration::from_secs(primary_timeout_secs.min(u64::from(request.sends).pow(3)))
        } else {
            Duration::ZERO
        };

        request.date = Some(now + delay);
        request.state = RequestState::InFlight;
        request.sends += 1;

        step.actions.push(BoshAction::Post {
            request_id: request.id,
            body: request.body.to_string(),
            delay,
        });
    }

    fn hit_error(&mut self, status: u16, step: &mut BoshStep) {
        self.errors += 1;
        warn!(
            "Request errored, status: {}, number of errors: {}",
            status, self.errors
        );
        if self.errors > 4 {
            self.on_disconnect_timeout(step);
        }
    }

    fn on_disconnect_timeout(&mut self, step: &mut BoshStep) {
        self.abort_all_requests(step);
        self.reset();
        step.events.push(TransportEvent::Closed {
            error: Some(TransportError::RetriesExhausted),
        });
    }

    /// `floor(1.1 * wait)`
    fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.wait * 11 / 10)
    }

    /// `floor(0.1 * wait)`
    fn secondary_timeout(&self) -> Duration {
        Duration::from_secs(self.wait / 10)
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }
}

fn has_descendant(elem: &Element, name: &str) -> bool {
    elem.children()
        .any(|child| child.name() == name || has_descendant(child, name))
}
