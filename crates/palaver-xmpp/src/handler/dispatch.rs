// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use minidom::Element;
use parking_lot::Mutex;
use tracing::error;

use crate::handler::Matcher;
use crate::stanza::{DefinedCondition, ErrorType, StanzaBuilder, StanzaError};
use crate::util::PinnedFuture;

type SyncCallback = Box<dyn Fn(&Element) -> Result<bool> + Send + Sync>;
type AsyncCallback = Box<dyn Fn(Element) -> PinnedFuture<Result<bool>> + Send + Sync>;
type TimedCallback = Box<dyn Fn() -> bool + Send + Sync>;

/// System handlers run at any time. User handlers only run once the connection is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerScope {
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    Sync,
    Async,
    Timed,
}

/// Identifies a registered handler so that it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerRef {
    id: u64,
    kind: HandlerKind,
}

trait Identified {
    fn id(&self) -> u64;
    fn is_retired(&self) -> bool;
}

struct StanzaHandler<C> {
    id: u64,
    matcher: Matcher,
    scope: HandlerScope,
    callback: C,
    retired: AtomicBool,
}

impl<C> StanzaHandler<C> {
    fn accepts(&self, elem: &Element, authenticated: bool) -> bool {
        !self.is_retired()
            && (authenticated || self.scope == HandlerScope::System)
            && self.matcher.matches(elem)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst)
    }
}

impl<C> Identified for StanzaHandler<C> {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

struct TimedHandler {
    id: u64,
    period: Duration,
    scope: HandlerScope,
    last_called: Mutex<Instant>,
    callback: TimedCallback,
    retired: AtomicBool,
}

impl Identified for TimedHandler {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

/// A live list plus the additions and removals that were requested since the last pass. The live
/// list is only ever mutated in `apply_staged`, iteration always happens on a snapshot.
struct HandlerList<H> {
    live: Vec<Arc<H>>,
    staged_add: Vec<Arc<H>>,
    staged_remove: Vec<u64>,
}

impl<H> Default for HandlerList<H> {
    fn default() -> Self {
        HandlerList {
            live: vec![],
            staged_add: vec![],
            staged_remove: vec![],
        }
    }
}

impl<H: Identified> HandlerList<H> {
    fn stage_add(&mut self, handler: Arc<H>) {
        self.staged_add.push(handler)
    }

    fn stage_remove(&mut self, id: u64) {
        // A handler that is removed before it was ever live must not become live.
        self.staged_add.retain(|handler| handler.id() != id);
        self.staged_remove.push(id);
    }

    fn apply_staged(&mut self) {
        let removed = std::mem::take(&mut self.staged_remove);
        self.live
            .retain(|handler| !handler.is_retired() && !removed.contains(&handler.id()));
        self.live.append(&mut self.staged_add);
    }

    fn snapshot(&mut self) -> Vec<Arc<H>> {
        self.apply_staged();
        self.live.clone()
    }

    fn len(&mut self) -> usize {
        self.apply_staged();
        self.live.len()
    }
}

/// The result of dispatching a single stanza.
pub struct Dispatched {
    /// Whether any handler (sync or async) accepted the stanza.
    pub matched: bool,
    /// Async handlers that accepted the stanza. They must be run in order, one after the other.
    pub async_jobs: Vec<AsyncJob>,
}

/// A pending invocation of an async handler.
pub struct AsyncJob {
    handler: Arc<StanzaHandler<AsyncCallback>>,
    element: Element,
}

impl AsyncJob {
    pub async fn run(self) {
        // The handler may have been removed since the stanza was dispatched.
        if self.handler.is_retired() {
            return;
        }

        match (self.handler.callback)(self.element).await {
            Ok(true) => (),
            Ok(false) => self.handler.retire(),
            Err(err) => {
                error!("Removing async handler after error. {:?}", err);
                self.handler.retire()
            }
        }
    }
}

/// Registry of stanza and timed handlers.
///
/// Handlers returning `true` stay registered, handlers returning `false` or an error are removed.
/// Registrations and removals that happen while a stanza is being dispatched (typically from
/// within a handler) only take effect with the next pass.
#[derive(Default)]
pub struct HandlerDispatch {
    next_id: AtomicU64,
    sync_handlers: Mutex<HandlerList<StanzaHandler<SyncCallback>>>,
    async_handlers: Mutex<HandlerList<StanzaHandler<AsyncCallback>>>,
    timed_handlers: Mutex<HandlerList<TimedHandler>>,
}

impl HandlerDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler<F>(&self, matcher: Matcher, scope: HandlerScope, callback: F) -> HandlerRef
    where
        F: Fn(&Element) -> Result<bool> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.sync_handlers.lock().stage_add(Arc::new(StanzaHandler {
            id,
            matcher,
            scope,
            callback: Box::new(callback) as SyncCallback,
            retired: AtomicBool::new(false),
        }));
        HandlerRef {
            id,
            kind: HandlerKind::Sync,
        }
    }

    /// Registers a handler whose future the connection awaits before it dispatches the next
    /// stanza. It must therefore not wait for the reply to a request on the same connection.
    pub fn add_async_handler<F, Fut>(
        &self,
        matcher: Matcher,
        scope: HandlerScope,
        callback: F,
    ) -> HandlerRef
    where
        F: Fn(Element) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let id = self.next_id();
        let callback: AsyncCallback =
            Box::new(move |elem| Box::pin(callback(elem)) as PinnedFuture<_>);
        self.async_handlers.lock().stage_add(Arc::new(StanzaHandler {
            id,
            matcher,
            scope,
            callback,
            retired: AtomicBool::new(false),
        }));
        HandlerRef {
            id,
            kind: HandlerKind::Async,
        }
    }

    /// Registers a handler that fires every `period`, counted from `now`.
    pub fn add_timed_handler<F>(
        &self,
        period: Duration,
        scope: HandlerScope,
        now: Instant,
        callback: F,
    ) -> HandlerRef
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.timed_handlers.lock().stage_add(Arc::new(TimedHandler {
            id,
            period,
            scope,
            last_called: Mutex::new(now),
            callback: Box::new(callback),
            retired: AtomicBool::new(false),
        }));
        HandlerRef {
            id,
            kind: HandlerKind::Timed,
        }
    }

    pub fn remove_handler(&self, handler: &HandlerRef) {
        match handler.kind {
            HandlerKind::Sync => self.sync_handlers.lock().stage_remove(handler.id),
            HandlerKind::Async => self.async_handlers.lock().stage_remove(handler.id),
            HandlerKind::Timed => self.timed_handlers.lock().stage_remove(handler.id),
        }
    }

    /// Offers `elem` to all handlers. Sync handlers are invoked right away in registration order,
    /// async handlers are returned as jobs.
    pub fn dispatch(&self, elem: &Element, authenticated: bool) -> Dispatched {
        let mut matched = false;

        let sync_handlers = self.sync_handlers.lock().snapshot();
        for handler in sync_handlers {
            if !handler.accepts(elem, authenticated) {
                continue;
            }
            matched = true;

            match (handler.callback)(elem) {
                Ok(true) => (),
                Ok(false) => handler.retire(),
                Err(err) => {
                    error!("Removing handler after error. {:?}", err);
                    handler.retire()
                }
            }
        }

        let async_handlers = self.async_handlers.lock().snapshot();
        let async_jobs = async_handlers
            .into_iter()
            .filter(|handler| handler.accepts(elem, authenticated))
            .map(|handler| AsyncJob {
                handler,
                element: elem.clone(),
            })
            .collect::<Vec<_>>();

        Dispatched {
            matched: matched || !async_jobs.is_empty(),
            async_jobs,
        }
    }

    /// Fires all timed handlers whose period has elapsed.
    pub fn run_timed(&self, now: Instant, authenticated: bool) {
        let handlers = self.timed_handlers.lock().snapshot();

        for handler in handlers {
            if handler.is_retired() || (!authenticated && handler.scope == HandlerScope::User) {
                continue;
            }

            {
                let mut last_called = handler.last_called.lock();
                if now.saturating_duration_since(*last_called) < handler.period {
                    continue;
                }
                *last_called = now;
            }

            if !(handler.callback)() {
                handler.retired.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Removes all handlers. Pending request/response waits observe their handler being dropped.
    pub fn reset(&self) {
        *self.sync_handlers.lock() = Default::default();
        *self.async_handlers.lock() = Default::default();
        *self.timed_handlers.lock() = Default::default();
    }

    /// Number of live and staged stanza handlers.
    pub fn handler_count(&self) -> usize {
        self.sync_handlers.lock().len() + self.async_handlers.lock().len()
    }

    pub fn timed_handler_count(&self) -> usize {
        self.timed_handlers.lock().len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Builds the `service-unavailable` reply for an `iq` of type `get` or `set` that no handler
/// accepted. Returns `None` for all other stanzas.
pub fn service_unavailable_reply(stanza: &Element) -> Option<Element> {
    if stanza.name() != "iq" || !matches!(stanza.attr("type"), Some("get") | Some("set")) {
        return None;
    }

    let error = StanzaError::new(ErrorType::Cancel, DefinedCondition::ServiceUnavailable);

    Some(
        StanzaBuilder::iq("error")
            .attr("id", stanza.attr("id"))
            .attr("to", stanza.attr("from"))
            .cnode(error)
            .build(),
    )
}
