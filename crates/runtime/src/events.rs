//! Per-object event delivery: persistent handlers and one-shot waiters.
//!
//! Every channel owner carries one [`EventEmitter`], a registry keyed by
//! event kind. Persistent handlers are stored in an [`IndexMap`] so delivery
//! order is insertion order and removal is O(1). One-shot waiters carry an
//! optional predicate and resolve through a oneshot channel; disposing the
//! owning object drains them with [`Error::TargetClosed`], which keeps a
//! `wait_for` from ever hanging on a dead object.
//!
//! Handlers run on the dispatch task. They must not block on calls to the
//! same object, or the dispatch loop deadlocks waiting on itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Unique identifier for registered handlers and waiters.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Persistent handler: invoked with the event payload on the dispatch task.
pub type HandlerFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Waiter predicate over the event payload.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

struct WaiterEntry {
	id: HandlerId,
	predicate: Option<Predicate>,
	complete_tx: oneshot::Sender<Value>,
}

#[derive(Default)]
struct EmitterInner {
	handlers: HashMap<String, IndexMap<HandlerId, HandlerFn>>,
	waiters: HashMap<String, Vec<WaiterEntry>>,
	closed: bool,
}

/// Typed pub/sub registry for one remote object, keyed by event kind.
///
/// Supports the two consumption patterns of the protocol layer:
///
/// 1. **Persistent handlers** via [`on`](Self::on)/[`off`](Self::off),
///    delivered in insertion order for every event of their kind.
/// 2. **One-shot waiters** via [`wait_for`](Self::wait_for), resolved by
///    the first event of the kind whose predicate passes, by timeout, or by
///    disposal of the owning object (whichever comes first).
pub struct EventEmitter {
	guid: Arc<str>,
	inner: Mutex<EmitterInner>,
	// Serializes emit() per object so handler order matches arrival order
	// even if two dispatchers ever race.
	dispatch_lock: Mutex<()>,
}

impl EventEmitter {
	pub fn new(guid: Arc<str>) -> Self {
		Self {
			guid,
			inner: Mutex::new(EmitterInner::default()),
			dispatch_lock: Mutex::new(()),
		}
	}

	/// Guid of the object this emitter belongs to.
	pub fn guid(&self) -> &str {
		&self.guid
	}

	/// Registers a persistent handler for `kind`. Returns the ID used to
	/// remove it with [`off`](Self::off).
	pub fn on(&self, kind: &str, handler: impl Fn(Value) + Send + Sync + 'static) -> HandlerId {
		let id = next_handler_id();
		self.inner
			.lock()
			.handlers
			.entry(kind.to_string())
			.or_default()
			.insert(id, Arc::new(handler));
		id
	}

	/// Removes a persistent handler. Returns false if it was already gone.
	pub fn off(&self, kind: &str, id: HandlerId) -> bool {
		let mut inner = self.inner.lock();
		match inner.handlers.get_mut(kind) {
			// shift_remove keeps delivery order for the remaining handlers
			Some(map) => map.shift_remove(&id).is_some(),
			None => false,
		}
	}

	/// Delivers one event: persistent handlers of `kind` in insertion
	/// order, then the first registered waiter whose predicate passes.
	pub fn emit(&self, kind: &str, params: Value) {
		let _serialized = self.dispatch_lock.lock();

		let handlers: Vec<HandlerFn> = {
			let inner = self.inner.lock();
			inner
				.handlers
				.get(kind)
				.map(|map| map.values().cloned().collect())
				.unwrap_or_default()
		};
		// Invoked outside the registry lock so a handler may call on/off.
		for handler in handlers {
			handler(params.clone());
		}

		let satisfied = {
			let mut inner = self.inner.lock();
			match inner.waiters.get_mut(kind) {
				Some(list) => list
					.iter()
					.position(|w| w.predicate.as_ref().is_none_or(|p| p(&params)))
					.map(|pos| list.remove(pos)),
				None => None,
			}
		};
		if let Some(waiter) = satisfied {
			let _ = waiter.complete_tx.send(params);
		}
	}

	/// Waits for the next event of `kind` matching `predicate` (no
	/// predicate: the next event of the kind).
	///
	/// Resolves with the event payload, or [`Error::Timeout`] once `timeout`
	/// elapses (the waiter entry is removed, so a later event resolves
	/// nothing), or [`Error::TargetClosed`] if the object is disposed while
	/// waiting. Waiting on an already-disposed object fails immediately.
	pub async fn wait_for(
		&self,
		kind: &str,
		predicate: Option<Predicate>,
		timeout: Duration,
	) -> Result<Value> {
		let (id, complete_rx) = {
			let mut inner = self.inner.lock();
			if inner.closed {
				return Err(Error::target_closed(&self.guid));
			}
			let id = next_handler_id();
			let (complete_tx, complete_rx) = oneshot::channel();
			inner.waiters.entry(kind.to_string()).or_default().push(WaiterEntry {
				id,
				predicate,
				complete_tx,
			});
			(id, complete_rx)
		};

		let start = tokio::time::Instant::now();
		match tokio::time::timeout(timeout, complete_rx).await {
			Ok(Ok(value)) => Ok(value),
			// Sender dropped without a value: the emitter was closed.
			Ok(Err(_)) => Err(Error::target_closed(&self.guid)),
			Err(_) => {
				self.remove_waiter(kind, id);
				Err(Error::timeout(start.elapsed(), timeout))
			}
		}
	}

	fn remove_waiter(&self, kind: &str, id: HandlerId) {
		let mut inner = self.inner.lock();
		if let Some(list) = inner.waiters.get_mut(kind) {
			list.retain(|w| w.id != id);
		}
	}

	/// Closes the emitter: all pending waiters resolve with
	/// [`Error::TargetClosed`], handlers are dropped, and future `wait_for`
	/// calls fail immediately. Called when the owning object is disposed.
	pub fn close(&self) {
		let drained = {
			let mut inner = self.inner.lock();
			if inner.closed {
				return;
			}
			inner.closed = true;
			inner.handlers.clear();
			std::mem::take(&mut inner.waiters)
		};
		// Dropping the senders resolves every waiter with TargetClosed.
		drop(drained);
	}

	/// Number of persistent handlers for `kind`.
	pub fn handler_count(&self, kind: &str) -> usize {
		self.inner.lock().handlers.get(kind).map_or(0, IndexMap::len)
	}

	/// Number of pending waiters for `kind`.
	pub fn waiter_count(&self, kind: &str) -> usize {
		self.inner.lock().waiters.get(kind).map_or(0, Vec::len)
	}
}

/// RAII handle that removes a persistent handler on drop.
///
/// Holds a weak reference to the emitter, so dropping a subscription after
/// its object was disposed is a no-op.
pub struct Subscription {
	kind: String,
	id: HandlerId,
	emitter: Weak<EventEmitter>,
	active: bool,
}

impl Subscription {
	pub fn new(emitter: &Arc<EventEmitter>, kind: impl Into<String>, id: HandlerId) -> Self {
		Self {
			kind: kind.into(),
			id,
			emitter: Arc::downgrade(emitter),
			active: true,
		}
	}

	/// Returns this subscription's handler ID.
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.remove();
	}

	fn remove(&mut self) {
		if !self.active {
			return;
		}
		self.active = false;
		if let Some(emitter) = self.emitter.upgrade() {
			emitter.off(&self.kind, self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.remove();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("kind", &self.kind)
			.field("id", &self.id)
			.field("active", &self.active)
			.finish()
	}
}
