//! Connection: call correlation and event dispatch for one driver session.
//!
//! The connection owns the outbound call counter, the pending-call table,
//! and the object registry. One dispatch loop drains decoded frames from
//! the transport in arrival order and routes each either to the pending
//! call with the matching id or, for `{guid, method, params}` frames, to
//! the target object's event emitter.
//!
//! # Message flow
//!
//! 1. A caller invokes `send_message` with guid, method, and params.
//! 2. The connection allocates a strictly increasing id, stores a pending
//!    call keyed by it, and queues `{id, guid, method, params, metadata}`
//!    to the writer task.
//! 3. The caller awaits its oneshot receiver, bounded by a deadline.
//! 4. The dispatch loop later resolves the pending call from the response
//!    frame, or the deadline removes the entry and fails the call.
//!
//! # Lifecycle
//!
//! `Open -> Closing -> Closed`. Once closing, new calls fail immediately
//! with `ConnectionClosed`, every in-flight call is resolved with
//! `ConnectionClosed`, and every registered object is disposed (failing
//! its event waiters with `TargetClosed`). Nothing is ever left pending:
//! a leaked pending future is a permanent task leak.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::channel_owner::{BareObject, ChannelOwner, DisposeReason, ParentOrConnection};
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

pub mod object_store;

pub use object_store::ObjectStore;

#[cfg(test)]
mod tests;

/// Default deadline for calls that do not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interface the rest of the runtime needs from a connection.
///
/// Object-safe so [`ChannelOwner`]s and wrappers can hold it without the
/// connection's concrete type.
pub trait ConnectionLike: Send + Sync {
	/// Sends a call and awaits the response, bounded by the default timeout.
	fn send_message(
		&self,
		guid: &str,
		method: &str,
		params: Value,
	) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;

	/// Sends a call with an explicit deadline.
	fn send_message_with_timeout(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		timeout: Duration,
	) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;

	/// Registers an object. Duplicate guids are a fatal protocol violation.
	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) -> Result<()>;

	/// Removes an object from the registry. Synchronous so it can be called
	/// from `dispose`.
	fn unregister_object(&self, guid: &str);

	/// Looks up an object by guid.
	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>>;

	/// Waits for an object to be registered, with a deadline.
	fn wait_for_object(
		&self,
		guid: &str,
		timeout: Duration,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>>;

	/// Resolves every pending call addressed to `guid` with `TargetClosed`.
	/// Called from `dispose`, synchronous for the same reason as
	/// `unregister_object`.
	fn fail_calls_for(&self, guid: &str);

	/// Current default call deadline.
	fn default_timeout(&self) -> Duration;

	/// Replaces the default call deadline.
	fn set_default_timeout(&self, timeout: Duration);

	/// Tears the connection down. Idempotent.
	fn close(&self);

	/// True once the connection has started closing.
	fn is_closed(&self) -> bool;
}

/// Factory for materializing remote objects from create messages.
///
/// Implemented by the API layer, which knows the concrete wrapper types;
/// keeps the runtime independent of them.
pub trait ObjectFactory: Send + Sync {
	/// Creates the wrapper for a driver-announced object.
	///
	/// Unknown `type_name`s fail with [`Error::UnknownObjectType`]; the
	/// connection degrades those to an opaque [`BareObject`].
	fn create_object(
		&self,
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>>;
}

/// Metadata attached to every outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
	/// Unix timestamp in milliseconds.
	#[serde(rename = "wallTime")]
	pub wall_time: i64,
	/// Whether this is an internal call rather than user-facing API.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
}

impl Metadata {
	pub fn now() -> Self {
		let wall_time = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.unwrap_or(0);
		Self {
			wall_time,
			internal: Some(false),
		}
	}
}

/// Serde helpers for `Arc<str>` guids.
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = serde::Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Outbound call frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub id: u32,
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	pub method: String,
	pub params: Value,
	pub metadata: Metadata,
}

/// Inbound response frame, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

/// Wrapper the driver puts around error payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Structured driver-side error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Inbound event frame, addressed to a guid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response (has an `id` field).
	Response(Response),
	/// Event (guid-addressed, no `id`).
	Event(Event),
	/// Anything else: logged and dropped for forward compatibility.
	Unknown(Value),
}

/// One outstanding call: target guid plus the single-assignment result slot.
struct PendingCall {
	guid: Arc<str>,
	tx: oneshot::Sender<Result<Value>>,
}

type CallbackMap = Arc<Mutex<HashMap<u32, PendingCall>>>;

/// Connection state: open for traffic, draining, or fully closed.
const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// RAII guard that removes a pending call if its future is dropped or
/// times out before completion, so a late response resolves nothing.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "removed abandoned pending call");
		}
	}
}

/// Response future with cancel-safe cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				// A dropped sender without a value means the connection went
				// away between insert and resolve.
				Poll::Ready(result.map_err(|_| Error::ConnectionClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// One driver session. Explicitly constructed and torn down; multiple
/// connections can coexist in a process.
pub struct Connection {
	last_id: AtomicU32,
	state: AtomicU8,
	callbacks: CallbackMap,
	outbound_tx: mpsc::UnboundedSender<Value>,
	default_timeout: Mutex<Duration>,
	objects: ObjectStore,
	factory: Mutex<Option<Arc<dyn ObjectFactory>>>,
	// Taken once by run().
	transport_sender: Mutex<Option<Box<dyn Transport>>>,
	transport_receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU32::new(0),
			state: AtomicU8::new(STATE_OPEN),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			default_timeout: Mutex::new(DEFAULT_TIMEOUT),
			objects: ObjectStore::new(),
			factory: Mutex::new(None),
			transport_sender: Mutex::new(Some(sender)),
			transport_receiver: Mutex::new(Some(receiver)),
			message_rx: Mutex::new(Some(message_rx)),
			outbound_rx: Mutex::new(Some(outbound_rx)),
		}
	}

	/// Sets the factory used to materialize created objects. Must be set
	/// before `run()` for create messages to work.
	pub fn set_factory(&self, factory: Arc<dyn ObjectFactory>) {
		*self.factory.lock() = Some(factory);
	}

	/// Replaces the default call deadline.
	pub fn set_default_timeout(&self, timeout: Duration) {
		*self.default_timeout.lock() = timeout;
	}

	/// Sends a call and awaits its response under the default deadline.
	pub async fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
		let limit = *self.default_timeout.lock();
		self.send_message_with_timeout(guid, method, params, limit).await
	}

	/// Sends a call and awaits its response under `limit`.
	///
	/// On expiry the pending entry is removed before returning
	/// [`Error::Timeout`], so a late response is dropped instead of
	/// resolving a future nobody reads.
	pub async fn send_message_with_timeout(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		limit: Duration,
	) -> Result<Value> {
		if self.state.load(Ordering::SeqCst) != STATE_OPEN {
			return Err(Error::ConnectionClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let guid: Arc<str> = Arc::from(guid);
		tracing::debug!(id, guid = %guid, method, "sending call");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, PendingCall { guid: Arc::clone(&guid), tx });
		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = Request {
			id,
			guid,
			method: method.to_string(),
			params,
			metadata: Metadata::now(),
		};
		let frame = serde_json::to_value(&request)?;

		if self.outbound_tx.send(frame).is_err() {
			// Writer gone; guard removes the entry on drop.
			return Err(Error::ConnectionClosed);
		}

		let start = tokio::time::Instant::now();
		let response = ResponseFuture { rx, guard };
		match tokio::time::timeout(limit, response).await {
			Ok(result) => result,
			Err(_) => Err(Error::timeout(start.elapsed(), limit)),
		}
	}

	/// Runs the connection: spawns the transport reader and writer tasks,
	/// then dispatches inbound frames in arrival order until the transport
	/// closes, at which point the connection tears itself down.
	///
	/// May only be called once.
	pub async fn run(self: &Arc<Self>) {
		let transport_receiver = self
			.transport_receiver
			.lock()
			.take()
			.expect("run() may only be called once: transport receiver already taken");
		let mut transport_sender = self
			.transport_sender
			.lock()
			.take()
			.expect("run() may only be called once: transport sender already taken");
		let mut outbound_rx = self
			.outbound_rx
			.lock()
			.take()
			.expect("run() may only be called once: outbound receiver already taken");
		let mut message_rx = self
			.message_rx
			.lock()
			.take()
			.expect("run() may only be called once: message receiver already taken");

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!(error = %e, "transport read loop ended");
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(frame).await {
					tracing::error!(error = %e, "transport write failed");
					break;
				}
			}
		});

		while let Some(frame) = message_rx.recv().await {
			match serde_json::from_value::<Message>(frame) {
				Ok(message) => {
					if let Err(e) = self.dispatch(message).await {
						tracing::error!(error = %e, "dispatch failed");
						if matches!(e, Error::DuplicateGuid(_)) {
							break;
						}
					}
				}
				Err(e) => {
					tracing::warn!(error = %e, "dropping unparseable frame");
				}
			}
		}

		// Transport gone or fatal violation: fail everything outstanding.
		self.close();

		let _ = reader_handle.await;
		let _ = writer_handle.await;
	}

	/// Tears the connection down: fails every pending call with
	/// [`Error::ConnectionClosed`] and disposes every registered object,
	/// which resolves its event waiters with `TargetClosed`. Idempotent.
	pub fn close(&self) {
		if self.state.swap(STATE_CLOSING, Ordering::SeqCst) != STATE_OPEN {
			return;
		}
		tracing::debug!("closing connection");

		let pending: Vec<PendingCall> = {
			let mut callbacks = self.callbacks.lock();
			callbacks.drain().map(|(_, call)| call).collect()
		};
		for call in pending {
			let _ = call.tx.send(Err(Error::ConnectionClosed));
		}

		for object in self.objects.drain() {
			object.dispose(DisposeReason::Closed);
		}

		self.state.store(STATE_CLOSED, Ordering::SeqCst);
	}

	/// Routes one inbound frame.
	pub(crate) async fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let pending = self.callbacks.lock().remove(&response.id);
				let Some(pending) = pending else {
					// Timed out or cancelled before the driver answered.
					tracing::debug!(id = response.id, "response for unknown call (dropped)");
					return Ok(());
				};
				let result = match response.error {
					Some(wrapper) => Err(driver_error(wrapper.error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = pending.tx.send(result);
				Ok(())
			}
			Message::Event(event) => match event.method.as_str() {
				"__create__" => self.handle_create(&event).await,
				"__dispose__" => self.handle_dispose(&event),
				"__adopt__" => self.handle_adopt(&event),
				_ => {
					match self.objects.try_get(&event.guid) {
						Some(object) => object.on_event(&event.method, event.params),
						None => tracing::debug!(
							guid = %event.guid,
							method = %event.method,
							"event for unknown object (dropped)"
						),
					}
					Ok(())
				}
			},
			Message::Unknown(value) => {
				tracing::debug!(
					frame = %value,
					"unknown frame shape (dropped, forward compatibility)"
				);
				Ok(())
			}
		}
	}

	/// Materializes a driver-announced object and links it under its parent.
	///
	/// Unknown object types degrade to a [`BareObject`] so the ownership
	/// tree stays intact; a duplicate guid is fatal and closes the
	/// connection.
	async fn handle_create(self: &Arc<Self>, event: &Event) -> Result<()> {
		let type_name = event.params["type"]
			.as_str()
			.ok_or_else(|| Error::Protocol("create message missing 'type'".to_string()))?
			.to_string();
		let guid: Arc<str> = Arc::from(
			event.params["guid"]
				.as_str()
				.ok_or_else(|| Error::Protocol("create message missing 'guid'".to_string()))?,
		);
		let initializer = event.params.get("initializer").cloned().unwrap_or(Value::Null);

		tracing::debug!(%type_name, guid = %guid, parent = %event.guid, "creating object");

		let parent = self.objects.get(&event.guid).map_err(|_| {
			Error::Protocol(format!("create message names unknown parent: {}", event.guid))
		})?;

		let factory = self
			.factory
			.lock()
			.clone()
			.ok_or_else(|| Error::Protocol("object factory not set before run()".to_string()))?;

		let object = match factory
			.create_object(
				ParentOrConnection::Parent(Arc::clone(&parent)),
				type_name.clone(),
				Arc::clone(&guid),
				initializer.clone(),
			)
			.await
		{
			Ok(object) => object,
			Err(Error::UnknownObjectType(ty)) => {
				tracing::warn!(%ty, guid = %guid, "unknown object type, keeping opaque");
				Arc::new(BareObject::new(
					ParentOrConnection::Parent(Arc::clone(&parent)),
					ty,
					Arc::clone(&guid),
					initializer,
				))
			}
			Err(e) => return Err(e),
		};

		if let Err(e) = self.objects.insert(Arc::clone(&guid), Arc::clone(&object)) {
			tracing::error!(guid = %guid, "duplicate guid from driver, closing connection");
			self.close();
			return Err(e);
		}
		parent.add_child(guid, object);
		Ok(())
	}

	/// Disposes an object and its subtree.
	///
	/// Frames are processed strictly in arrival order, so a response the
	/// driver sent before this dispose has already resolved its call; any
	/// call still pending against the disposed subtree fails with
	/// `TargetClosed` here rather than hanging.
	fn handle_dispose(&self, event: &Event) -> Result<()> {
		let reason = match event.params.get("reason").and_then(Value::as_str) {
			Some("gc") => DisposeReason::GarbageCollected,
			_ => DisposeReason::Closed,
		};

		match self.objects.try_get(&event.guid) {
			Some(object) => object.dispose(reason),
			None => {
				tracing::debug!(guid = %event.guid, "dispose for unknown object (dropped)");
			}
		}
		Ok(())
	}

	/// Moves a child object under a new parent.
	fn handle_adopt(&self, event: &Event) -> Result<()> {
		let child_guid = event.params["guid"]
			.as_str()
			.ok_or_else(|| Error::Protocol("adopt message missing 'guid'".to_string()))?;

		let parent = self.objects.get(&event.guid)?;
		let child = self.objects.get(child_guid)?;
		parent.adopt(child);
		Ok(())
	}

	/// Direct registry access for the API layer's bootstrap objects.
	pub fn objects(&self) -> &ObjectStore {
		&self.objects
	}
}

impl ConnectionLike for Connection {
	fn send_message(
		&self,
		guid: &str,
		method: &str,
		params: Value,
	) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
		let guid = guid.to_string();
		let method = method.to_string();
		Box::pin(async move { Connection::send_message(self, &guid, &method, params).await })
	}

	fn send_message_with_timeout(
		&self,
		guid: &str,
		method: &str,
		params: Value,
		timeout: Duration,
	) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
		let guid = guid.to_string();
		let method = method.to_string();
		Box::pin(async move {
			Connection::send_message_with_timeout(self, &guid, &method, params, timeout).await
		})
	}

	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) -> Result<()> {
		self.objects.insert(guid, object)
	}

	fn unregister_object(&self, guid: &str) {
		self.objects.remove(guid);
	}

	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.objects.get(guid)
	}

	fn wait_for_object(
		&self,
		guid: &str,
		timeout: Duration,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>> {
		let guid = guid.to_string();
		Box::pin(async move { self.objects.wait_for(&guid, timeout).await })
	}

	fn fail_calls_for(&self, guid: &str) {
		let failed: Vec<PendingCall> = {
			let mut callbacks = self.callbacks.lock();
			let ids: Vec<u32> = callbacks
				.iter()
				.filter(|(_, call)| call.guid.as_ref() == guid)
				.map(|(id, _)| *id)
				.collect();
			ids.into_iter().filter_map(|id| callbacks.remove(&id)).collect()
		};
		for call in failed {
			let _ = call.tx.send(Err(Error::target_closed(guid)));
		}
	}

	fn default_timeout(&self) -> Duration {
		*self.default_timeout.lock()
	}

	fn set_default_timeout(&self, timeout: Duration) {
		Connection::set_default_timeout(self, timeout);
	}

	fn close(&self) {
		Connection::close(self);
	}

	fn is_closed(&self) -> bool {
		self.state.load(Ordering::SeqCst) != STATE_OPEN
	}
}

/// Converts a driver error payload into [`Error::Driver`].
fn driver_error(payload: ErrorPayload) -> Error {
	Error::Driver {
		name: payload.name.unwrap_or_else(|| "Error".to_string()),
		message: payload.message,
		stack: payload.stack,
	}
}
