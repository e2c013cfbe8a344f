//! ChannelOwner - base for all remote-object proxies.
//!
//! Every object the driver announces (Browser, Page, Frame, ...) is
//! represented locally by a proxy implementing [`ChannelOwner`]:
//! - bound 1:1 to a driver-side guid,
//! - linked into an exclusive ownership tree (one parent, owned children),
//! - carrying the last initializer snapshot the driver sent,
//! - exposing a [`Channel`] for calls and an [`EventEmitter`] for events.
//!
//! The parent chain from any owner to the root is unique, so disposal is a
//! cycle-free subtree walk: children first (post-order), then the object
//! unlinks itself, fails its pending calls, and closes its emitter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::Channel;
use crate::connection::ConnectionLike;
use crate::events::EventEmitter;

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `ChannelOwner`.
	pub trait Sealed {}
}

type ChildrenRegistry = HashMap<Arc<str>, Arc<dyn ChannelOwner>>;

/// Why an object was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// The driver closed the object, or the connection was torn down.
	Closed,
	/// The driver garbage-collected the object.
	GarbageCollected,
}

/// Parent of a new object: another owner, or the connection for the root.
pub enum ParentOrConnection {
	Parent(Arc<dyn ChannelOwner>),
	Connection(Arc<dyn ConnectionLike>),
}

/// Base trait for all remote-object proxies.
///
/// Sealed: implemented only via [`ChannelOwnerImpl`] and the
/// [`impl_channel_owner!`](crate::impl_channel_owner) macro.
pub trait ChannelOwner: private::Sealed + DowncastSync {
	/// Guid identifying this object for the lifetime of the connection.
	fn guid(&self) -> &str;

	/// Protocol type name (e.g. "Browser", "Page").
	fn type_name(&self) -> &str;

	/// Parent in the ownership tree, if still alive.
	fn parent(&self) -> Option<Arc<dyn ChannelOwner>>;

	/// Connection this object belongs to.
	fn connection(&self) -> Arc<dyn ConnectionLike>;

	/// Last known server-side state snapshot.
	fn initializer(&self) -> &Value;

	/// Channel for calls addressed to this object.
	fn channel(&self) -> &Channel;

	/// Event registry for this object.
	fn events(&self) -> &Arc<EventEmitter>;

	/// Disposes this object and its whole subtree.
	fn dispose(&self, reason: DisposeReason);

	/// Moves a child from its old parent under this object.
	fn adopt(&self, child: Arc<dyn ChannelOwner>);

	/// Adds a child to this object's registry.
	fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>);

	/// Removes a child from this object's registry.
	fn remove_child(&self, guid: &str);

	/// Handles a protocol event addressed to this object.
	fn on_event(&self, method: &str, params: Value);

	/// True if the driver garbage-collected this object.
	fn was_collected(&self) -> bool;
}

impl_downcast!(sync ChannelOwner);

impl std::fmt::Debug for dyn ChannelOwner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelOwner")
			.field("guid", &self.guid())
			.field("type_name", &self.type_name())
			.finish_non_exhaustive()
	}
}

/// Embeddable base implementation of [`ChannelOwner`] state.
///
/// Concrete proxies hold this as a `base` field and delegate the trait via
/// [`impl_channel_owner!`](crate::impl_channel_owner).
pub struct ChannelOwnerImpl {
	guid: Arc<str>,
	type_name: String,
	parent: Option<Weak<dyn ChannelOwner>>,
	connection: Arc<dyn ConnectionLike>,
	children: Arc<Mutex<ChildrenRegistry>>,
	channel: Channel,
	events: Arc<EventEmitter>,
	initializer: Value,
	disposed: Arc<AtomicBool>,
	was_collected: Arc<AtomicBool>,
}

impl Clone for ChannelOwnerImpl {
	fn clone(&self) -> Self {
		Self {
			guid: self.guid.clone(),
			type_name: self.type_name.clone(),
			parent: self.parent.clone(),
			connection: Arc::clone(&self.connection),
			children: Arc::clone(&self.children),
			channel: self.channel.clone(),
			events: Arc::clone(&self.events),
			initializer: self.initializer.clone(),
			disposed: Arc::clone(&self.disposed),
			was_collected: Arc::clone(&self.was_collected),
		}
	}
}

impl ChannelOwnerImpl {
	pub fn new(
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		let (connection, parent_opt) = match parent {
			ParentOrConnection::Parent(p) => {
				let conn = p.connection();
				(conn, Some(Arc::downgrade(&p)))
			}
			ParentOrConnection::Connection(c) => (c, None),
		};

		let channel = Channel::new(Arc::clone(&guid), Arc::clone(&connection));
		let events = Arc::new(EventEmitter::new(Arc::clone(&guid)));

		Self {
			guid,
			type_name,
			parent: parent_opt,
			connection,
			children: Arc::new(Mutex::new(HashMap::new())),
			channel,
			events,
			initializer,
			disposed: Arc::new(AtomicBool::new(false)),
			was_collected: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.parent.as_ref().and_then(Weak::upgrade)
	}

	pub fn connection(&self) -> Arc<dyn ConnectionLike> {
		Arc::clone(&self.connection)
	}

	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	pub fn events(&self) -> &Arc<EventEmitter> {
		&self.events
	}

	/// Disposes the subtree rooted at this object.
	///
	/// Post-order: children go first, then this object unlinks from its
	/// parent, leaves the registry, fails its in-flight calls with
	/// `TargetClosed`, and closes its emitter so event waiters resolve
	/// instead of hanging. Idempotent.
	pub fn dispose(&self, reason: DisposeReason) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		if reason == DisposeReason::GarbageCollected {
			self.was_collected.store(true, Ordering::SeqCst);
		}
		tracing::debug!(guid = %self.guid, ty = %self.type_name, ?reason, "disposing object");

		let children: Vec<Arc<dyn ChannelOwner>> = {
			let mut guard = self.children.lock();
			guard.drain().map(|(_, child)| child).collect()
		};
		for child in children {
			child.dispose(reason);
		}

		if let Some(parent) = self.parent() {
			parent.remove_child(&self.guid);
		}
		self.connection.unregister_object(&self.guid);
		self.connection.fail_calls_for(&self.guid);
		self.events.close();
	}

	pub fn adopt(&self, child: Arc<dyn ChannelOwner>) {
		if let Some(old_parent) = child.parent() {
			old_parent.remove_child(child.guid());
		}
		self.add_child(Arc::from(child.guid()), child);
	}

	pub fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
		self.children.lock().insert(guid, child);
	}

	pub fn remove_child(&self, guid: &str) {
		self.children.lock().remove(guid);
	}

	/// All live children of this object.
	pub fn children(&self) -> Vec<Arc<dyn ChannelOwner>> {
		self.children.lock().values().cloned().collect()
	}

	/// Default event handling: route into the emitter.
	pub fn on_event(&self, method: &str, params: Value) {
		tracing::trace!(guid = %self.guid, method, "event");
		self.events.emit(method, params);
	}

	pub fn was_collected(&self) -> bool {
		self.was_collected.load(Ordering::SeqCst)
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}
}

/// Generates the [`ChannelOwner`] delegation impl for a proxy struct with a
/// `base: ChannelOwnerImpl` field.
#[macro_export]
macro_rules! impl_channel_owner {
	($ty:ty) => {
		impl $crate::channel_owner::private::Sealed for $ty {}

		impl $crate::channel_owner::ChannelOwner for $ty {
			fn guid(&self) -> &str {
				self.base.guid()
			}

			fn type_name(&self) -> &str {
				self.base.type_name()
			}

			fn parent(&self) -> Option<std::sync::Arc<dyn $crate::channel_owner::ChannelOwner>> {
				self.base.parent()
			}

			fn connection(&self) -> std::sync::Arc<dyn $crate::connection::ConnectionLike> {
				self.base.connection()
			}

			fn initializer(&self) -> &serde_json::Value {
				self.base.initializer()
			}

			fn channel(&self) -> &$crate::channel::Channel {
				self.base.channel()
			}

			fn events(&self) -> &std::sync::Arc<$crate::events::EventEmitter> {
				self.base.events()
			}

			fn dispose(&self, reason: $crate::channel_owner::DisposeReason) {
				self.base.dispose(reason)
			}

			fn adopt(&self, child: std::sync::Arc<dyn $crate::channel_owner::ChannelOwner>) {
				self.base.adopt(child)
			}

			fn add_child(
				&self,
				guid: std::sync::Arc<str>,
				child: std::sync::Arc<dyn $crate::channel_owner::ChannelOwner>,
			) {
				self.base.add_child(guid, child)
			}

			fn remove_child(&self, guid: &str) {
				self.base.remove_child(guid)
			}

			fn on_event(&self, method: &str, params: serde_json::Value) {
				self.base.on_event(method, params)
			}

			fn was_collected(&self) -> bool {
				self.base.was_collected()
			}
		}
	};
}

/// Minimal concrete owner with no behavior of its own.
///
/// Used as the registry fallback when the driver announces an object type
/// this client does not know, and as a stand-in object in tests. Events
/// still flow to its emitter and it participates in the ownership tree, so
/// cascading disposal stays correct.
#[derive(Clone)]
pub struct BareObject {
	base: ChannelOwnerImpl,
}

impl BareObject {
	pub fn new(
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self {
			base: ChannelOwnerImpl::new(parent, type_name, guid, initializer),
		}
	}

	pub fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

crate::impl_channel_owner!(BareObject);

impl std::fmt::Debug for BareObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BareObject")
			.field("type", &self.base.type_name())
			.field("guid", &self.base.guid())
			.finish()
	}
}
