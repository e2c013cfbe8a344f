//! Guid-keyed registry of live remote-object proxies.
//!
//! Single source of truth mapping guid to [`ChannelOwner`] for one
//! connection. Uses [`DashMap`] for concurrent access and a per-guid
//! [`Notify`] so [`ObjectStore::wait_for`] wakes only the waiters for the
//! guid that just registered; waiters register before checking to avoid
//! lost wakeups.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};

/// Thread-safe registry of remote objects by guid.
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Arc<dyn ChannelOwner>>,
	waiters: DashMap<Arc<str>, Arc<Notify>>,
}

impl Default for ObjectStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ObjectStore {
	pub fn new() -> Self {
		Self {
			objects: DashMap::new(),
			waiters: DashMap::new(),
		}
	}

	/// Registers an object and wakes any waiters for its guid.
	///
	/// Guids are never reused within a connection, so a second registration
	/// is a driver protocol violation: fails with [`Error::DuplicateGuid`]
	/// and leaves the existing object in place.
	pub fn insert(&self, guid: Arc<str>, obj: Arc<dyn ChannelOwner>) -> Result<()> {
		match self.objects.entry(guid.clone()) {
			Entry::Occupied(_) => return Err(Error::DuplicateGuid(guid.to_string())),
			Entry::Vacant(slot) => {
				slot.insert(obj);
			}
		}
		if let Some((_, notify)) = self.waiters.remove(&guid) {
			notify.notify_waiters();
		}
		Ok(())
	}

	pub fn remove(&self, guid: &str) {
		self.objects.remove(&Arc::from(guid) as &Arc<str>);
	}

	/// Synchronous lookup.
	pub fn try_get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.get(&Arc::from(guid) as &Arc<str>).map(|r| r.value().clone())
	}

	/// Lookup that reports the missing guid.
	pub fn get(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.try_get(guid).ok_or_else(|| Error::ObjectNotFound { guid: guid.to_string() })
	}

	/// Waits for an object to be registered, with a deadline.
	///
	/// Covers the window where a response references a guid whose create
	/// message has not been processed yet.
	pub async fn wait_for(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn ChannelOwner>> {
		let guid: Arc<str> = Arc::from(guid);
		let start = tokio::time::Instant::now();
		let deadline = start + timeout;

		loop {
			// Register the waiter before checking, so an insert between the
			// check and the await still wakes us.
			let notify = self
				.waiters
				.entry(guid.clone())
				.or_insert_with(|| Arc::new(Notify::new()))
				.clone();
			let notified = notify.notified();

			if let Some(obj) = self.objects.get(&guid) {
				return Ok(obj.value().clone());
			}

			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			if remaining.is_zero() {
				tracing::debug!(guid = %guid, "timed out waiting for object registration");
				return Err(Error::timeout(start.elapsed(), timeout));
			}

			tokio::select! {
				biased;
				_ = notified => {}
				_ = tokio::time::sleep(remaining) => {
					tracing::debug!(guid = %guid, "timed out waiting for object registration");
					return Err(Error::timeout(start.elapsed(), timeout));
				}
			}
		}
	}

	/// Removes and returns every registered object. Used at teardown so the
	/// connection can dispose them all.
	pub fn drain(&self) -> Vec<Arc<dyn ChannelOwner>> {
		let guids: Vec<Arc<str>> = self.objects.iter().map(|r| r.key().clone()).collect();
		let mut drained = Vec::with_capacity(guids.len());
		for guid in guids {
			if let Some((_, obj)) = self.objects.remove(&guid) {
				drained.push(obj);
			}
		}
		self.waiters.clear();
		drained
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}
}
