//! Connection handshake.
//!
//! The driver bootstraps from a well-known root object with the empty guid:
//! the client registers it locally, sends `initialize`, and the driver
//! answers with the guid of the `Playwright` object after announcing it
//! (and the browser types) through `__create__` messages.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Value, json};
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use webpilot_runtime::connection::{Connection, ConnectionLike, ObjectFactory};
use webpilot_runtime::{Error, Result};

use crate::Playwright;

/// Client-side root object, registered under the empty guid.
///
/// Stays registered for the life of the connection: the driver parents
/// top-level objects under it.
pub(crate) struct Root {
	base: ChannelOwnerImpl,
}

impl Root {
	pub(crate) fn new(connection: Arc<dyn ConnectionLike>) -> Self {
		Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Connection(connection),
				"Root".to_string(),
				Arc::from(""),
				Value::Null,
			),
		}
	}

	async fn initialize(&self) -> Result<Value> {
		self.base
			.channel()
			.send("initialize", json!({"sdkLanguage": "rust"}))
			.await
	}
}

webpilot_runtime::impl_channel_owner!(Root);

/// Performs the handshake and returns the root `Playwright` object.
pub(crate) async fn initialize(connection: &Arc<Connection>) -> Result<Arc<dyn ChannelOwner>> {
	connection.set_factory(Arc::new(DefaultObjectFactory));

	let root: Arc<dyn ChannelOwner> = Arc::new(Root::new(
		Arc::clone(connection) as Arc<dyn ConnectionLike>
	));
	connection.register_object(Arc::from(""), Arc::clone(&root))?;
	tracing::debug!("root registered, sending initialize");

	let root = root
		.downcast_ref::<Root>()
		.ok_or_else(|| Error::Protocol("root object has unexpected type".to_string()))?;
	let response = root.initialize().await?;

	let guid = crate::guid_at(&response, "playwright")?;
	tracing::debug!(%guid, "handshake complete");

	// The create for this guid was dispatched before the response, but
	// wait_for keeps this robust if a driver ever reorders them.
	let playwright = connection
		.wait_for_object(guid, connection.default_timeout())
		.await?;
	if playwright.downcast_ref::<Playwright>().is_none() {
		return Err(Error::Protocol(format!(
			"object '{guid}' is not a Playwright instance"
		)));
	}
	Ok(playwright)
}

/// Factory wiring the connection's `__create__` handling to
/// [`object_factory::create_object`](crate::object_factory::create_object).
struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
	fn create_object(
		&self,
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>> {
		Box::pin(async move {
			crate::object_factory::create_object(parent, type_name, guid, initializer)
		})
	}
}
