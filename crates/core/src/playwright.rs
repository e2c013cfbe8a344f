//! Entry point object.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use webpilot_runtime::connection::{Connection, ConnectionLike};
use webpilot_runtime::driver::DriverProcess;
use webpilot_runtime::transport::{PipeTransport, TransportParts};
use webpilot_runtime::{Error, Result};

use crate::BrowserType;

/// Root of the API: launches the driver and hands out browser types.
///
/// ```no_run
/// # async fn demo() -> webpilot::Result<()> {
/// let playwright = webpilot::Playwright::launch().await?;
/// let browser = playwright.chromium()?.launch(Default::default()).await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Playwright {
	base: ChannelOwnerImpl,
	// Held for clean shutdown when this instance launched the driver.
	driver: Arc<Mutex<Option<DriverProcess>>>,
}

impl Playwright {
	pub(crate) fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name,
				guid,
				initializer,
			),
			driver: Arc::new(Mutex::new(None)),
		}
	}

	/// Launches the driver process and connects to it: spawns the driver
	/// with piped stdio, starts the dispatch loop, and runs the handshake.
	pub async fn launch() -> Result<Self> {
		tracing::debug!("launching driver process");
		let mut driver = DriverProcess::launch().await?;
		let (stdin, stdout) = driver.take_pipes()?;

		let (transport, message_rx) = PipeTransport::new(stdin, stdout);
		let parts = transport.into_transport_parts(message_rx);

		let mut playwright = Self::connect(parts).await?;
		playwright.driver = Arc::new(Mutex::new(Some(driver)));
		Ok(playwright)
	}

	/// Connects over an already-open transport (e.g. a socket pair or a
	/// driver process managed by the caller).
	pub async fn connect(parts: TransportParts) -> Result<Self> {
		let connection = Arc::new(Connection::new(parts));

		let dispatch = Arc::clone(&connection);
		tokio::spawn(async move {
			dispatch.run().await;
		});

		let object = crate::init::initialize(&connection).await?;
		let playwright = object
			.downcast_ref::<Playwright>()
			.ok_or_else(|| Error::Protocol("initialized object is not Playwright".to_string()))?;
		Ok(playwright.clone())
	}

	/// Shuts the session down: closes the connection (failing anything
	/// still pending) and stops the driver process if this instance owns
	/// one.
	pub async fn shutdown(self) -> Result<()> {
		self.base.connection().close();
		let driver = self.driver.lock().take();
		if let Some(driver) = driver {
			driver.shutdown().await?;
		}
		Ok(())
	}

	/// Replaces the default deadline applied to calls without an explicit
	/// timeout.
	pub fn set_default_timeout(&self, timeout: Duration) {
		self.base.connection().set_default_timeout(timeout);
	}

	pub fn chromium(&self) -> Result<BrowserType> {
		self.browser_type("chromium")
	}

	pub fn firefox(&self) -> Result<BrowserType> {
		self.browser_type("firefox")
	}

	pub fn webkit(&self) -> Result<BrowserType> {
		self.browser_type("webkit")
	}

	fn browser_type(&self, name: &str) -> Result<BrowserType> {
		crate::object_at(&self.base.connection(), self.base.initializer(), name)
	}
}

webpilot_runtime::impl_channel_owner!(Playwright);

impl std::fmt::Debug for Playwright {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Playwright").field("guid", &self.base.guid()).finish()
	}
}
