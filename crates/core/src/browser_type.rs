//! One browser flavor (chromium, firefox, webkit).

use std::sync::Arc;

use serde_json::Value;
use webpilot_protocol::LaunchOptions;
use webpilot_runtime::Result;
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};

use crate::Browser;

/// A launchable browser flavor.
#[derive(Clone)]
pub struct BrowserType {
	base: ChannelOwnerImpl,
}

impl BrowserType {
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
		}
	}

	/// Browser name ("chromium", "firefox" or "webkit").
	pub fn name(&self) -> &str {
		self.base.initializer()["name"].as_str().unwrap_or("")
	}

	/// Path of the browser executable the driver will run.
	pub fn executable_path(&self) -> &str {
		self.base.initializer()["executablePath"].as_str().unwrap_or("")
	}

	/// Launches a browser instance.
	pub async fn launch(&self, options: LaunchOptions) -> Result<Browser> {
		let result: Value = self.base.channel().send("launch", &options).await?;
		crate::object_at(&self.base.connection(), &result, "browser")
	}
}

webpilot_runtime::impl_channel_owner!(BrowserType);

impl std::fmt::Debug for BrowserType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BrowserType")
			.field("name", &self.name())
			.field("guid", &self.base.guid())
			.finish()
	}
}
