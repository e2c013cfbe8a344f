//! Option structs for driver calls.
//!
//! Every struct serializes straight into the `params` object of a call, so
//! field names and casing follow the driver schema. All fields are optional
//! and omitted when unset; builders keep call sites readable.

use serde::Serialize;

use crate::types::Viewport;

/// How long to consider a navigation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitUntil {
	Load,
	Domcontentloaded,
	Networkidle,
	Commit,
}

/// Options for launching a browser.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub headless: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub args: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub executable_path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub slow_mo: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,
}

impl LaunchOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn headless(mut self, headless: bool) -> Self {
		self.headless = Some(headless);
		self
	}

	pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.args = Some(args.into_iter().map(Into::into).collect());
		self
	}

	pub fn executable_path(mut self, path: impl Into<String>) -> Self {
		self.executable_path = Some(path.into());
		self
	}

	pub fn slow_mo(mut self, ms: f64) -> Self {
		self.slow_mo = Some(ms);
		self
	}

	pub fn timeout(mut self, ms: f64) -> Self {
		self.timeout = Some(ms);
		self
	}
}

/// Options for creating a browser context.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub viewport: Option<Viewport>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub locale: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ignore_https_errors: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub java_script_enabled: Option<bool>,
}

impl ContextOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn viewport(mut self, viewport: Viewport) -> Self {
		self.viewport = Some(viewport);
		self
	}

	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	pub fn locale(mut self, locale: impl Into<String>) -> Self {
		self.locale = Some(locale.into());
		self
	}

	pub fn ignore_https_errors(mut self, ignore: bool) -> Self {
		self.ignore_https_errors = Some(ignore);
		self
	}

	pub fn java_script_enabled(mut self, enabled: bool) -> Self {
		self.java_script_enabled = Some(enabled);
		self
	}
}

/// Options for navigation calls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wait_until: Option<WaitUntil>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub referer: Option<String>,
}

impl GotoOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn timeout(mut self, ms: f64) -> Self {
		self.timeout = Some(ms);
		self
	}

	pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
		self.wait_until = Some(wait_until);
		self
	}

	pub fn referer(mut self, referer: impl Into<String>) -> Self {
		self.referer = Some(referer.into());
		self
	}
}

/// Mouse button for click calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
	Left,
	Right,
	Middle,
}

/// Options for click calls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub button: Option<MouseButton>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub click_count: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub delay: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub force: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,
}

impl ClickOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn button(mut self, button: MouseButton) -> Self {
		self.button = Some(button);
		self
	}

	pub fn click_count(mut self, count: i32) -> Self {
		self.click_count = Some(count);
		self
	}

	pub fn delay(mut self, ms: f64) -> Self {
		self.delay = Some(ms);
		self
	}

	pub fn force(mut self, force: bool) -> Self {
		self.force = Some(force);
		self
	}

	pub fn timeout(mut self, ms: f64) -> Self {
		self.timeout = Some(ms);
		self
	}
}

/// Options for fill calls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub force: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,
}

impl FillOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn force(mut self, force: bool) -> Self {
		self.force = Some(force);
		self
	}

	pub fn timeout(mut self, ms: f64) -> Self {
		self.timeout = Some(ms);
		self
	}
}

/// Screenshot image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenshotType {
	Png,
	Jpeg,
}

/// Options for screenshot calls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotOptions {
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub image_type: Option<ScreenshotType>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub full_page: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quality: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,
}

impl ScreenshotOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn image_type(mut self, image_type: ScreenshotType) -> Self {
		self.image_type = Some(image_type);
		self
	}

	pub fn full_page(mut self, full_page: bool) -> Self {
		self.full_page = Some(full_page);
		self
	}

	pub fn quality(mut self, quality: i32) -> Self {
		self.quality = Some(quality);
		self
	}

	pub fn timeout(mut self, ms: f64) -> Self {
		self.timeout = Some(ms);
		self
	}
}
