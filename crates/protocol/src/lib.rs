//! Shared types for the webpilot driver protocol.
//!
//! These are the option structs and small value types that the high-level
//! API builds request parameters from. Field names follow the driver's wire
//! schema (camelCase, optional fields omitted when unset); the structs exist
//! so callers never have to hand-assemble JSON.

pub mod cookie;
pub mod options;
pub mod types;

pub use cookie::{Cookie, SameSite};
pub use options::{
	ClickOptions, ContextOptions, FillOptions, GotoOptions, LaunchOptions, MouseButton,
	ScreenshotOptions, ScreenshotType, WaitUntil,
};
pub use types::{GuidRef, Viewport};
