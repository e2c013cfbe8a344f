//! Cookie types for browser context storage operations.

use serde::{Deserialize, Serialize};

/// SameSite attribute of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
	Strict,
	Lax,
	None,
}

/// A browser cookie as the driver reports and accepts it.
///
/// `expires` is Unix time in seconds; `-1` means a session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub same_site: Option<SameSite>,
}

impl Cookie {
	/// Creates a cookie scoped to a URL.
	pub fn for_url(name: impl Into<String>, value: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			url: Some(url.into()),
			domain: None,
			path: None,
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
		}
	}

	/// Creates a cookie scoped to a domain and path.
	pub fn for_domain(
		name: impl Into<String>,
		value: impl Into<String>,
		domain: impl Into<String>,
		path: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			url: None,
			domain: Some(domain.into()),
			path: Some(path.into()),
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unset_fields_are_omitted() {
		let json = serde_json::to_value(Cookie::for_url("sid", "1", "https://example.com")).unwrap();
		assert_eq!(
			json,
			serde_json::json!({"name": "sid", "value": "1", "url": "https://example.com"})
		);
	}

	#[test]
	fn camel_case_fields() {
		let cookie: Cookie = serde_json::from_value(serde_json::json!({
			"name": "sid",
			"value": "1",
			"domain": ".example.com",
			"path": "/",
			"httpOnly": true,
			"sameSite": "Lax"
		}))
		.unwrap();
		assert_eq!(cookie.http_only, Some(true));
		assert_eq!(cookie.same_site, Some(SameSite::Lax));
	}
}
