use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Whose progress log is active
///
/// Every identity owns a separate storage namespace, so switching between them never mixes logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
	/// Unauthenticated, local-only session
	Guest,
	/// Authenticated session, synchronized with the remote authority
	User(UserId),
}

impl Identity {
	pub const fn user_id(&self) -> Option<&UserId> {
		match self {
			Self::Guest => None,
			Self::User(id) => Some(id),
		}
	}

	pub const fn is_guest(&self) -> bool {
		matches!(self, Self::Guest)
	}
}

/// Authentication state as reported by the auth provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
	pub is_authenticated: bool,
	pub user_id: Option<String>,
}

impl AuthState {
	/// An authenticated state without a usable user id is still a guest.
	pub fn identity(&self) -> Identity {
		match self.user_id.as_deref().map(str::trim) {
			Some(id) if self.is_authenticated && !id.is_empty() => Identity::User(UserId::new(id)),
			_ => Identity::Guest,
		}
	}
}
