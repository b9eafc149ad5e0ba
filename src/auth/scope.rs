//! OAuth scope sets requested by credential providers.

// std
use std::collections::BTreeSet;
// self
use crate::_prelude::*;

/// Read access to the signer's account email.
pub const USERINFO_EMAIL_SCOPE: &str = "https://www.googleapis.com/auth/userinfo.email";
/// Read/write access to the realtime database.
pub const DATABASE_SCOPE: &str = "https://www.googleapis.com/auth/firebase.database";
/// Fixed scope pair requested by every credential source.
pub const SCOPES: [&str; 2] = [USERINFO_EMAIL_SCOPE, DATABASE_SCOPE];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized, deduplicated, and sorted set of OAuth scopes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let owned: String = scope.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			set.insert(owned);
		}

		Ok(Self(Arc::from(set.into_iter().collect::<Vec<_>>())))
	}

	/// The scope pair every credential source requests.
	pub fn channel_defaults() -> Self {
		let sorted = SCOPES.iter().map(|scope| (*scope).to_owned()).collect::<BTreeSet<_>>();

		Self(Arc::from(sorted.into_iter().collect::<Vec<_>>()))
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|s| s.as_str())
	}

	/// Joins the scopes with `delimiter`.
	///
	/// Token endpoints expect spaces while the metadata server expects commas.
	pub fn joined(&self, delimiter: char) -> String {
		let mut buf = String::new();

		for (idx, value) in self.iter().enumerate() {
			if idx > 0 {
				buf.push(delimiter);
			}

			buf.push_str(value);
		}

		buf
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.joined(' '))
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn normalizes_and_deduplicates() {
		let scopes = ScopeSet::new(["write", "read", "write"])
			.expect("Scope fixture should be valid for normalization.");

		assert_eq!(scopes.len(), 2);
		assert_eq!(scopes.to_string(), "read write");
		assert!(scopes.contains("read"));
		assert!(!scopes.contains("admin"));
	}

	#[test]
	fn rejects_empty_and_whitespace_entries() {
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
		assert!(matches!(
			ScopeSet::new(["a b"]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert_eq!("   ".parse::<ScopeSet>(), Err(ScopeValidationError::Empty));
	}

	#[test]
	fn channel_defaults_hold_the_fixed_pair() {
		let scopes = ScopeSet::channel_defaults();

		assert_eq!(scopes.len(), 2);
		assert!(scopes.contains(USERINFO_EMAIL_SCOPE));
		assert!(scopes.contains(DATABASE_SCOPE));
		assert_eq!(scopes.joined(','), format!("{DATABASE_SCOPE},{USERINFO_EMAIL_SCOPE}"));
	}
}
