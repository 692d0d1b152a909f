//! Validated identifiers used as stable keys for files, interpreters and
//! groups.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Characters that are reserved by the `#{id:sub}` macro syntax.
pub(crate) const RESERVED_CHARS: [char; 3] = ['{', '}', ':'];

/// A non-empty token free of the macro-reserved characters `{`, `}` and `:`.
///
/// # Examples
/// ```
/// use scie_lift::Identifier;
///
/// let id = Identifier::parse("cpython")?;
/// assert_eq!(id.as_str(), "cpython");
/// assert!(Identifier::parse("bad:id").is_err());
/// # Ok::<(), scie_lift::InputError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validates `value` as an identifier.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when `value` is empty or contains a reserved
    /// character.
    pub fn parse(value: impl Into<String>) -> Result<Self, InputError> {
        let value = value.into();
        if value.is_empty() {
            return Err(InputError::new("An identifier cannot be empty."));
        }
        if value.contains(RESERVED_CHARS) {
            return Err(InputError::new(format!(
                "Identifier {value:?} is invalid; identifiers cannot contain the characters {{, }} or :."
            )));
        }
        Ok(Self(value))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = InputError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cpython")]
    #[case("cpython-3.12")]
    #[case("a b")]
    fn accepts_plain_tokens(#[case] value: &str) {
        assert_eq!(Identifier::parse(value).map(|id| id.0), Ok(value.to_owned()));
    }

    #[rstest]
    #[case("")]
    #[case("{cpython}")]
    #[case("cpython:python")]
    #[case("open{")]
    fn rejects_reserved_characters(#[case] value: &str) {
        assert!(Identifier::parse(value).is_err());
    }
}
