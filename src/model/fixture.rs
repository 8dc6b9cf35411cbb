//! Evaluation fixtures: a fixed input document plus the metadata needed to
//! exercise one generation variant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// FixtureId
// ---------------------------------------------------------------------------

/// A validated fixture identifier: lowercase ASCII letters, digits, `.`, `_`
/// and `-`, starting with a letter or digit.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixtureId(String);

/// Returned when a string is not a valid [`FixtureId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidFixtureId {
    /// The rejected value.
    pub value: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl fmt::Display for InvalidFixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid fixture id '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for InvalidFixtureId {}

impl FixtureId {
    /// Create a new id, validating its format.
    ///
    /// # Errors
    /// Returns [`InvalidFixtureId`] when the string is empty, too long, or
    /// contains characters outside `[a-z0-9._-]`.
    pub fn new(s: &str) -> Result<Self, InvalidFixtureId> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), InvalidFixtureId> {
        let reject = |reason| {
            Err(InvalidFixtureId {
                value: s.to_owned(),
                reason,
            })
        };
        if s.is_empty() {
            return reject("must not be empty");
        }
        if s.len() > 128 {
            return reject("must be at most 128 characters");
        }
        if !s.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return reject("must start with a lowercase letter or digit");
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        {
            return reject("may only contain lowercase letters, digits, '.', '_' and '-'");
        }
        Ok(())
    }
}

impl fmt::Display for FixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FixtureId {
    type Err = InvalidFixtureId;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FixtureId {
    type Error = InvalidFixtureId;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<FixtureId> for String {
    fn from(id: FixtureId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// FixtureMode
// ---------------------------------------------------------------------------

/// Which generation variant a fixture exercises.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixtureMode {
    /// Complete feedback over the whole document.
    #[default]
    Full,
    /// Abbreviated feedback (fewer findings, same contract).
    Quick,
    /// Feedback targeted at the role described in the fixture context.
    Targeted,
}

impl fmt::Display for FixtureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Quick => write!(f, "quick"),
            Self::Targeted => write!(f, "targeted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// One evaluation input.
///
/// Immutable once loaded. Any edit to `document` or `context` changes
/// [`Fixture::content_hash`], which invalidates stored baseline entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Stable identifier, unique across the corpus.
    pub id: FixtureId,
    /// Generation variant to exercise.
    #[serde(default)]
    pub mode: FixtureMode,
    /// The source document text.
    pub document: String,
    /// Secondary context, e.g. a target-role description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Expectation hints (e.g. `grounding`, `no-metrics`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Free-form note for corpus curators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Fixture {
    /// Lowercase hex SHA-256 over the document and context.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.context.as_deref().unwrap_or("").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Whether the fixture carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Check the invariants that serde cannot express.
    ///
    /// # Errors
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.document.trim().is_empty() {
            return Err("document is empty".to_owned());
        }
        if self.mode == FixtureMode::Targeted
            && self.context.as_deref().is_none_or(|c| c.trim().is_empty())
        {
            return Err("mode 'targeted' requires a non-empty context".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn fixture_for_tests(id: &str, document: &str) -> Fixture {
    Fixture {
        id: FixtureId::new(id).unwrap(),
        mode: FixtureMode::Full,
        document: document.to_owned(),
        context: None,
        tags: Vec::new(),
        description: None,
    }
}
