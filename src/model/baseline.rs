//! Baseline file: previously accepted scores per fixture.
//!
//! The baseline is persisted as one human-readable JSON document. It is
//! read-only while grading and replaced wholesale when capturing: every
//! write goes to a temp file in the same directory, is fsynced, and is then
//! renamed over the target, so readers never observe a partial baseline.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::fixture::{Fixture, FixtureId};
use super::result::BaselineSkip;
use crate::constants::BASELINE_FORMAT_VERSION;
use crate::error::HarnessError;

// ---------------------------------------------------------------------------
// BaselineFixture
// ---------------------------------------------------------------------------

/// Accepted result for one fixture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineFixture {
    /// Which fixture.
    pub fixture_id: FixtureId,
    /// Accepted overall score.
    pub score: f64,
    /// Accepted sub-scores.
    pub subscores: BTreeMap<String, f64>,
    /// Prompt version the score was captured with.
    pub prompt_version: String,
    /// RFC 3339 capture time.
    pub captured_at: String,
    /// [`Fixture::content_hash`] at capture time.
    pub content_hash: String,
}

// ---------------------------------------------------------------------------
// VersionPolicy
// ---------------------------------------------------------------------------

/// How a baseline's `prompt_version` must relate to the version under test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicy {
    /// Strings must be identical.
    #[default]
    Exact,
    /// Same non-numeric prefix and same first numeric component
    /// (`feedback-v3.2` is compatible with `feedback-v3.7`).
    SameMajor,
    /// Any version is compatible.
    Any,
}

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>[^0-9]*)(?P<major>\d+)").ok());

impl VersionPolicy {
    /// Whether a baseline captured at `baseline` may be compared with `current`.
    #[must_use]
    pub fn is_compatible(self, baseline: &str, current: &str) -> bool {
        match self {
            Self::Exact => baseline == current,
            Self::Any => true,
            Self::SameMajor => match (major_of(baseline), major_of(current)) {
                (Some(a), Some(b)) => a == b,
                // Unversioned strings only match themselves.
                _ => baseline == current,
            },
        }
    }
}

fn major_of(version: &str) -> Option<(String, u64)> {
    let re = VERSION_RE.as_ref()?;
    let caps = re.captures(version.trim())?;
    let prefix = caps.name("prefix")?.as_str().to_ascii_lowercase();
    let major = caps.name("major")?.as_str().parse().ok()?;
    Some((prefix, major))
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::SameMajor => write!(f, "same-major"),
            Self::Any => write!(f, "any"),
        }
    }
}

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

/// Result of looking up a fixture in the baseline.
#[derive(Clone, Debug, PartialEq)]
pub enum BaselineLookup<'a> {
    /// A usable entry.
    Usable(&'a BaselineFixture),
    /// No usable entry, and why.
    Skipped(BaselineSkip),
}

/// All accepted results plus capture metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// File format version.
    pub version: u32,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Prompt version of the capture run.
    pub prompt_version: String,
    /// Model identifier of the capture run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Entries keyed by fixture id.
    pub fixtures: BTreeMap<FixtureId, BaselineFixture>,
}

impl Baseline {
    /// An empty baseline stamped with the current time.
    #[must_use]
    pub fn new(prompt_version: impl Into<String>, model: Option<String>) -> Self {
        Self {
            version: BASELINE_FORMAT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            prompt_version: prompt_version.into(),
            model,
            fixtures: BTreeMap::new(),
        }
    }

    /// Look up the entry for `fixture`, validating hash and prompt version.
    #[must_use]
    pub fn entry_for(
        &self,
        fixture: &Fixture,
        prompt_version: &str,
        policy: VersionPolicy,
    ) -> BaselineLookup<'_> {
        let Some(entry) = self.fixtures.get(&fixture.id) else {
            return BaselineLookup::Skipped(BaselineSkip::Missing);
        };
        let current_hash = fixture.content_hash();
        if entry.content_hash != current_hash {
            return BaselineLookup::Skipped(BaselineSkip::ContentHashMismatch {
                baseline: entry.content_hash.clone(),
                current: current_hash,
            });
        }
        if !policy.is_compatible(&entry.prompt_version, prompt_version) {
            return BaselineLookup::Skipped(BaselineSkip::PromptVersionMismatch {
                baseline: entry.prompt_version.clone(),
                current: prompt_version.to_owned(),
            });
        }
        BaselineLookup::Usable(entry)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    /// Returns the serializer message on failure.
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Read a baseline file.
    ///
    /// Returns `Ok(None)` when the file does not exist: grading without a
    /// baseline is a valid mode.
    ///
    /// # Errors
    /// Returns [`HarnessError::UnreadableBaseline`] when the file exists but
    /// cannot be read or parsed, or has an unsupported format version.
    pub fn read(path: &Path) -> Result<Option<Self>, HarnessError> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HarnessError::UnreadableBaseline {
                    path: path.to_owned(),
                    detail: e.to_string(),
                });
            }
        };
        let baseline: Self =
            serde_json::from_str(&contents).map_err(|e| HarnessError::UnreadableBaseline {
                path: path.to_owned(),
                detail: e.to_string(),
            })?;
        if baseline.version != BASELINE_FORMAT_VERSION {
            return Err(HarnessError::UnreadableBaseline {
                path: path.to_owned(),
                detail: format!(
                    "unsupported format version {} (expected {BASELINE_FORMAT_VERSION})",
                    baseline.version
                ),
            });
        }
        for (key, entry) in &baseline.fixtures {
            if *key != entry.fixture_id {
                return Err(HarnessError::UnreadableBaseline {
                    path: path.to_owned(),
                    detail: format!(
                        "entry keyed '{key}' declares fixture_id '{}'",
                        entry.fixture_id
                    ),
                });
            }
        }
        Ok(Some(baseline))
    }

    /// Replace the baseline file atomically.
    ///
    /// 1. Serialize to pretty JSON.
    /// 2. Write to a temporary file in the same directory.
    /// 3. fsync the temporary file.
    /// 4. Rename over the target path.
    ///
    /// # Errors
    /// Returns [`HarnessError::BaselineWrite`] on serialization or I/O failure.
    /// The previous file is left untouched on failure.
    pub fn write_atomic(&self, path: &Path) -> Result<(), HarnessError> {
        let fail = |detail: String| HarnessError::BaselineWrite {
            path: path.to_owned(),
            detail,
        };
        let json = self.to_json().map_err(fail)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => std::path::PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| fail(format!("create {}: {e}", dir.display())))?;

        let file_name = path
            .file_name()
            .map_or_else(|| "baseline".into(), |n| n.to_string_lossy().into_owned());
        let tmp_path = dir.join(format!(".{file_name}.tmp"));

        let mut file = fs::File::create(&tmp_path)
            .map_err(|e| fail(format!("create {}: {e}", tmp_path.display())))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .map_err(|e| fail(format!("write {}: {e}", tmp_path.display())))?;
        file.sync_all()
            .map_err(|e| fail(format!("fsync {}: {e}", tmp_path.display())))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(fail(format!(
                "rename {} → {}: {e}",
                tmp_path.display(),
                path.display()
            )));
        }
        Ok(())
    }
}
