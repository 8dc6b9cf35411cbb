//! Fixture corpus: discovery, validation and selection.
//!
//! A corpus is a directory of `*.json` files, one fixture each:
//!
//! ```json
//! {
//!   "id": "swe-senior-01",
//!   "mode": "targeted",
//!   "document_file": "docs/swe-senior-01.txt",
//!   "context": "Staff Backend Engineer, payments",
//!   "tags": ["grounding"]
//! }
//! ```
//!
//! `id` defaults to the file stem. Exactly one of `document` (inline) and
//! `document_file` (relative to the fixture file) must be present. Every
//! problem here is run-fatal and reported before anything is generated.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Deserialize;

use crate::error::HarnessError;
use crate::model::{Fixture, FixtureId, FixtureMode};

/// On-disk fixture layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    mode: FixtureMode,
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    document_file: Option<PathBuf>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Load and validate every fixture under `dir`, sorted by id.
///
/// # Errors
/// [`HarnessError::MissingCorpus`] when the directory is missing or holds
/// no fixture files, [`HarnessError::InvalidFixture`] for unreadable or
/// invalid files, [`HarnessError::DuplicateFixture`] for repeated ids.
pub fn load_corpus(dir: &Path) -> Result<Vec<Fixture>, HarnessError> {
    if !dir.is_dir() {
        return Err(HarnessError::MissingCorpus {
            path: dir.to_owned(),
            detail: "directory does not exist".to_owned(),
        });
    }

    let pattern = format!("{}/*.json", Pattern::escape(&dir.to_string_lossy()));
    let paths = glob::glob(&pattern).map_err(|e| HarnessError::MissingCorpus {
        path: dir.to_owned(),
        detail: format!("invalid corpus path: {e}"),
    })?;

    let mut by_id: BTreeMap<FixtureId, (PathBuf, Fixture)> = BTreeMap::new();
    for entry in paths {
        let path = entry.map_err(|e| HarnessError::InvalidFixture {
            path: e.path().to_owned(),
            detail: e.error().to_string(),
        })?;
        let fixture = load_fixture(&path)?;
        if let Some((first, _)) = by_id.get(&fixture.id) {
            return Err(HarnessError::DuplicateFixture {
                id: fixture.id.to_string(),
                first: first.clone(),
                second: path,
            });
        }
        by_id.insert(fixture.id.clone(), (path, fixture));
    }

    if by_id.is_empty() {
        return Err(HarnessError::MissingCorpus {
            path: dir.to_owned(),
            detail: "no *.json fixture files".to_owned(),
        });
    }

    tracing::info!(dir = %dir.display(), count = by_id.len(), "fixture corpus loaded");
    Ok(by_id.into_values().map(|(_, f)| f).collect())
}

/// Load and validate one fixture file.
///
/// # Errors
/// [`HarnessError::InvalidFixture`] describing the first problem found.
pub fn load_fixture(path: &Path) -> Result<Fixture, HarnessError> {
    let invalid = |detail: String| HarnessError::InvalidFixture {
        path: path.to_owned(),
        detail,
    };

    let text = std::fs::read_to_string(path).map_err(|e| invalid(format!("could not read: {e}")))?;
    let raw: FixtureFile =
        serde_json::from_str(&text).map_err(|e| invalid(format!("invalid JSON: {e}")))?;

    let id_str = match raw.id {
        Some(id) => id,
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| invalid("no id and no file stem".to_owned()))?,
    };
    let id = FixtureId::new(&id_str).map_err(|e| invalid(e.to_string()))?;

    let document = match (raw.document, raw.document_file) {
        (Some(doc), None) => doc,
        (None, Some(rel)) => {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let doc_path = base.join(&rel);
            std::fs::read_to_string(&doc_path).map_err(|e| {
                invalid(format!(
                    "could not read document_file {}: {e}",
                    doc_path.display()
                ))
            })?
        }
        (Some(_), Some(_)) => {
            return Err(invalid(
                "set either 'document' or 'document_file', not both".to_owned(),
            ));
        }
        (None, None) => {
            return Err(invalid("missing 'document' or 'document_file'".to_owned()));
        }
    };

    let fixture = Fixture {
        id,
        mode: raw.mode,
        document,
        context: raw.context,
        tags: raw.tags,
        description: raw.description,
    };
    fixture.validate().map_err(invalid)?;
    Ok(fixture)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which fixtures of the corpus to evaluate.
///
/// An empty selection means the whole corpus. `ids` entries may be glob
/// patterns (`swe-*`); each must match at least one fixture. A fixture is
/// selected when it matches an id (or no ids are given) and carries one of
/// the tags (or no tags are given).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Fixture ids or id patterns.
    pub ids: Vec<String>,
    /// Required tags (any of).
    pub tags: Vec<String>,
}

impl Selection {
    /// Whether this selection narrows the corpus at all.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.ids.is_empty() && self.tags.is_empty()
    }

    /// Apply the selection.
    ///
    /// # Errors
    /// [`HarnessError::UnknownFixture`] when a requested id matches nothing,
    /// [`HarnessError::EmptySelection`] when nothing is left.
    pub fn apply(&self, fixtures: Vec<Fixture>) -> Result<Vec<Fixture>, HarnessError> {
        if self.is_all() {
            return Ok(fixtures);
        }

        let patterns = self
            .ids
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|_| HarnessError::UnknownFixture { id: raw.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (raw, pattern) in self.ids.iter().zip(&patterns) {
            if !fixtures.iter().any(|f| pattern.matches(f.id.as_str())) {
                return Err(HarnessError::UnknownFixture { id: raw.clone() });
            }
        }

        let selected: Vec<Fixture> = fixtures
            .into_iter()
            .filter(|f| patterns.is_empty() || patterns.iter().any(|p| p.matches(f.id.as_str())))
            .filter(|f| self.tags.is_empty() || self.tags.iter().any(|t| f.has_tag(t)))
            .collect();

        if selected.is_empty() {
            return Err(HarnessError::EmptySelection {
                selection: self.to_string(),
            });
        }
        Ok(selected)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("all fixtures");
        }
        let mut parts = Vec::new();
        if !self.ids.is_empty() {
            parts.push(format!("ids: {}", self.ids.join(", ")));
        }
        if !self.tags.is_empty() {
            parts.push(format!("tags: {}", self.tags.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}
