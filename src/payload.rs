//! Extraction of the repository and revision a push event refers to.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::ValidationError;

/// Which payload field names the revision to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionMode {
    /// `after`: the commit hash the push moved the branch to.
    Commit,
    /// `ref`: the pushed ref, resolved by the engine through the SCM descriptor.
    #[default]
    Ref,
}

impl RevisionMode {
    pub fn field(self) -> &'static str {
        match self {
            RevisionMode::Commit => "after",
            RevisionMode::Ref => "ref",
        }
    }
}

/// A revision resolved once during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    CommitPinned(String),
    RefPinned(String),
}

impl RevisionSpec {
    pub fn as_str(&self) -> &str {
        match self {
            RevisionSpec::CommitPinned(hash) => hash,
            RevisionSpec::RefPinned(name) => name,
        }
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub clone_url: String,
    pub revision: RevisionSpec,
}

/// Parse a raw webhook body into the reference to check out.
///
/// Pure: no network or filesystem access.
pub fn parse(raw: &[u8], mode: RevisionMode) -> Result<RepositoryReference, ValidationError> {
    let payload: Value = serde_json::from_slice(raw)
        .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

    let repository = payload
        .get("repository")
        .filter(|r| r.is_object())
        .ok_or(ValidationError::MissingField("repository"))?;

    let clone_url = non_empty_str(repository.get("clone_url"))
        .ok_or(ValidationError::MissingField("repository.clone_url"))?;

    let revision = non_empty_str(payload.get(mode.field()))
        .ok_or(ValidationError::MissingField(mode.field()))?;

    // Both values end up as command-line arguments.
    for (field, value) in [("repository.clone_url", clone_url), (mode.field(), revision)] {
        if value.starts_with('-') {
            return Err(ValidationError::MalformedPayload(format!(
                "'{}' must not start with '-'",
                field
            )));
        }
    }

    let revision = match mode {
        RevisionMode::Commit => RevisionSpec::CommitPinned(revision.to_string()),
        RevisionMode::Ref => RevisionSpec::RefPinned(revision.to_string()),
    };

    Ok(RepositoryReference {
        clone_url: clone_url.to_string(),
        revision,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
