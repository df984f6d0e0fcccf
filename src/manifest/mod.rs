//! Static list of migration streams loaded from a TOML manifest.
//!
//! The manifest names each stream, the task that performs its transfer, and
//! the role label of the compute resource hosting its sync agent:
//!
//! ```toml
//! [[streams]]
//! name = "EFS-AZURE"
//! task_arn = "arn:aws:datasync:us-west-2:111122223333:task/task-0a"
//! resource_label = "EC2-AZURE-SYNC-EFS"
//! ```

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::toml;
use serde::Deserialize;
use thiserror::Error;

/// A named, independently tracked transfer unit.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct StreamSpec {
    /// Stable stream name; matched against task names reported by the
    /// transfer service.
    pub name: String,
    /// Identifier of the task to start.
    pub task_arn: String,
    /// Role label tag carried by the compute resource of this stream.
    pub resource_label: String,
}

impl StreamSpec {
    /// Creates a stream specification.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        task_arn: impl Into<String>,
        resource_label: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            task_arn: task_arn.into(),
            resource_label: resource_label.into(),
        }
    }
}

/// Errors raised while loading or validating a manifest.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ManifestError {
    /// Raised when the manifest file cannot be read.
    #[error("failed to read stream manifest {path}: {message}")]
    Io {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the manifest is not valid TOML or has the wrong shape.
    #[error("failed to parse stream manifest: {0}")]
    Parse(String),
    /// Raised when no streams are configured.
    #[error("stream manifest does not define any [[streams]] entries")]
    Empty,
    /// Raised when a stream field is blank.
    #[error("stream #{index} has an empty {field}")]
    BlankField {
        /// One-based position of the stream in the manifest.
        index: usize,
        /// Field that is blank.
        field: &'static str,
    },
    /// Raised when two streams share a name.
    #[error("stream name {0} is defined more than once")]
    DuplicateName(String),
    /// Raised when two streams point at the same resource label.
    #[error("resource label {0} is shared by more than one stream")]
    DuplicateResourceLabel(String),
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    streams: Vec<StreamSpec>,
}

/// Validated, ordered list of streams.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamManifest {
    streams: Vec<StreamSpec>,
}

impl StreamManifest {
    /// Builds a manifest from already parsed streams, trimming every field.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the list is empty, a field is blank, or
    /// names or resource labels repeat.
    pub fn new(streams: Vec<StreamSpec>) -> Result<Self, ManifestError> {
        if streams.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut names = BTreeSet::new();
        let mut labels = BTreeSet::new();
        let mut trimmed = Vec::with_capacity(streams.len());
        for (position, stream) in streams.into_iter().enumerate() {
            let index = position + 1;
            let spec = StreamSpec {
                name: require(stream.name, index, "name")?,
                task_arn: require(stream.task_arn, index, "task_arn")?,
                resource_label: require(stream.resource_label, index, "resource_label")?,
            };
            if !names.insert(spec.name.clone()) {
                return Err(ManifestError::DuplicateName(spec.name));
            }
            if !labels.insert(spec.resource_label.clone()) {
                return Err(ManifestError::DuplicateResourceLabel(spec.resource_label));
            }
            trimmed.push(spec);
        }

        Ok(Self { streams: trimmed })
    }

    /// Parses manifest TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed TOML and any validation
    /// error from [`StreamManifest::new`].
    pub fn from_toml(contents: &str) -> Result<Self, ManifestError> {
        let file: ManifestFile =
            toml::from_str(contents).map_err(|err| ManifestError::Parse(err.to_string()))?;
        Self::new(file.streams)
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] when the file cannot be read, and any
    /// error from [`StreamManifest::from_toml`].
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let contents = read_manifest(path)?;
        Self::from_toml(&contents)
    }

    /// Streams in configured order.
    #[must_use]
    pub fn streams(&self) -> &[StreamSpec] {
        &self.streams
    }

    /// Number of configured streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Always `false`; an empty manifest is rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

fn require(value: String, index: usize, field: &'static str) -> Result<String, ManifestError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ManifestError::BlankField { index, field });
    }
    Ok(trimmed.to_owned())
}

fn read_manifest(path: &Utf8Path) -> Result<String, ManifestError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ManifestError::Io {
        path: path.to_path_buf(),
        message: String::from("manifest path is missing a filename"),
    })?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ManifestError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;

    dir.read_to_string(file_name).map_err(|err| ManifestError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
