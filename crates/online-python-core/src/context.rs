//! Run request assembled from local input files.

use std::{
    collections::HashSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Input error.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),
    #[error("Duplicate file name: {0}")]
    DuplicateName(String),
    #[error("At least one input file is required")]
    NoFiles,
}

/// A local file staged for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// File name as seen by the remote interpreter.
    pub name: String,
    /// Full textual content.
    pub content: String,
}

impl InputFile {
    /// Create an input file from a name and its content.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk. Only the final path component is kept as its name.
    ///
    /// # Errors
    /// Returns error if the path has no file name or cannot be read as UTF-8 text.
    pub async fn read(path: &Path) -> Result<Self, InputError> {
        let name = path
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| InputError::NoFileName(path.to_path_buf()))?
            .to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InputError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { name, content })
    }
}

/// Files to upload plus the arguments for the remote program.
///
/// The first file is the entry point executed by the remote interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    files: Vec<InputFile>,
    args: Vec<String>,
}

impl RunRequest {
    /// Create a run request.
    ///
    /// # Errors
    /// Returns error if `files` is empty or two files share a name.
    pub fn new(files: Vec<InputFile>, args: Vec<String>) -> Result<Self, InputError> {
        if files.is_empty() {
            return Err(InputError::NoFiles);
        }
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.name.as_str()) {
                return Err(InputError::DuplicateName(file.name.clone()));
            }
        }
        Ok(Self { files, args })
    }

    /// Read every path in order and build a run request.
    ///
    /// Nothing is sent anywhere until all files have been read.
    ///
    /// # Errors
    /// Returns error on the first unreadable file, or if validation fails.
    pub async fn from_paths<P: AsRef<Path>>(
        paths: &[P],
        args: Vec<String>,
    ) -> Result<Self, InputError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file = InputFile::read(path.as_ref()).await?;
            tracing::debug!(name = %file.name, bytes = file.content.len(), "Read input file");
            files.push(file);
        }
        Self::new(files, args)
    }

    /// Files in upload order.
    #[must_use]
    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    /// Arguments for the remote program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}
