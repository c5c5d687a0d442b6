/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the picker, the uploader and the UI layer.
use std::path::{Path, PathBuf};

/// A local image chosen by the user but not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    path: PathBuf,
}

impl SelectedImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full path to the local file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The reference as a string, used to derive the upload key
    pub fn reference(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}
