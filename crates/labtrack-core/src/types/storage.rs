//! Transient folder and file snapshots returned by storage backends.
//!
//! These are never persisted or cached. Each call to a backend produces a
//! fresh snapshot owned by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;

/// How deep a folder listing descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingDepth {
    /// Only the folder's immediate children.
    #[default]
    Shallow,
    /// Every descendant.
    Recursive,
}

/// A file as currently present in a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageFile {
    /// File name.
    pub name: String,
    /// Backend-native path, without a trailing delimiter.
    pub path: String,
    /// Backend-declared identifier, for backends that have one.
    pub id: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if the backend reports it.
    pub last_modified: Option<DateTime<Utc>>,
    /// MIME type guessed from the extension or reported by the backend.
    pub mime_type: Option<String>,
    /// Web URL for backends that expose one.
    pub url: Option<String>,
}

impl StorageFile {
    /// Create a file snapshot, deriving the name from the path.
    pub fn new(file_path: &str, size: u64) -> Self {
        let file_path = path::file_path(file_path);
        Self {
            name: path::name_of(&file_path),
            mime_type: mime_from_path(&file_path),
            path: file_path,
            id: None,
            size,
            last_modified: None,
            url: None,
        }
    }

    /// Set the backend identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the modification time.
    pub fn with_last_modified(mut self, last_modified: Option<DateTime<Utc>>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Set the web URL.
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }
}

/// A folder as currently present in a backend, with its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageFolder {
    /// Folder name.
    pub name: String,
    /// Backend-native path, with a trailing delimiter.
    pub path: String,
    /// Backend-declared identifier, for backends that have one.
    pub id: Option<String>,
    /// Version tag of the folder itself, such as an object-store marker ETag.
    pub version: Option<String>,
    /// Last modification time, if the backend reports it.
    pub last_modified: Option<DateTime<Utc>>,
    /// Web URL for backends that expose one.
    pub url: Option<String>,
    /// Snapshot of the parent folder (without its children).
    pub parent: Option<Box<StorageFolder>>,
    /// Child folders, ordered by name.
    pub subfolders: Vec<StorageFolder>,
    /// Child files, ordered by name.
    pub files: Vec<StorageFile>,
}

impl StorageFolder {
    /// Create an empty folder snapshot, deriving the name from the path.
    pub fn new(folder_path: &str) -> Self {
        Self {
            name: path::name_of(folder_path),
            path: path::folder_path(folder_path),
            id: None,
            version: None,
            last_modified: None,
            url: None,
            parent: None,
            subfolders: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Set the backend identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the modification time.
    pub fn with_last_modified(mut self, last_modified: Option<DateTime<Utc>>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Set the version tag.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Set the web URL.
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    /// Attach a childless snapshot of the parent folder.
    pub fn with_parent(mut self, parent: StorageFolder) -> Self {
        self.parent = Some(Box::new(parent.without_children()));
        self
    }

    /// A copy of this snapshot with no children and no parent.
    pub fn without_children(&self) -> StorageFolder {
        StorageFolder {
            parent: None,
            subfolders: Vec::new(),
            files: Vec::new(),
            ..self.clone()
        }
    }

    /// Sort children by name, recursively.
    pub fn sort_children(&mut self) {
        self.subfolders.sort_by(|a, b| a.name.cmp(&b.name));
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
        for sub in &mut self.subfolders {
            sub.sort_children();
        }
    }

    /// Whether the folder has no children.
    pub fn is_empty(&self) -> bool {
        self.subfolders.is_empty() && self.files.is_empty()
    }

    /// Total size of the files in this snapshot, including nested folders.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum::<u64>()
            + self.subfolders.iter().map(|f| f.total_size()).sum::<u64>()
    }
}

/// Guess MIME type from a file path extension.
pub fn mime_from_path(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "fasta" | "fa" => "text/x-fasta",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => return None,
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_path_convention() {
        let folder = StorageFolder::new("/data/Acme/ProjectX");
        assert_eq!(folder.path, "/data/Acme/ProjectX/");
        assert_eq!(folder.name, "ProjectX");

        let file = StorageFile::new("teamA/plate.csv/", 12);
        assert_eq!(file.path, "teamA/plate.csv");
        assert_eq!(file.name, "plate.csv");
        assert_eq!(file.mime_type.as_deref(), Some("text/csv"));
    }

    #[test]
    fn test_parent_is_childless() {
        let mut parent = StorageFolder::new("teamA/");
        parent.files.push(StorageFile::new("teamA/a.txt", 1));
        let child = StorageFolder::new("teamA/sub/").with_parent(parent);
        assert!(child.parent.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_sort_and_size() {
        let mut root = StorageFolder::new("root/");
        root.files.push(StorageFile::new("root/b.txt", 2));
        root.files.push(StorageFile::new("root/a.txt", 3));
        let mut sub = StorageFolder::new("root/sub/");
        sub.files.push(StorageFile::new("root/sub/c.txt", 5));
        root.subfolders.push(sub);
        root.sort_children();
        assert_eq!(root.files[0].name, "a.txt");
        assert_eq!(root.total_size(), 10);
    }

    #[test]
    fn test_mime_detection() {
        assert_eq!(mime_from_path("file.pdf"), Some("application/pdf".into()));
        assert_eq!(mime_from_path("img.PNG"), Some("image/png".into()));
        assert_eq!(mime_from_path("noext"), None);
        assert_eq!(mime_from_path("dir.v2/noext"), None);
    }
}
