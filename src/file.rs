// File descriptors — server-known metadata for a previewable item.

use serde::{Deserialize, Serialize};

/// One renderable form of a file's content, referenced by a templated URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    pub rep_type: String,
    pub content_url_template: String,
}

impl Representation {
    pub fn new(rep_type: impl Into<String>, content_url_template: impl Into<String>) -> Self {
        Self {
            rep_type: rep_type.into(),
            content_url_template: content_url_template.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub can_preview: bool,
    #[serde(default)]
    pub can_download: bool,
    #[serde(default)]
    pub can_annotate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Preview,
    Download,
    Annotate,
}

/// Server-provided metadata record for one previewable file.
///
/// `version` is an opaque content fingerprint (e.g. a hash); two descriptors
/// for the same id with different fingerprints mean the content changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub watermarked: bool,
    #[serde(default)]
    pub representations: Vec<Representation>,
}

impl FileDescriptor {
    /// Placeholder holding only the identifier, used before the first fetch
    /// completes. Never valid for rendering.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extension: String::new(),
            version: String::new(),
            permissions: None,
            watermarked: false,
            representations: Vec::new(),
        }
    }

    /// A descriptor can be rendered only if it carries a permission set and at
    /// least one representation. Re-evaluated on every use, never cached.
    pub fn is_valid(&self) -> bool {
        self.permissions.is_some() && !self.representations.is_empty()
    }

    pub fn allows(&self, permission: Permission) -> bool {
        let Some(perms) = self.permissions else {
            return false;
        };
        match permission {
            Permission::Preview => perms.can_preview,
            Permission::Download => perms.can_download,
            Permission::Annotate => perms.can_annotate,
        }
    }

    /// First representation whose type matches, if any.
    pub fn representation(&self, rep_type: &str) -> Option<&Representation> {
        self.representations.iter().find(|r| r.rep_type == rep_type)
    }
}
