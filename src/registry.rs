// Viewer registry — ordered capability descriptors mapping file types to
// renderer kinds and representations.

use std::collections::HashSet;

use crate::file::{FileDescriptor, Representation};

/// Closed set of renderer families the engine can dispatch to. `Error` backs
/// the error surface shown for fatal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    Document,
    Presentation,
    Image,
    ImageCollection,
    Media,
    Model3d,
    Text,
    Office,
    Error,
}

/// One concrete viewer a loader can pick: claims a set of extensions and
/// requires a matching representation on the file.
#[derive(Debug, Clone)]
pub struct ViewerCapability {
    pub name: String,
    pub kind: RendererKind,
    pub extensions: Vec<String>,
    pub representation: String,
}

impl ViewerCapability {
    pub fn new(
        name: impl Into<String>,
        kind: RendererKind,
        extensions: &[&str],
        representation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            representation: representation.into(),
        }
    }

    fn matches(&self, file: &FileDescriptor, disabled: &HashSet<String>) -> bool {
        !disabled.contains(&self.name)
            && self.extensions.iter().any(|e| *e == file.extension)
            && file.representation(&self.representation).is_some()
    }
}

/// A capability record: an ordered list of viewers sharing asset concerns.
/// Loaders are immutable after registration.
#[derive(Debug, Clone)]
pub struct Loader {
    pub name: String,
    viewers: Vec<ViewerCapability>,
}

impl Loader {
    pub fn new(name: impl Into<String>, viewers: Vec<ViewerCapability>) -> Self {
        Self {
            name: name.into(),
            viewers,
        }
    }

    pub fn can_load(&self, file: &FileDescriptor, disabled: &HashSet<String>) -> bool {
        self.determine_viewer(file, disabled).is_some()
    }

    /// First viewer claiming the file's extension that is not disabled and
    /// whose required representation the file carries. Pure function of its
    /// inputs so the prefetch path can call it without side effects.
    pub fn determine_viewer(
        &self,
        file: &FileDescriptor,
        disabled: &HashSet<String>,
    ) -> Option<&ViewerCapability> {
        self.viewers.iter().find(|v| v.matches(file, disabled))
    }

    pub fn determine_representation<'a>(
        &self,
        file: &'a FileDescriptor,
        viewer: &ViewerCapability,
    ) -> Option<&'a Representation> {
        file.representation(&viewer.representation)
    }

    pub fn viewers(&self) -> &[ViewerCapability] {
        &self.viewers
    }
}

/// Ordered list of loaders; first match wins. Caller-supplied loaders are
/// prepended to the built-ins at construction.
pub struct ViewerRegistry {
    loaders: Vec<Loader>,
}

impl ViewerRegistry {
    pub fn new(custom: Vec<Loader>) -> Self {
        let mut loaders = custom;
        loaders.extend(builtin_loaders());
        Self { loaders }
    }

    /// First loader (in registration order) that claims the file. `None` is a
    /// fatal unsupported-format condition for the session.
    pub fn determine_loader(
        &self,
        file: &FileDescriptor,
        disabled: &HashSet<String>,
    ) -> Option<&Loader> {
        self.loaders.iter().find(|l| l.can_load(file, disabled))
    }

    /// Every viewer capability across all loaders, in match order.
    pub fn viewers(&self) -> impl Iterator<Item = &ViewerCapability> {
        self.loaders.iter().flat_map(|l| l.viewers().iter())
    }
}

impl Default for ViewerRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Built-in loaders, tried in this order after any caller-supplied ones.
/// The office viewer exists but is disabled by default.
pub fn builtin_loaders() -> Vec<Loader> {
    vec![
        Loader::new(
            "office",
            vec![ViewerCapability::new(
                "office",
                RendererKind::Office,
                &["xlsx", "xlsm", "xlsb"],
                "office",
            )],
        ),
        Loader::new(
            "document",
            vec![
                ViewerCapability::new(
                    "presentation",
                    RendererKind::Presentation,
                    &["ppt", "pptx", "odp"],
                    "pdf",
                ),
                ViewerCapability::new(
                    "document",
                    RendererKind::Document,
                    &["pdf", "doc", "docx", "odt", "rtf", "xls", "xlsx"],
                    "pdf",
                ),
            ],
        ),
        Loader::new(
            "media",
            vec![
                ViewerCapability::new(
                    "dash",
                    RendererKind::Media,
                    &["mp4", "m4v", "mov", "mkv", "webm"],
                    "dash",
                ),
                ViewerCapability::new(
                    "mp4",
                    RendererKind::Media,
                    &["mp4", "m4v", "mov", "mkv", "webm"],
                    "mp4",
                ),
                ViewerCapability::new(
                    "mp3",
                    RendererKind::Media,
                    &["mp3", "m4a", "wav", "flac", "ogg"],
                    "mp3",
                ),
            ],
        ),
        Loader::new(
            "image",
            vec![
                ViewerCapability::new(
                    "multi-image",
                    RendererKind::ImageCollection,
                    &["tif", "tiff"],
                    "png",
                ),
                ViewerCapability::new(
                    "image",
                    RendererKind::Image,
                    &["png", "jpg", "jpeg", "gif", "bmp", "svg"],
                    "png",
                ),
            ],
        ),
        Loader::new(
            "model3d",
            vec![ViewerCapability::new(
                "model3d",
                RendererKind::Model3d,
                &["box3d", "fbx", "obj", "stl", "dae"],
                "3d",
            )],
        ),
        Loader::new(
            "text",
            vec![ViewerCapability::new(
                "text",
                RendererKind::Text,
                &["txt", "md", "csv", "log", "json", "xml", "html", "js", "py", "rs", "c", "java"],
                "text",
            )],
        ),
    ]
}
