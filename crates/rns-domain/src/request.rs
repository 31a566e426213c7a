//! Task requests - the semantic payload a prompt is built from

/// Descriptive metadata gathered for a file by the extraction plugins
///
/// Every field is optional; the prompt builder skips whatever is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// File extension without the leading dot (e.g. `pdf`)
    pub extension: Option<String>,

    /// Document title
    pub title: Option<String>,

    /// Keywords or tags
    pub keywords: Vec<String>,

    /// Short summary of the content (preferred over `description`)
    pub summary: Option<String>,

    /// Longer free-form description
    pub description: Option<String>,

    /// Image or video caption
    pub caption: Option<String>,

    /// Text recovered by OCR
    pub ocr_text: Option<String>,

    /// Note about how the caption was produced
    pub caption_note: Option<String>,

    /// Human-readable file type (e.g. `PDF document`)
    pub filetype_hint: Option<String>,
}

impl FileMetadata {
    /// Metadata carrying only an extension
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
            ..Self::default()
        }
    }

    /// Set the title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the summary
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// The summary if present, otherwise the description
    pub fn summary_or_description(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.description.as_deref())
    }
}

/// Request for a new file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    /// The file's current name, including extension
    pub current_name: String,

    /// Extracted metadata
    pub metadata: FileMetadata,

    /// Optional user/folder context (e.g. "Biology class")
    pub context: Option<String>,
}

impl RenameRequest {
    /// Create a request without context
    pub fn new(current_name: impl Into<String>, metadata: FileMetadata) -> Self {
        Self {
            current_name: current_name.into(),
            metadata,
            context: None,
        }
    }

    /// Attach a context string
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Extension from the metadata, falling back to the current name's suffix
    pub fn extension(&self) -> Option<String> {
        self.metadata
            .extension
            .as_deref()
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .or_else(|| {
                self.current_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
                    .filter(|ext| !ext.is_empty() && !ext.contains(' '))
            })
    }
}

/// Request to decide what happens to the original stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemActionRequest {
    /// The original file stem (name without extension)
    pub original_stem: String,

    /// The name suggested by a previous rename
    pub suggested_name: String,

    /// Extension, if known
    pub extension: Option<String>,
}

impl StemActionRequest {
    /// Create a request without an extension
    pub fn new(original_stem: impl Into<String>, suggested_name: impl Into<String>) -> Self {
        Self {
            original_stem: original_stem.into(),
            suggested_name: suggested_name.into(),
            extension: None,
        }
    }
}

/// One file as presented to the sort task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Full path; used as the key of the result mapping
    pub path: String,

    /// File name
    pub name: String,

    /// Extension without the leading dot
    pub extension: String,

    /// Short description of the content
    pub description: String,
}

/// Request to assign one of a fixed set of categories to a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortRequest {
    /// The file to categorize
    pub file: FileDescriptor,

    /// The closed set of categories the answer must come from
    pub allowed_categories: Vec<String>,

    /// Optional user/folder context
    pub context: Option<String>,
}

/// One semantic request to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Suggest a new file name
    Rename(RenameRequest),

    /// Decide whether to keep, normalize, or drop the original stem
    StemAction(StemActionRequest),

    /// Assign a category
    Sort(SortRequest),
}

impl Task {
    /// Label used as the base of the transport `purpose` string
    pub fn label(&self) -> &'static str {
        match self {
            Task::Rename(_) => "rename",
            Task::StemAction(_) => "stem action",
            Task::Sort(_) => "sort",
        }
    }
}
