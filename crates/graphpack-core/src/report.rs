#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    ManifestMissing,
    ManifestUnreadable,
    ManifestRecordSkipped,
    UnreadableEntry,
    InvalidGraphFile,
    UnrecognizedPath,
    DuplicateGraphId,
    MissingGraphId,
    MissingGraphFile,
    DuplicateManifestEntry,
    MissingGraphBody,
    OrphanGraphBody,
}

str_enum!(WarningKind {
    ManifestMissing => "manifest_missing",
    ManifestUnreadable => "manifest_unreadable",
    ManifestRecordSkipped => "manifest_record_skipped",
    UnreadableEntry => "unreadable_entry",
    InvalidGraphFile => "invalid_graph_file",
    UnrecognizedPath => "unrecognized_path",
    DuplicateGraphId => "duplicate_graph_id",
    MissingGraphId => "missing_graph_id",
    MissingGraphFile => "missing_graph_file",
    DuplicateManifestEntry => "duplicate_manifest_entry",
    MissingGraphBody => "missing_graph_body",
    OrphanGraphBody => "orphan_graph_body",
});

/// One skipped or repaired item, reported after an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveWarning {
    pub kind: WarningKind,
    /// Archive file name or graph id the warning is about.
    pub subject: String,
    pub message: String,
}

impl ArchiveWarning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        let warning = ArchiveWarning {
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        tracing::warn!(kind = warning.kind.as_str(), subject = %warning.subject, "{}", warning.message);
        warning
    }
}

impl std::fmt::Display for ArchiveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}
