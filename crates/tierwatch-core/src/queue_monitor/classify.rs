//! Queue issue kinds and message classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known problematic statuses of a queued download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    NoFilesFound,
    SampleOnly,
    NotAnUpgrade,
    UnknownMedia,
    InvalidEpisodeMapping,
    ImportFailed,
    DownloadFailed,
    PathInvalid,
}

/// Lowercase substrings that identify each kind in free-text status messages.
const PATTERNS: &[(IssueKind, &[&str])] = &[
    (IssueKind::NoFilesFound, &["no files found", "eligible for import"]),
    (IssueKind::SampleOnly, &["sample"]),
    (IssueKind::NotAnUpgrade, &["not an upgrade", "existing file"]),
    (IssueKind::UnknownMedia, &["unknown series", "unknown movie"]),
    (
        IssueKind::InvalidEpisodeMapping,
        &["unexpected", "invalid season", "invalid episode", "unable to identify"],
    ),
    (
        IssueKind::ImportFailed,
        &["import failed", "failed to import", "no audio", "audio track"],
    ),
    (IssueKind::DownloadFailed, &["download failed", "failed to download"]),
    (IssueKind::PathInvalid, &["path not valid", "path does not exist"]),
];

impl IssueKind {
    pub const ALL: [IssueKind; 8] = [
        IssueKind::NoFilesFound,
        IssueKind::SampleOnly,
        IssueKind::NotAnUpgrade,
        IssueKind::UnknownMedia,
        IssueKind::InvalidEpisodeMapping,
        IssueKind::ImportFailed,
        IssueKind::DownloadFailed,
        IssueKind::PathInvalid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::NoFilesFound => "no-files-found",
            IssueKind::SampleOnly => "sample-only",
            IssueKind::NotAnUpgrade => "not-an-upgrade",
            IssueKind::UnknownMedia => "unknown-media",
            IssueKind::InvalidEpisodeMapping => "invalid-episode-mapping",
            IssueKind::ImportFailed => "import-failed",
            IssueKind::DownloadFailed => "download-failed",
            IssueKind::PathInvalid => "path-invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Kinds that always need a human: removing the download would not help.
    pub fn is_manual_only(self) -> bool {
        matches!(self, IssueKind::PathInvalid | IssueKind::NotAnUpgrade)
    }

    /// Classify status messages, in table order, without duplicates.
    pub fn from_messages<S: AsRef<str>>(messages: &[S]) -> Vec<IssueKind> {
        let text = messages
            .iter()
            .map(|m| m.as_ref().to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        PATTERNS
            .iter()
            .filter(|(_, needles)| needles.iter().any(|n| text.contains(n)))
            .map(|(kind, _)| *kind)
            .collect()
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
