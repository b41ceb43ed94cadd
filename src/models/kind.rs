use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Job types offered by the dashboard, one per processing page.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    YoutubeSummary,
    Summarize,
    PdfEdit,
    ConvertFile,
    Writer,
    Flashcards,
    Presentation,
}

impl JobKind {
    /// Endpoint that accepts a new job of this kind.
    pub fn submit_path(self) -> &'static str {
        match self {
            Self::YoutubeSummary => "/api/youtube/summarize",
            Self::Summarize => "/api/summarize",
            Self::PdfEdit => "/api/pdf/edit",
            Self::ConvertFile => "/api/convert",
            Self::Writer => "/api/writer/generate",
            Self::Flashcards => "/api/flashcards/generate",
            Self::Presentation => "/api/presentations/generate",
        }
    }

    /// Status endpoint, used when the backend supplied no `poll_url`. The
    /// job id is appended as the last path segment.
    pub fn status_endpoint(self) -> &'static str {
        match self {
            Self::YoutubeSummary => "/api/youtube/status",
            Self::Summarize => "/api/summarize/status",
            Self::PdfEdit => "/api/pdf/jobs",
            Self::ConvertFile => "/api/convert/status",
            Self::Writer => "/api/writer/status",
            Self::Flashcards => "/api/flashcards/status",
            Self::Presentation => "/api/presentations/status",
        }
    }

    /// Dedicated result endpoint, job id appended like the status endpoint.
    /// `None` means the result rides on the terminal status body.
    pub fn result_endpoint(self) -> Option<&'static str> {
        match self {
            Self::YoutubeSummary => Some("/api/youtube/result"),
            Self::Summarize => Some("/api/summarize/result"),
            Self::ConvertFile => Some("/api/convert/result"),
            Self::Writer => Some("/api/writer/result"),
            Self::Flashcards => Some("/api/flashcards/result"),
            Self::PdfEdit | Self::Presentation => None,
        }
    }

    /// Keys whose presence marks an object as this kind's result payload.
    pub fn expected_keys(self) -> &'static [&'static str] {
        match self {
            Self::YoutubeSummary => &["summary", "transcript"],
            Self::Summarize => &["summary"],
            Self::PdfEdit | Self::ConvertFile => &["download_url", "download_urls", "file_url"],
            Self::Writer => &["content", "text", "summary"],
            Self::Flashcards => &["flashcards", "cards"],
            Self::Presentation => &["slides", "download_url", "download_urls"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_kind_parses_kebab_case() {
        assert_eq!(JobKind::from_str("convert-file").unwrap(), JobKind::ConvertFile);
        assert_eq!(JobKind::from_str("youtube-summary").unwrap(), JobKind::YoutubeSummary);
        assert!(JobKind::from_str("ConvertFile").is_err());
        assert_eq!(JobKind::PdfEdit.to_string(), "pdf-edit");
    }

    #[test]
    fn test_every_kind_has_expected_keys() {
        for kind in JobKind::iter() {
            assert!(!kind.expected_keys().is_empty(), "{} has no result keys", kind);
            assert!(kind.status_endpoint().starts_with("/api/"));
        }
    }

    #[test]
    fn test_inline_result_kinds() {
        assert_eq!(JobKind::PdfEdit.result_endpoint(), None);
        assert_eq!(JobKind::Presentation.result_endpoint(), None);
        assert_eq!(JobKind::ConvertFile.result_endpoint(), Some("/api/convert/result"));
    }
}
