//! Format allow-lists and the conversion route table.
//!
//! Both sides of a conversion are checked against fixed allow-lists before a
//! single byte touches the disk. The target side arrives as an engine
//! *directive*: `pdf`, or `pdf:writer_pdf_Export` when the caller wants a
//! specific export filter. Only the part before the first `:` names the
//! extension; the whole directive is handed to the engine untouched.
//!
//! Some format pairs cannot be converted directly because the engine opens
//! the input in a module that has no export filter for the target (a PDF opens
//! in Draw, and Draw cannot write plain text). [`route_for`] returns a
//! [`ConversionRoute::TwoPhase`] for those pairs so the orchestrator goes
//! through an editable intermediate document first.

use crate::error::DocConvError;

/// Extensions (lower-case, with leading dot) accepted as input.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &[
    ".doc", ".docx", ".wps", ".txt", ".html", ".htm", ".xml", ".pdf",
];

/// Target extensions (lower-case, no dot) that may be requested.
pub const SUPPORTED_OUTPUT_FORMATS: &[&str] = &[
    "txt", "doc", "docx", "rtf", "odt", // documents
    "xls", "xlsx", "ods", "csv", // spreadsheets
    "ppt", "pptx", "odp", // presentations
    "html", "htm", "xml", "json", // markup
    "jpg", "jpeg", "png", "gif", "pdf", // images / export
];

/// Target used when the request does not name one.
pub const DEFAULT_TARGET: &str = "txt";

/// A validated target directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFormat {
    directive: String,
    extension: String,
}

impl TargetFormat {
    /// Parse and validate a raw format string. Empty or whitespace-only input
    /// selects [`DEFAULT_TARGET`].
    pub fn parse(raw: Option<&str>) -> Result<Self, DocConvError> {
        let directive = match raw.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => DEFAULT_TARGET.to_string(),
        };
        let extension = directive
            .split(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if !SUPPORTED_OUTPUT_FORMATS.contains(&extension.as_str()) {
            return Err(DocConvError::UnsupportedOutputFormat { format: extension });
        }
        Ok(Self {
            directive,
            extension,
        })
    }

    /// Full directive for the engine, e.g. `pdf:writer_pdf_Export`.
    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Lower-case extension without dot, e.g. `pdf`.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Plain-text targets get their content inlined in the response.
    pub fn is_plain_text(&self) -> bool {
        self.extension == "txt"
    }
}

/// Lower-case extension of `filename` including the leading dot, or an empty
/// string when there is none. Only the final path component is considered,
/// with both `/` and `\` treated as separators.
pub fn input_extension(filename: &str) -> String {
    let name = base_file_name(filename);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Validate the uploaded filename's extension against the input allow-list.
pub fn validate_input(filename: &str) -> Result<String, DocConvError> {
    if filename.trim().is_empty() {
        return Err(DocConvError::EmptyFilename);
    }
    let ext = input_extension(filename);
    if SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(DocConvError::UnsupportedInputFormat { extension: ext })
    }
}

/// Final path component of a user-supplied name (browsers on Windows send
/// `C:\Users\...\report.docx`).
pub(crate) fn base_file_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

/// The plan for turning one format into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionRoute {
    /// One engine invocation with the requested directive.
    Direct,
    /// Convert to an editable intermediate first, then to the target.
    TwoPhase(IntermediateStep),
}

/// The first leg of a two-phase conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateStep {
    /// Directive for the first invocation, e.g. `odt`.
    pub directive: &'static str,
    /// Extension to look for after the first invocation.
    pub extension: &'static str,
    /// Engine import filter used to open the original input.
    pub input_filter: Option<&'static str>,
}

struct FallbackRule {
    input: &'static str,
    target: &'static str,
    step: IntermediateStep,
}

const FALLBACK_RULES: &[FallbackRule] = &[FallbackRule {
    input: ".pdf",
    target: "txt",
    step: IntermediateStep {
        directive: "odt",
        extension: "odt",
        input_filter: Some("writer_pdf_import"),
    },
}];

/// Decide whether `input_ext` → `target` needs the intermediate-format path.
pub fn route_for(input_ext: &str, target: &TargetFormat) -> ConversionRoute {
    FALLBACK_RULES
        .iter()
        .find(|r| r.input == input_ext && r.target == target.extension())
        .map(|r| ConversionRoute::TwoPhase(r.step.clone()))
        .unwrap_or(ConversionRoute::Direct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_is_txt() {
        let t = TargetFormat::parse(None).unwrap();
        assert_eq!(t.extension(), "txt");
        assert_eq!(t.directive(), "txt");
        assert!(t.is_plain_text());

        let t = TargetFormat::parse(Some("   ")).unwrap();
        assert_eq!(t.extension(), "txt");
    }

    #[test]
    fn directive_keeps_filter_name() {
        let t = TargetFormat::parse(Some("PDF:writer_pdf_Export")).unwrap();
        assert_eq!(t.extension(), "pdf");
        assert_eq!(t.directive(), "PDF:writer_pdf_Export");
        assert!(!t.is_plain_text());
    }

    #[test]
    fn rejects_unknown_output() {
        let err = TargetFormat::parse(Some("exe")).unwrap_err();
        assert!(matches!(
            err,
            DocConvError::UnsupportedOutputFormat { ref format } if format == "exe"
        ));
    }

    #[test]
    fn input_extension_cases() {
        assert_eq!(input_extension("Report.DOCX"), ".docx");
        assert_eq!(input_extension("archive.tar.PDF"), ".pdf");
        assert_eq!(input_extension("README"), "");
        assert_eq!(input_extension(".bashrc"), "");
        assert_eq!(input_extension(r"C:\Users\me\notes.txt"), ".txt");
        assert_eq!(input_extension("dir.d/file"), "");
    }

    #[test]
    fn validate_input_cases() {
        assert_eq!(validate_input("a.pdf").unwrap(), ".pdf");
        assert!(matches!(
            validate_input("setup.exe"),
            Err(DocConvError::UnsupportedInputFormat { .. })
        ));
        assert!(matches!(validate_input(""), Err(DocConvError::EmptyFilename)));
        assert!(matches!(
            validate_input("noext"),
            Err(DocConvError::UnsupportedInputFormat { .. })
        ));
    }

    #[test]
    fn pdf_to_txt_is_two_phase() {
        let txt = TargetFormat::parse(Some("txt")).unwrap();
        match route_for(".pdf", &txt) {
            ConversionRoute::TwoPhase(step) => {
                assert_eq!(step.extension, "odt");
                assert_eq!(step.input_filter, Some("writer_pdf_import"));
            }
            other => panic!("expected two-phase, got {other:?}"),
        }
        assert_eq!(route_for(".docx", &txt), ConversionRoute::Direct);

        let pdf = TargetFormat::parse(Some("pdf")).unwrap();
        assert_eq!(route_for(".pdf", &pdf), ConversionRoute::Direct);
    }

    #[test]
    fn two_phase_matches_extension_not_directive() {
        let txt = TargetFormat::parse(Some("txt:Text (encoded):UTF8")).unwrap();
        assert!(matches!(route_for(".pdf", &txt), ConversionRoute::TwoPhase(_)));
    }
}
