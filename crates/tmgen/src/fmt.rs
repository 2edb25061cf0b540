//! formatting of generated code
use std::path::{Path, PathBuf};

/// Turns generated text into its canonical form
pub trait Format {
    /// `origin` is only used for diagnostics
    fn format(&self, text: &str, origin: &Path) -> Result<String, FormatError>;
}

/// Canonical hcl formatting: the text is parsed and printed again
#[derive(Debug, Default, Clone, Copy)]
pub struct HclFormat;

impl Format for HclFormat {
    fn format(&self, text: &str, origin: &Path) -> Result<String, FormatError> {
        let body: hcl::Body = hcl::parse(text).map_err(|source| FormatError {
            origin: origin.to_path_buf(),
            source,
        })?;

        hcl::format::to_string(&body).map_err(|source| FormatError {
            origin: origin.to_path_buf(),
            source,
        })
    }
}

#[derive(thiserror::Error, Debug)]
#[error("formatting code generated from {}", origin.display())]
pub struct FormatError {
    pub origin: PathBuf,
    #[source]
    pub source: hcl::Error,
}
