//! collection of hcl documents of one directory ([Body], source path and text)
//!
//! [HclDocuments] tracks
//! - the source path and text (needed to turn spans into line/column [Range]s)
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
use crate::info::Range;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::path::{Path, PathBuf};

/// File name suffixes of configuration files
pub const CONFIG_SUFFIXES: &[&str] = &[".tm", ".tm.hcl"];

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

/// Path and text of a loaded document
#[derive(Debug, Default)]
pub struct Source {
    pub path: PathBuf,
    pub text: String,
}

impl Source {
    pub fn range(&self, span: Option<std::ops::Range<usize>>) -> Range {
        Range::from_span(&self.path, &self.text, span)
    }
}

impl HclDocuments {
    /// Parses, inserts and indexes an hcl document
    pub fn insert_source(
        &mut self,
        text: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<(), LoadError> {
        let text = text.into();
        let path = path.into();
        let body = hcl_edit::parser::parse_body(&text).map_err(|source| LoadError::HclParseFailed {
            path: path.clone(),
            source,
        })?;

        self.insert(body, Source { path, text });
        Ok(())
    }

    /// Inserts and indexes an already parsed document
    pub fn insert(&mut self, document: Body, source: Source) {
        let source_index = self.sources.len();
        self.sources.push(source);

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .map(|(source_index, attribute)| (&self.sources[*source_index], attribute))
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .map(|(source_index, block)| (&self.sources[*source_index], block))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl HclDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(file_path)?;
        self.insert_source(file_contents, file_path)
    }

    /// Load all configuration files of a directory (not recursive)
    ///
    /// Files are loaded in file name order so indices are reproducible.
    /// A directory without configuration files yields no documents, which is not an error.
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        let read_dir = std::fs::read_dir(dir_path)?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') || !is_config_file(&file_name) {
                continue;
            }

            file_paths.push(dir_entry.path());
        }

        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

pub fn is_config_file(file_name: &str) -> bool {
    CONFIG_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file {}", path.display())]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document
/// ```
/// # use tmgen::hcl_documents;
/// hcl_documents!("attribute = 42");
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use tmgen::hcl_documents;
/// hcl_documents! {
///   "one.tm" => "attribute_one = 1",
///   "two.tm" => "attribute_two = 2"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tmgen::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document without source
    { $expr:expr } => {
        {
            let mut docs = $crate::hcl_documents::HclDocuments::default();
            docs.insert_source($expr, "").expect("body must parse");
            docs
        }
    };
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {
        {
            let mut docs = $crate::hcl_documents::HclDocuments::default();
            $(
                docs.insert_source($expr, $source).expect("body must parse");
            )+
            docs
        }
    };
}

pub type SourceAttribute<'a> = (&'a Source, &'a Attribute);
pub type SourceBlock<'a> = (&'a Source, &'a Block);
