//! project configuration
//!
//! Every directory below the project root may contain configuration files. Their root blocks are
//! validated into a [ConfigNode]; all nodes together form the [Root].
//!
//! Recognized root blocks:
//! - `stack`: marks the directory as a stack
//! - `globals`: values inherited by every stack below the directory
//! - `generate_hcl`: code generated into every stack below the directory
//!
//! Other root blocks belong to features this tool does not implement and are skipped.
use crate::ast::{self, Attribute, Block};
use crate::errors::{display_list, ErrorList};
use crate::eval::Evaluator;
use crate::hcl_documents::{HclDocuments, LoadError};
use crate::info::Range;
use crate::project::ProjectPath;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const STACK: &str = "stack";
const GLOBALS: &str = "globals";
const GENERATE_HCL: &str = "generate_hcl";

/// Root blocks that are valid but not used for generation
const IGNORED_BLOCKS: &[&str] = &["terramate", "import", "generate_file", "script", "vendor", "assert"];

/// Stack attributes that only matter for ordering and change detection
const IGNORED_STACK_ATTRIBUTES: &[&str] = &["after", "before", "wants", "wanted_by", "watch"];

/// All configuration of a project, by directory
#[derive(Debug, Default)]
pub struct Root {
    host_dir: PathBuf,
    nodes: BTreeMap<ProjectPath, ConfigNode>,
}

/// Configuration of a single directory
#[derive(Debug, Default)]
pub struct ConfigNode {
    pub stack: Option<StackConfig>,
    /// attributes of all `globals` blocks, in source order
    pub globals: Vec<Attribute>,
    pub generate_hcl: Vec<GenHclBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub id: Option<String>,
    pub tags: Vec<String>,
    pub range: Range,
}

/// A `generate_hcl "<label>" { ... }` block
#[derive(Debug, Clone)]
pub struct GenHclBlock {
    /// file name, relative to the stack
    pub label: String,
    pub range: Range,
    /// attributes of all `lets` blocks
    pub lets: Vec<Attribute>,
    pub condition: Option<Attribute>,
    pub asserts: Vec<AssertConfig>,
    pub content: ast::Body,
}

/// An `assert` block
#[derive(Debug, Clone)]
pub struct AssertConfig {
    pub assertion: Attribute,
    pub message: Attribute,
    pub warning: Option<Attribute>,
    pub range: Range,
}

impl Root {
    pub fn new(host_dir: impl Into<PathBuf>) -> Self {
        Self {
            host_dir: host_dir.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Load the configuration of every directory below `host_dir`
    ///
    /// Hidden directories (starting with `.`) are skipped.
    #[tracing::instrument(level = "debug", skip_all, fields(root = %host_dir.display()))]
    pub fn load(host_dir: &Path) -> Result<Self, RootError> {
        let mut root = Self::new(host_dir);
        let mut pending = vec![host_dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut documents = HclDocuments::default();
            documents
                .load_directory(&dir)
                .map_err(|source| RootError::Load {
                    dir: dir.clone(),
                    source,
                })?;

            let project_dir = ProjectPath::from_host(host_dir, &dir).unwrap_or_else(ProjectPath::root);
            if documents.source_count() > 0 {
                root.insert_documents(project_dir, &documents)
                    .map_err(|source| RootError::Config {
                        dir: dir.clone(),
                        source,
                    })?;
            }

            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                if entry.file_type()?.is_dir() && !hidden {
                    pending.push(entry.path());
                }
            }
        }

        tracing::debug!(directories = root.nodes.len(), "configuration loaded");
        Ok(root)
    }

    /// Validate `documents` as the configuration of `dir`
    pub fn insert_documents(
        &mut self,
        dir: ProjectPath,
        documents: &HclDocuments,
    ) -> Result<(), ConfigErrors> {
        let node = ConfigNode::parse(documents)?;
        self.nodes.insert(dir, node);
        Ok(())
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    /// Configuration of `dir`, if it has any
    pub fn lookup(&self, dir: &ProjectPath) -> Option<&ConfigNode> {
        self.nodes.get(dir)
    }

    /// All directories with configuration, in path order
    pub fn nodes(&self) -> impl Iterator<Item = (&ProjectPath, &ConfigNode)> {
        self.nodes.iter()
    }

    /// All stacks, in path order
    pub fn stacks(&self) -> impl Iterator<Item = (&ProjectPath, &StackConfig)> {
        self.nodes
            .iter()
            .filter_map(|(dir, node)| node.stack.as_ref().map(|stack| (dir, stack)))
    }
}

impl ConfigNode {
    /// Validate the root blocks of one directory
    ///
    /// Every issue is reported, not just the first one.
    pub fn parse(documents: &HclDocuments) -> Result<Self, ConfigErrors> {
        let mut node = ConfigNode::default();
        let mut errors = ErrorList::new();

        for (source, attribute) in documents.attributes() {
            let attribute = Attribute::lower(source, attribute);
            errors.add(ConfigError::RootAttribute {
                name: attribute.name,
                range: attribute.range,
            });
        }

        for (source, block) in documents.blocks() {
            let block = Block::lower(source, block);
            match block.ident.as_str() {
                STACK => {
                    if let Some(existing) = &node.stack {
                        errors.add(ConfigError::DuplicateBlock {
                            name: STACK.to_string(),
                            existing: existing.range.clone(),
                            range: block.range.clone(),
                        });
                        continue;
                    }
                    node.stack = parse_stack(&block, &mut errors);
                }
                GLOBALS => parse_globals(&block, &mut node.globals, &mut errors),
                GENERATE_HCL => {
                    if let Some(generate_hcl) = parse_generate_hcl(block, &mut errors) {
                        node.generate_hcl.push(generate_hcl);
                    }
                }
                name if IGNORED_BLOCKS.contains(&name) => {
                    tracing::debug!(block = %name, range = %block.range, "ignoring block");
                }
                name => errors.add(ConfigError::UnsupportedBlock {
                    parent: None,
                    name: name.to_string(),
                    range: block.range.clone(),
                }),
            }
        }

        errors.finalize().map_err(ConfigErrors)?;
        Ok(node)
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_none() && self.globals.is_empty() && self.generate_hcl.is_empty()
    }
}

fn check_labels(block: &Block, expected: usize, errors: &mut ErrorList<ConfigError>) -> bool {
    if block.labels.len() == expected {
        return true;
    }

    errors.add(ConfigError::LabelCount {
        block: block.ident.clone(),
        expected,
        found: block.labels.len(),
        range: block.labels_range.clone(),
    });
    false
}

/// Value of a stack attribute; these are plain literals
fn literal(attribute: &Attribute, errors: &mut ErrorList<ConfigError>) -> Option<hcl::Value> {
    let value = Evaluator::new().eval(&attribute.expr).map_err(|source| ConfigError::InvalidValue {
        block: STACK.to_string(),
        name: attribute.name.clone(),
        message: source.to_string(),
        range: attribute.expr_range.clone(),
    });
    errors.add_result(value)
}

fn literal_string(attribute: &Attribute, errors: &mut ErrorList<ConfigError>) -> Option<String> {
    match literal(attribute, errors)? {
        hcl::Value::String(s) => Some(s),
        other => {
            errors.add(ConfigError::InvalidValue {
                block: STACK.to_string(),
                name: attribute.name.clone(),
                message: format!("must be a string, got {}", crate::eval::type_name(&other)),
                range: attribute.expr_range.clone(),
            });
            None
        }
    }
}

fn parse_stack(block: &Block, errors: &mut ErrorList<ConfigError>) -> Option<StackConfig> {
    let mut stack = StackConfig {
        range: block.range.clone(),
        ..Default::default()
    };

    check_labels(block, 0, errors);
    for nested in &block.body.blocks {
        errors.add(ConfigError::UnsupportedBlock {
            parent: Some(STACK.to_string()),
            name: nested.ident.clone(),
            range: nested.range.clone(),
        });
    }

    for attribute in &block.body.attributes {
        match attribute.name.as_str() {
            "name" => stack.name = literal_string(attribute, errors),
            "description" => stack.description = literal_string(attribute, errors),
            "id" => stack.id = literal_string(attribute, errors),
            "tags" => match literal(attribute, errors) {
                Some(hcl::Value::Array(tags)) => {
                    for tag in tags {
                        match tag {
                            hcl::Value::String(tag) => stack.tags.push(tag),
                            other => errors.add(ConfigError::InvalidValue {
                                block: STACK.to_string(),
                                name: attribute.name.clone(),
                                message: format!(
                                    "tags must be strings, got {}",
                                    crate::eval::type_name(&other)
                                ),
                                range: attribute.expr_range.clone(),
                            }),
                        }
                    }
                }
                Some(other) => errors.add(ConfigError::InvalidValue {
                    block: STACK.to_string(),
                    name: attribute.name.clone(),
                    message: format!("must be a list, got {}", crate::eval::type_name(&other)),
                    range: attribute.expr_range.clone(),
                }),
                None => {}
            },
            name if IGNORED_STACK_ATTRIBUTES.contains(&name) => {
                tracing::debug!(attribute = %name, "ignoring stack attribute");
            }
            name => errors.add(ConfigError::UnsupportedAttribute {
                block: STACK.to_string(),
                name: name.to_string(),
                range: attribute.range.clone(),
            }),
        }
    }

    Some(stack)
}

fn parse_globals(block: &Block, globals: &mut Vec<Attribute>, errors: &mut ErrorList<ConfigError>) {
    check_labels(block, 0, errors);
    for nested in &block.body.blocks {
        errors.add(ConfigError::UnsupportedBlock {
            parent: Some(GLOBALS.to_string()),
            name: nested.ident.clone(),
            range: nested.range.clone(),
        });
    }

    for attribute in &block.body.attributes {
        if let Some(existing) = globals.iter().find(|g| g.name == attribute.name) {
            errors.add(ConfigError::DuplicateAttribute {
                block: GLOBALS.to_string(),
                name: attribute.name.clone(),
                existing: existing.range.clone(),
                range: attribute.range.clone(),
            });
            continue;
        }
        globals.push(attribute.clone());
    }
}

fn parse_generate_hcl(block: Block, errors: &mut ErrorList<ConfigError>) -> Option<GenHclBlock> {
    let labels_ok = check_labels(&block, 1, errors);

    let mut condition = None;
    for attribute in block.body.attributes {
        match attribute.name.as_str() {
            "condition" => condition = Some(attribute),
            name => errors.add(ConfigError::UnsupportedAttribute {
                block: GENERATE_HCL.to_string(),
                name: name.to_string(),
                range: attribute.range.clone(),
            }),
        }
    }

    let mut lets = vec![];
    let mut asserts = vec![];
    let mut content: Option<Block> = None;
    for nested in block.body.blocks {
        match nested.ident.as_str() {
            "lets" => {
                check_labels(&nested, 0, errors);
                parse_lets(&nested, &mut lets, errors);
            }
            "assert" => {
                if let Some(assert) = parse_assert(&nested, errors) {
                    asserts.push(assert);
                }
            }
            "content" => {
                check_labels(&nested, 0, errors);
                if let Some(existing) = &content {
                    errors.add(ConfigError::DuplicateBlock {
                        name: "content".to_string(),
                        existing: existing.range.clone(),
                        range: nested.range.clone(),
                    });
                    continue;
                }
                content = Some(nested);
            }
            name => errors.add(ConfigError::UnsupportedBlock {
                parent: Some(GENERATE_HCL.to_string()),
                name: name.to_string(),
                range: nested.range.clone(),
            }),
        }
    }

    let Some(content) = content else {
        errors.add(ConfigError::MissingBlock {
            block: GENERATE_HCL.to_string(),
            name: "content".to_string(),
            range: block.range.clone(),
        });
        return None;
    };

    if !labels_ok {
        return None;
    }

    Some(GenHclBlock {
        label: block.labels[0].clone(),
        range: block.range,
        lets,
        condition,
        asserts,
        content: content.body,
    })
}

fn parse_lets(block: &Block, lets: &mut Vec<Attribute>, errors: &mut ErrorList<ConfigError>) {
    for nested in &block.body.blocks {
        errors.add(ConfigError::UnsupportedBlock {
            parent: Some("lets".to_string()),
            name: nested.ident.clone(),
            range: nested.range.clone(),
        });
    }

    for attribute in &block.body.attributes {
        if let Some(existing) = lets.iter().find(|l| l.name == attribute.name) {
            errors.add(ConfigError::DuplicateAttribute {
                block: "lets".to_string(),
                name: attribute.name.clone(),
                existing: existing.range.clone(),
                range: attribute.range.clone(),
            });
            continue;
        }
        lets.push(attribute.clone());
    }
}

fn parse_assert(block: &Block, errors: &mut ErrorList<ConfigError>) -> Option<AssertConfig> {
    check_labels(block, 0, errors);
    for nested in &block.body.blocks {
        errors.add(ConfigError::UnsupportedBlock {
            parent: Some("assert".to_string()),
            name: nested.ident.clone(),
            range: nested.range.clone(),
        });
    }

    let mut assertion = None;
    let mut message = None;
    let mut warning = None;
    for attribute in &block.body.attributes {
        match attribute.name.as_str() {
            "assertion" => assertion = Some(attribute.clone()),
            "message" => message = Some(attribute.clone()),
            "warning" => warning = Some(attribute.clone()),
            name => errors.add(ConfigError::UnsupportedAttribute {
                block: "assert".to_string(),
                name: name.to_string(),
                range: attribute.range.clone(),
            }),
        }
    }

    for (name, present) in [("assertion", assertion.is_some()), ("message", message.is_some())] {
        if !present {
            errors.add(ConfigError::MissingAttribute {
                block: "assert".to_string(),
                name: name.to_string(),
                range: block.range.clone(),
            });
        }
    }

    Some(AssertConfig {
        assertion: assertion?,
        message: message?,
        warning,
        range: block.range.clone(),
    })
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{range}: attributes are not allowed at the top level, found `{name}`")]
    RootAttribute { name: String, range: Range },
    #[error("{range}: `{block}` requires {expected} label(s), found {found}")]
    LabelCount {
        block: String,
        expected: usize,
        found: usize,
        range: Range,
    },
    #[error("{range}: unsupported block `{name}`{}", parent.as_ref().map(|p| format!(" inside `{p}`")).unwrap_or_default())]
    UnsupportedBlock {
        parent: Option<String>,
        name: String,
        range: Range,
    },
    #[error("{range}: unsupported attribute `{name}` inside `{block}`")]
    UnsupportedAttribute {
        block: String,
        name: String,
        range: Range,
    },
    #[error("{range}: `{block}` requires attribute `{name}`")]
    MissingAttribute {
        block: String,
        name: String,
        range: Range,
    },
    #[error("{range}: `{block}` requires a `{name}` block")]
    MissingBlock {
        block: String,
        name: String,
        range: Range,
    },
    #[error("{range}: multiple `{name}` blocks, first defined at {existing}")]
    DuplicateBlock {
        name: String,
        existing: Range,
        range: Range,
    },
    #[error("{range}: `{block}.{name}` is already defined at {existing}")]
    DuplicateAttribute {
        block: String,
        name: String,
        existing: Range,
        range: Range,
    },
    #[error("{range}: invalid `{block}.{name}`: {message}")]
    InvalidValue {
        block: String,
        name: String,
        message: String,
        range: Range,
    },
}

/// All issues found in the configuration of a directory
#[derive(Debug)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl std::error::Error for ConfigErrors {}

impl std::fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        display_list(&self.0, f)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RootError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("loading {}", dir.display())]
    Load {
        dir: PathBuf,
        #[source]
        source: LoadError,
    },
    #[error("invalid configuration in {}", dir.display())]
    Config {
        dir: PathBuf,
        #[source]
        source: ConfigErrors,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn errors_for(documents: HclDocuments) -> Vec<ConfigError> {
        ConfigNode::parse(&documents).expect_err("must error").0
    }

    #[test]
    fn parse_node() {
        let node = ConfigNode::parse(&hcl_documents! {r#"
            stack {
              name = "my stack"
              tags = ["a", "b"]
              after = ["/other"]
            }
            globals {
              region = "eu"
            }
            generate_hcl "main.tf" {
              condition = true
              lets {
                name = global.region
              }
              assert {
                assertion = true
                message   = "ok"
              }
              content {
                a = 1
              }
            }
            terramate {}
        "#})
        .unwrap();

        let stack = node.stack.unwrap();
        assert_eq!(stack.name.as_deref(), Some("my stack"));
        assert_eq!(stack.tags, vec!["a", "b"]);
        assert_eq!(node.globals[0].name, "region");

        let generate_hcl = &node.generate_hcl[0];
        assert_eq!(generate_hcl.label, "main.tf");
        assert_eq!(generate_hcl.lets[0].name, "name");
        assert_eq!(generate_hcl.asserts.len(), 1);
        assert!(generate_hcl.condition.is_some());
        assert_eq!(generate_hcl.content.attributes[0].name, "a");
    }

    #[test]
    fn root_attributes_are_rejected() {
        let errors = errors_for(hcl_documents! {"root_attr = 1"});
        assert!(matches!(
            errors.as_slice(),
            [ConfigError::RootAttribute { name, .. }] if name == "root_attr"
        ));
    }

    #[test]
    fn all_issues_are_reported() {
        let errors = errors_for(hcl_documents! {r#"
            unknown {}
            generate_hcl {
              other = 1
              content {}
            }
            generate_hcl "b" {}
        "#});

        assert_eq!(errors.len(), 4, "{errors:#?}");
        assert!(matches!(errors[0], ConfigError::UnsupportedBlock { .. }));
        assert!(matches!(errors[1], ConfigError::LabelCount { found: 0, .. }));
        assert!(matches!(errors[2], ConfigError::UnsupportedAttribute { .. }));
        assert!(matches!(errors[3], ConfigError::MissingBlock { .. }));
    }

    #[test]
    fn assert_requires_assertion_and_message() {
        let errors = errors_for(hcl_documents! {r#"
            generate_hcl "a" {
              assert {
                warning = true
              }
              content {}
            }
        "#});

        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], ConfigError::MissingAttribute { name, .. } if name == "assertion"));
        assert!(matches!(&errors[1], ConfigError::MissingAttribute { name, .. } if name == "message"));
    }

    #[test]
    fn duplicate_globals_in_one_directory() {
        let errors = errors_for(hcl_documents! {
            "a.tm" => "globals {\n  a = 1\n}",
            "b.tm" => "globals {\n  a = 2\n}"
        });
        assert!(matches!(&errors[0], ConfigError::DuplicateAttribute { name, .. } if name == "a"));
    }

    #[test]
    fn stack_values_must_be_literals() {
        let errors = errors_for(hcl_documents! {"stack {\n  name = global.x\n  tags = [1]\n}"});
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("stacks/a")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("globals.tm"), "globals {\n  a = 1\n}").unwrap();
        std::fs::write(dir.path().join("stacks/a/stack.tm"), "stack {}").unwrap();
        std::fs::write(dir.path().join(".git/ignored.tm"), "invalid = = hcl").unwrap();

        let root = Root::load(dir.path()).unwrap();

        let stacks: Vec<_> = root.stacks().map(|(dir, _)| dir.to_string()).collect();
        assert_eq!(stacks, vec!["/stacks/a"]);
        assert_eq!(root.lookup(&ProjectPath::root()).unwrap().globals.len(), 1);
        assert!(root.lookup(&ProjectPath::new("/stacks")).is_none());
    }
}
