//! code generation from `generate_hcl` blocks
//!
//! For a stack, every `generate_hcl` block of the stack directory and of all its parent directories
//! is evaluated:
//!
//! 1. `lets` are evaluated into the `let` namespace
//! 2. `condition`: when false the block produces nothing, asserts are not evaluated
//! 3. `assert` blocks: a failed assertion (that is not a warning) suppresses the content
//! 4. `content` is copied with every attribute partially evaluated, `tm_dynamic` blocks expanded
//! 5. the result is formatted
//!
//! Results are ordered by label. Labels are file names and must be unique for a stack.
mod asserts;
mod body;
mod collect;
mod dynamic;

use crate::config::Root;
use crate::errors::display_list;
use crate::eval::resolve::{resolve, Definition, ResolveError};
use crate::eval::{EvalError, Evaluator};
use crate::fmt::{Format, FormatError, HclFormat};
use crate::info::Range;
use crate::project::ProjectPath;
use crate::stack::{self, Stack};
use crate::stdlib;
use crate::vendor::{vendor_function, VendorRequest};
use hcl::value::Map;
use hcl::Value;
use std::sync::mpsc::Sender;

pub use asserts::Assert;
pub use collect::collect;

/// Header of generated files
pub const HEADER: &str = "// TERRAMATE: GENERATED AUTOMATICALLY DO NOT EDIT";

/// Header of files generated by older versions, still recognized by [is_generated]
pub const HEADER_V0: &str = "// GENERATED BY TERRAMATE: DO NOT EDIT";

/// Default vendor directory
pub const DEFAULT_VENDOR_DIR: &str = "/modules";

const LETS_NAMESPACE: &str = "let";

/// Whether `text` starts with a generated code header
pub fn is_generated(text: &str) -> bool {
    text.lines()
        .next()
        .map(|line| {
            let line = line.trim();
            line == HEADER || line == HEADER_V0
        })
        .unwrap_or(false)
}

/// Result of one `generate_hcl` block
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedHcl {
    label: String,
    origin: Range,
    body: String,
    condition: bool,
    asserts: Vec<Assert>,
}

impl GeneratedHcl {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Range of the `generate_hcl` block
    pub fn origin(&self) -> &Range {
        &self.origin
    }

    /// Formatted code, empty when the condition is false or an assertion failed
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn condition(&self) -> bool {
        self.condition
    }

    /// Evaluated assertions, always empty when the condition is false
    pub fn asserts(&self) -> &[Assert] {
        &self.asserts
    }

    /// Header to put in front of [GeneratedHcl::body]
    pub fn header(&self) -> String {
        format!("{HEADER}\n\n")
    }

    /// Whether a non-warning assertion failed
    pub fn assertion_failed(&self) -> bool {
        self.asserts.iter().any(Assert::is_failure)
    }
}

impl std::fmt::Display for GeneratedHcl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "generating file {:?} (condition {}) (body {:?}) (origin {:?})",
            self.label,
            self.condition,
            self.body,
            self.origin.host_path()
        )
    }
}

/// Generates code for stacks of one project
pub struct Generator<'r> {
    root: &'r Root,
    vendor_dir: ProjectPath,
    vendor_requests: Option<Sender<VendorRequest>>,
    formatter: Box<dyn Format + 'r>,
}

impl<'r> Generator<'r> {
    pub fn new(root: &'r Root) -> Self {
        Self {
            root,
            vendor_dir: ProjectPath::new(DEFAULT_VENDOR_DIR),
            vendor_requests: None,
            formatter: Box::new(HclFormat),
        }
    }

    pub fn with_vendor_dir(mut self, vendor_dir: ProjectPath) -> Self {
        self.vendor_dir = vendor_dir;
        self
    }

    /// Send a request for every module referenced with `tm_vendor`
    pub fn with_vendor_requests(mut self, requests: Sender<VendorRequest>) -> Self {
        self.vendor_requests = Some(requests);
        self
    }

    pub fn with_formatter(mut self, formatter: impl Format + 'r) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Evaluate all `generate_hcl` blocks for `stack`
    ///
    /// Fails on the first block that cannot be evaluated and when two blocks share a label.
    #[tracing::instrument(level = "debug", skip_all, fields(stack = %stack.dir))]
    pub fn generate(&self, stack: &Stack, globals: &Map<String, Value>) -> Result<Vec<GeneratedHcl>, Error> {
        let blocks = collect(self.root, &stack.dir);
        tracing::trace!(count = blocks.len(), "collected generate_hcl blocks");

        let evaluator = stack::eval_context(self.root, stack, globals);

        let mut generated = Vec::with_capacity(blocks.len());
        for block in blocks {
            generated.push(self.generate_block(&evaluator, stack, block)?);
        }

        generated.sort_by(|a, b| a.label.cmp(&b.label));

        for pair in generated.windows(2) {
            if pair[0].label == pair[1].label {
                return Err(Error::LabelConflict {
                    label: pair[0].label.clone(),
                    first: pair[0].origin.clone(),
                    second: pair[1].origin.clone(),
                });
            }
        }

        tracing::debug!(count = generated.len(), "generated code");
        Ok(generated)
    }

    fn generate_block(
        &self,
        evaluator: &Evaluator,
        stack: &Stack,
        block: &crate::config::GenHclBlock,
    ) -> Result<GeneratedHcl, Error> {
        let label = block.label.clone();
        tracing::trace!(%label, "generating");

        // lets and the vendor target are local to the block
        let mut evaluator = evaluator.clone();

        let target_dir = stack.dir.join(ProjectPath::new(&label).dir().as_str());
        evaluator.set_host_function(
            stdlib::name("vendor"),
            vendor_function(target_dir, self.vendor_dir.clone(), self.vendor_requests.clone()),
        );

        let lets = block.lets.iter().map(|attribute| Definition {
            name: attribute.name.clone(),
            expr: attribute.expr.clone(),
            range: attribute.range.clone(),
        });
        resolve(&mut evaluator, LETS_NAMESPACE, lets).map_err(|source| Error::Lets {
            label: label.clone(),
            source,
        })?;

        let mut generated = GeneratedHcl {
            label: label.clone(),
            origin: block.range.clone(),
            body: String::new(),
            condition: true,
            asserts: vec![],
        };

        if let Some(condition) = &block.condition {
            generated.condition =
                evaluator
                    .eval_bool(&condition.expr)
                    .map_err(|source| Error::Condition {
                        range: condition.expr_range.clone(),
                        source,
                    })?;
        }

        if !generated.condition {
            tracing::debug!(%label, "condition is false");
            return Ok(generated);
        }

        generated.asserts = asserts::eval_asserts(&block.asserts, &evaluator)?;
        if generated.assertion_failed() {
            tracing::debug!(%label, "assertion failed");
            return Ok(generated);
        }

        evaluator.set_macro_function(stdlib::name("hcl_expression"), stdlib::hcl_expression);

        let mut structures = vec![];
        body::copy_body(&mut structures, &block.content, &mut evaluator).map_err(|source| {
            Error::Content {
                label: label.clone(),
                source: Box::new(source),
            }
        })?;

        let code: hcl::Body = structures.into_iter().collect();
        let origin = block.range.host_path();
        let text = hcl::format::to_string(&code)
            .map_err(|source| FormatError {
                origin: origin.to_path_buf(),
                source,
            })
            .and_then(|text| self.formatter.format(&text, origin))
            .map_err(|source| {
                tracing::error!(%label, error = %source, "generated code cannot be formatted");
                Error::Internal { label, source }
            })?;

        generated.body = text;
        Ok(generated)
    }
}

/// Evaluate all `generate_hcl` blocks for `stack` with the default formatter
pub fn load(
    root: &Root,
    stack: &Stack,
    globals: &Map<String, Value>,
    vendor_dir: ProjectPath,
    vendor_requests: Option<Sender<VendorRequest>>,
) -> Result<Vec<GeneratedHcl>, Error> {
    let mut generator = Generator::new(root).with_vendor_dir(vendor_dir);
    if let Some(requests) = vendor_requests {
        generator = generator.with_vendor_requests(requests);
    }
    generator.generate(stack, globals)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("evaluating lets of generate_hcl {label:?}")]
    Lets {
        label: String,
        #[source]
        source: ResolveError,
    },
    #[error("{range}: evaluating condition")]
    Condition {
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("{range}: evaluating assert.{field}")]
    Assert {
        field: &'static str,
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("evaluating content of generate_hcl {label:?}")]
    Content {
        label: String,
        #[source]
        source: Box<Error>,
    },
    #[error("{range}: evaluating attribute")]
    Attribute {
        range: Range,
        #[source]
        source: EvalError,
    },

    // tm_dynamic structure
    #[error("{range}: tm_dynamic requires a single label")]
    DynamicLabel { range: Range },
    #[error("{range}: tm_dynamic unsupported attribute {name:?}")]
    DynamicAttribute { name: String, range: Range },
    #[error("{range}: unrecognized block {name:?} inside tm_dynamic")]
    DynamicBlock { name: String, range: Range },
    #[error("{range}: multiple definitions of the `content` block")]
    DynamicMultipleContent { range: Range },
    #[error("{range}: `content` block or `attributes` obj must be defined")]
    DynamicMissingContent { range: Range },
    #[error("{range}: iterator should not be defined when for_each is omitted")]
    IteratorWithoutForEach { range: Range },
    #[error("{range}: dynamic iterator must be a single variable name")]
    InvalidIterator { range: Range },

    // tm_dynamic evaluation
    #[error("{range}: evaluating tm_dynamic.condition")]
    DynamicCondition {
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("{range}: evaluating `for_each` expression")]
    ForEach {
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("{range}: `for_each` expression of type {found} cannot be iterated")]
    ForEachType { range: Range, found: &'static str },
    #[error("{range}: iterator {name:?} is already in use")]
    IteratorInUse { name: String, range: Range },
    #[error("{range}: failed to evaluate tm_dynamic.labels")]
    Labels {
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("{range}: tm_dynamic.labels is not a string list")]
    LabelsType { range: Range },
    #[error("{range}: evaluating tm_dynamic.attributes")]
    Attributes {
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("{range}: tm_dynamic attributes must be an object, got {found} instead")]
    AttributesType { range: Range, found: &'static str },
    #[error("{range}: tm_dynamic.attributes key {key} must be a string")]
    AttributeKey { key: String, range: Range },
    #[error("{range}: tm_dynamic.attributes key {name:?} is not a valid HCL identifier")]
    AttributeName { name: String, range: Range },
    #[error("{range}: attribute {name} already set by tm_dynamic.attributes")]
    AttributeConflict { name: String, range: Range },

    #[error("generate_hcl {label:?} is defined at {first} and {second}")]
    LabelConflict {
        label: String,
        first: Range,
        second: Range,
    },
    #[error("internal error: formatting generated code for generate_hcl {label:?}")]
    Internal {
        label: String,
        #[source]
        source: FormatError,
    },
    #[error("{}", DisplayErrors(.0))]
    Multiple(Vec<Error>),
}

struct DisplayErrors<'a>(&'a [Error]);

impl std::fmt::Display for DisplayErrors<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        display_list(self.0, f)
    }
}

impl Error {
    /// A single error stays as is, several become [Error::Multiple]
    pub(crate) fn from_list(mut errors: Vec<Error>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Error::Multiple(errors)
        }
    }

    /// All errors, [Error::Multiple] flattened
    pub fn errors(&self) -> Vec<&Error> {
        match self {
            Error::Multiple(errors) => errors.iter().flat_map(Error::errors).collect(),
            Error::Content { source, .. } => source.errors(),
            error => vec![error],
        }
    }

    /// Source range the error points to
    pub fn range(&self) -> Option<&Range> {
        match self {
            Error::Lets { source, .. } => Some(source.range()),
            Error::Content { source, .. } => source.range(),
            Error::Condition { range, .. }
            | Error::Assert { range, .. }
            | Error::Attribute { range, .. }
            | Error::DynamicLabel { range }
            | Error::DynamicAttribute { range, .. }
            | Error::DynamicBlock { range, .. }
            | Error::DynamicMultipleContent { range }
            | Error::DynamicMissingContent { range }
            | Error::IteratorWithoutForEach { range }
            | Error::InvalidIterator { range }
            | Error::DynamicCondition { range, .. }
            | Error::ForEach { range, .. }
            | Error::ForEachType { range, .. }
            | Error::IteratorInUse { range, .. }
            | Error::Labels { range, .. }
            | Error::LabelsType { range }
            | Error::Attributes { range, .. }
            | Error::AttributesType { range, .. }
            | Error::AttributeKey { range, .. }
            | Error::AttributeName { range, .. }
            | Error::AttributeConflict { range, .. } => Some(range),
            Error::LabelConflict { second, .. } => Some(second),
            Error::Internal { .. } | Error::Multiple(_) => None,
        }
    }
}
