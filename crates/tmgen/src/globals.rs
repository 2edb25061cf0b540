//! hierarchical globals
//!
//! Globals are defined by `globals` blocks in any directory. A stack sees the globals of its own
//! directory and of every parent directory; a definition closer to the stack replaces a definition
//! of the same name further up.
use crate::config::Root;
use crate::eval::resolve::{resolve, Definition, ResolveError};
use crate::eval::Evaluator;
use crate::project::ProjectPath;
use crate::stack::{self, Stack, GLOBALS_NAMESPACE};
use hcl::value::Map;
use hcl::Value;

/// Definitions visible from `dir`, root first
pub fn definitions(root: &Root, dir: &ProjectPath) -> Vec<Definition> {
    let mut dirs: Vec<ProjectPath> = dir.ancestors().collect();
    dirs.reverse();

    dirs.iter()
        .filter_map(|dir| root.lookup(dir))
        .flat_map(|node| node.globals.iter())
        .map(|attribute| Definition {
            name: attribute.name.clone(),
            expr: attribute.expr.clone(),
            range: attribute.range.clone(),
        })
        .collect()
}

/// Evaluate the globals of `stack`
#[tracing::instrument(level = "debug", skip_all, fields(stack = %stack.dir))]
pub fn load(root: &Root, stack: &Stack) -> Result<Map<String, Value>, Error> {
    let mut evaluator = stack::metadata_context(root, stack);
    resolve_into(&mut evaluator, root, &stack.dir)?;

    Ok(evaluator
        .namespace(GLOBALS_NAMESPACE)
        .cloned()
        .unwrap_or_default())
}

/// Evaluate the globals visible from `dir` into the `global` namespace of `evaluator`
pub fn resolve_into(evaluator: &mut Evaluator, root: &Root, dir: &ProjectPath) -> Result<(), Error> {
    resolve(evaluator, GLOBALS_NAMESPACE, definitions(root, dir)).map_err(|source| Error {
        dir: dir.clone(),
        source,
    })
}

#[derive(thiserror::Error, Debug)]
#[error("evaluating globals for {dir}")]
pub struct Error {
    pub dir: ProjectPath,
    #[source]
    pub source: ResolveError,
}
