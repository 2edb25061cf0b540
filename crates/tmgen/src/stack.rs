//! stacks and their metadata
//!
//! Expressions can read stack metadata from the `terramate` namespace:
//!
//! | expression                               | value                                   |
//! |------------------------------------------|-----------------------------------------|
//! | `terramate.root.path.fs.absolute`        | host path of the project root           |
//! | `terramate.stack.name`                   | `stack.name`, defaults to the dir name  |
//! | `terramate.stack.description`            | `stack.description`, defaults to `""`   |
//! | `terramate.stack.id`                     | `stack.id`, only when defined           |
//! | `terramate.stack.tags`                   | `stack.tags`                            |
//! | `terramate.stack.path.absolute`          | `/stacks/a`                             |
//! | `terramate.stack.path.relative`          | `stacks/a`                              |
//! | `terramate.stack.path.basename`          | `a`                                     |
//! | `terramate.stack.path.to_root`           | `../..`                                 |
use crate::config::{Root, StackConfig};
use crate::eval::Evaluator;
use crate::project::ProjectPath;
use crate::stdlib;
use hcl::value::Map;
use hcl::Value;

pub const METADATA_NAMESPACE: &str = "terramate";
pub const GLOBALS_NAMESPACE: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub dir: ProjectPath,
    pub name: String,
    pub description: String,
    pub id: Option<String>,
    pub tags: Vec<String>,
}

impl Stack {
    pub fn new(dir: ProjectPath, config: &StackConfig) -> Self {
        Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| dir.basename().to_string()),
            description: config.description.clone().unwrap_or_default(),
            id: config.id.clone(),
            tags: config.tags.clone(),
            dir,
        }
    }

    /// The stack defined in `dir`, if any
    pub fn lookup(root: &Root, dir: &ProjectPath) -> Option<Self> {
        let config = root.lookup(dir)?.stack.as_ref()?;
        Some(Self::new(dir.clone(), config))
    }

    /// All stacks of the project, in path order
    pub fn list(root: &Root) -> Vec<Self> {
        root.stacks()
            .map(|(dir, config)| Self::new(dir.clone(), config))
            .collect()
    }
}

fn object<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

/// Values of the `terramate` namespace for `stack`
pub fn metadata(root: &Root, stack: &Stack) -> Map<String, Value> {
    let root_path = object([(
        "path",
        object([(
            "fs",
            object([("absolute", Value::from(root.host_dir().display().to_string()))]),
        )]),
    )]);

    let relative = stack.dir.as_str().trim_start_matches('/');
    let stack_path = object([
        ("absolute", Value::from(stack.dir.as_str())),
        ("relative", Value::from(if relative.is_empty() { "." } else { relative })),
        ("basename", Value::from(stack.dir.basename())),
        ("to_root", Value::from(ProjectPath::root().relative_to(&stack.dir))),
    ]);

    let mut stack_values = vec![
        ("name", Value::from(stack.name.as_str())),
        ("description", Value::from(stack.description.as_str())),
        (
            "tags",
            Value::Array(stack.tags.iter().map(|tag| Value::from(tag.as_str())).collect()),
        ),
        ("path", stack_path),
    ];
    if let Some(id) = &stack.id {
        stack_values.push(("id", Value::from(id.as_str())));
    }

    let mut metadata = Map::new();
    metadata.insert("root".to_string(), root_path);
    metadata.insert("stack".to_string(), object(stack_values));
    metadata
}

/// Evaluator with stack metadata and the standard functions, but no globals
pub fn metadata_context(root: &Root, stack: &Stack) -> Evaluator {
    let mut evaluator = Evaluator::new();
    evaluator.set_namespace(METADATA_NAMESPACE, metadata(root, stack));
    stdlib::register(&mut evaluator);
    evaluator
}

/// Evaluator used for everything generated into `stack`
pub fn eval_context(root: &Root, stack: &Stack, globals: &Map<String, Value>) -> Evaluator {
    let mut evaluator = metadata_context(root, stack);
    evaluator.set_namespace(GLOBALS_NAMESPACE, globals.clone());
    evaluator
}
