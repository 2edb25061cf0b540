//! # tmgen - hierarchical hcl code generation
//!
//! `tmgen` generates HCL files into stacks. Code generation is configured with `generate_hcl` blocks
//! placed anywhere in a project; every stack below such a block receives the generated file.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tmgen` works internally.
//!
//! ### HCL Terms
//!
//! Quick introduction to terms used to describe elements of HCL documents.
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier`
//!     - followed by 0 or more `labels`
//!     - and a `body` enclosed in `{` and `}`
//!
//! A project using all features handled here:
//! ```hcl
//! # /terramate.tm.hcl
//! globals {
//!   env = "prod"
//! }
//!
//! generate_hcl "backend.tf" {
//!   lets {
//!     bucket = "state-${global.env}"
//!   }
//!
//!   condition = global.env != "dev"
//!
//!   assert {
//!     assertion = tm_length(let.bucket) < 64
//!     message   = "bucket name too long"
//!   }
//!
//!   content {
//!     terraform {
//!       backend "s3" {
//!         bucket = let.bucket
//!         key    = terramate.stack.path.relative
//!         region = var.region
//!       }
//!     }
//!   }
//! }
//!
//! # /stacks/app/stack.tm.hcl
//! stack {
//!   name = "app"
//! }
//! ```
//!
//! ### Loading files
//!
//! Every directory of the project is scanned for configuration files (`*.tm`, `*.tm.hcl`). The
//! files of one directory are parsed as `body`s ([hcl_edit::structure::Body]) and stored in
//! [hcl_documents::HclDocuments] along with their source path and text, so errors can point to
//! `file:line:column`. At this point the loaded documents only have to be valid HCL to be accepted.
//!
//! ### Configuration
//!
//! see [config::ConfigNode::parse]
//!
//! The root blocks of a directory are validated and lowered into an owned tree ([ast]) that keeps
//! source ranges but no longer borrows the documents. All problems found in a directory are
//! reported together. The [config::Root] maps each project directory to its configuration.
//!
//! ### Globals
//!
//! see [globals::load]
//!
//! A stack sees the `globals` of its own directory and of all parent directories. Closer
//! definitions replace those further up. Globals may reference each other in any order; they are
//! resolved in rounds ([eval::resolve]) and reference cycles are reported.
//!
//! ### Partial evaluation
//!
//! see [eval::Evaluator::partial_eval]
//!
//! The generated code usually references things only known to terraform (`var.region`). An
//! [eval::Evaluator] knows a set of namespaces (`global`, `terramate`, `let`) and functions
//! (`tm_*`). Partial evaluation replaces every sub-expression that only references known
//! namespaces and functions with its value and keeps everything else as written.
//!
//! Given `global.env = "prod"` the expression `"${var.prefix}-${global.env}"` becomes
//! `"${var.prefix}-prod"`.
//!
//! ### Generation
//!
//! see [genhcl::Generator]
//!
//! For a stack all visible `generate_hcl` blocks are collected, their `lets`, `condition` and
//! `assert` blocks evaluated and their `content` copied with partial evaluation. `tm_dynamic`
//! blocks inside the content expand into zero or more regular blocks.
//!
//! ### Output
//!
//! Generated code is formatted ([fmt]) and prefixed with [genhcl::HEADER]. Evaluated values, such
//! as the globals of a stack, are converted to [value::Value] which in turn gets serialized via
//! [serde].
//!
pub mod ast;
pub mod config;
pub mod errors;
pub mod eval;
pub mod fmt;
pub mod genhcl;
pub mod globals;
pub mod hcl_documents;
pub mod info;
pub mod project;
pub mod stack;
pub mod stdlib;
pub mod value;
pub mod vendor;
mod visit;
