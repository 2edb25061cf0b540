use crate::config::{GenHclBlock, Root};
use crate::project::ProjectPath;

/// All `generate_hcl` blocks visible from `dir`
///
/// Blocks of `dir` come first, followed by those of its parent and so on up to the root. Nothing is
/// merged or shadowed here.
pub fn collect<'r>(root: &'r Root, dir: &ProjectPath) -> Vec<&'r GenHclBlock> {
    dir.ancestors()
        .filter_map(|dir| {
            let node = root.lookup(&dir);
            if node.is_none() {
                tracing::trace!(%dir, "no configuration");
            }
            node
        })
        .flat_map(|node| node.generate_hcl.iter())
        .collect()
}
