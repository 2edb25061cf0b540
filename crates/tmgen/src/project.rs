//! project relative paths
use std::path::{Path, PathBuf};

/// An absolute, `/` separated path relative to the project root
///
/// The project root itself is `/`. Paths are always normalized: no trailing slash, no empty
/// components, no `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectPath(String);

impl ProjectPath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize `path` into a project path
    ///
    /// `..` components never escape the root.
    pub fn new(path: &str) -> Self {
        let mut components: Vec<&str> = vec![];
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    components.pop();
                }
                other => components.push(other),
            }
        }

        Self(format!("/{}", components.join("/")))
    }

    /// Project path of `host_path` given the project root on the host
    pub fn from_host(root: &Path, host_path: &Path) -> Option<Self> {
        let relative = host_path.strip_prefix(root).ok()?;
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(Self::new(&components.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Parent directory; the root is its own parent
    pub fn dir(&self) -> Self {
        match self.0.rfind('/') {
            Some(0) | None => Self::root(),
            Some(idx) => Self(self.0[..idx].to_string()),
        }
    }

    /// `self`, its parent, ... up to and including the root
    pub fn ancestors(&self) -> impl Iterator<Item = ProjectPath> {
        let mut next = Some(self.clone());
        std::iter::from_fn(move || {
            let current = next.take()?;
            let parent = current.dir();
            if parent != current {
                next = Some(parent);
            }
            Some(current)
        })
    }

    pub fn join(&self, other: &str) -> Self {
        Self::new(&format!("{}/{}", self.0, other))
    }

    /// Last path component, empty for the root
    pub fn basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Path of `self` as seen from directory `base`, using `..` where needed
    pub fn relative_to(&self, base: &ProjectPath) -> String {
        let target: Vec<&str> = self.components().collect();
        let base: Vec<&str> = base.components().collect();

        let common = target
            .iter()
            .zip(base.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = std::iter::repeat("..").take(base.len() - common).collect();
        parts.extend(&target[common..]);

        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    /// Host path of `self` given the project root on the host
    pub fn host_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.components());
        path
    }
}

impl std::fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize() {
        assert_eq!(ProjectPath::new("").as_str(), "/");
        assert_eq!(ProjectPath::new("a//b/./c/").as_str(), "/a/b/c");
        assert_eq!(ProjectPath::new("/a/../../b").as_str(), "/b");
    }

    #[test]
    fn walk_up_terminates_at_root() {
        let path = ProjectPath::new("/a/b");
        assert_eq!(path.dir().as_str(), "/a");
        assert_eq!(path.dir().dir().as_str(), "/");
        assert_eq!(ProjectPath::root().dir(), ProjectPath::root());
    }

    #[test]
    fn relative_paths() {
        let stack = ProjectPath::new("/stacks/a");
        assert_eq!(ProjectPath::root().relative_to(&stack), "../..");
        assert_eq!(
            ProjectPath::new("/modules/x").relative_to(&stack),
            "../../modules/x"
        );
        assert_eq!(stack.relative_to(&stack), ".");
        assert_eq!(stack.basename(), "a");
    }

    #[test]
    fn from_host() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            ProjectPath::from_host(root, Path::new("/tmp/project/a/b")),
            Some(ProjectPath::new("/a/b"))
        );
        assert_eq!(ProjectPath::from_host(root, Path::new("/elsewhere")), None);
    }

    #[test]
    fn ancestors_are_child_first() {
        let ancestors: Vec<String> = ProjectPath::new("/a/b")
            .ancestors()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(ancestors, vec!["/a/b", "/a", "/"]);
        assert_eq!(ProjectPath::root().ancestors().count(), 1);
    }
}
