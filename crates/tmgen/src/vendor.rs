//! `tm_vendor`: references to vendored modules
//!
//! `tm_vendor("github.com/org/module?ref=v1")` evaluates to the path of the vendored copy of the
//! module, relative to the directory of the generated file. The module itself is not fetched here:
//! a [VendorRequest] is sent to whoever listens on the request channel.
use crate::project::ProjectPath;
use hcl::Value;
use std::sync::mpsc::Sender;

/// A parsed module source with a mandatory `ref`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModSource {
    /// fetchable git url
    pub url: String,
    /// `host/path` of the repository, used as directory below the vendor dir
    pub path: String,
    /// directory inside the repository (after `//`), may be empty
    pub subdir: String,
    pub reference: String,
}

/// Ask for `source` to be vendored into `vendor_dir`
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct VendorRequest {
    pub source: ModSource,
    pub vendor_dir: ProjectPath,
}

impl VendorRequest {
    /// Project directory the module ends up in
    pub fn target_dir(&self) -> ProjectPath {
        self.source.target_dir(&self.vendor_dir)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum VendorError {
    #[error("module source `{0}` has no ?ref= parameter")]
    MissingRef(String),
    #[error("unsupported module source `{0}`")]
    Unsupported(String),
}

impl ModSource {
    /// Parse `github.com/...`, `git@host:...` and `git::scheme://...` sources
    pub fn parse(source: &str) -> Result<Self, VendorError> {
        let (base, query) = source.split_once('?').unwrap_or((source, ""));
        let reference = query
            .split('&')
            .find_map(|param| param.strip_prefix("ref="))
            .filter(|reference| !reference.is_empty())
            .ok_or_else(|| VendorError::MissingRef(source.to_string()))?;

        let base = base.strip_prefix("git::").unwrap_or(base);

        let (url_base, location) = if let Some(rest) = base.strip_prefix("git@") {
            let (host, repo) = rest
                .split_once(':')
                .ok_or_else(|| VendorError::Unsupported(source.to_string()))?;
            (None, format!("{host}/{repo}"))
        } else if let Some((_scheme, rest)) = base.split_once("://") {
            let rest = rest.split_once('@').map(|(_, host)| host).unwrap_or(rest);
            (None, rest.to_string())
        } else if base.starts_with("github.com/") {
            (Some("https://"), base.to_string())
        } else {
            return Err(VendorError::Unsupported(source.to_string()));
        };

        let (repo, subdir) = location.split_once("//").unwrap_or((&location, ""));
        let path = repo.trim_end_matches(".git").trim_end_matches('/').to_string();
        if path.split('/').filter(|c| !c.is_empty()).count() < 2 {
            return Err(VendorError::Unsupported(source.to_string()));
        }

        let url = match url_base {
            Some(scheme) => format!("{scheme}{path}.git"),
            // the original url, minus `//subdir`
            None if subdir.is_empty() => base.to_string(),
            None => base[..base.len() - subdir.len() - 2].to_string(),
        };

        Ok(Self {
            url,
            path,
            subdir: subdir.trim_matches('/').to_string(),
            reference: reference.to_string(),
        })
    }

    /// Directory of the vendored module: `<vendor_dir>/<path>/<ref>`
    pub fn target_dir(&self, vendor_dir: &ProjectPath) -> ProjectPath {
        vendor_dir.join(&self.path).join(&self.reference)
    }
}

/// The `tm_vendor` function for code generated into `target_dir`
///
/// Without a request channel the function only computes paths.
pub fn vendor_function(
    target_dir: ProjectPath,
    vendor_dir: ProjectPath,
    requests: Option<Sender<VendorRequest>>,
) -> impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static {
    move |args: &[Value]| {
        let [Value::String(source)] = args else {
            return Err("expected a single string argument".to_string());
        };

        let source = ModSource::parse(source).map_err(|err| err.to_string())?;
        let module_dir = source.target_dir(&vendor_dir);

        let mut relative = module_dir.relative_to(&target_dir);
        if !source.subdir.is_empty() {
            relative = format!("{relative}/{}", source.subdir);
        }

        if let Some(requests) = &requests {
            tracing::debug!(module = %module_dir, "requesting vendoring");
            if requests
                .send(VendorRequest::new(source, vendor_dir.clone()))
                .is_err()
            {
                tracing::debug!(module = %module_dir, "nobody listens for vendor requests");
            }
        }

        Ok(Value::from(relative))
    }
}
