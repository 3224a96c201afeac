//! Icon resolution and caching.
//!
//! An icon name from an upstream record is rendered through the source's
//! `icon_templates` into an ordered list of [`IconCandidate`]s: local dump
//! paths and remote URLs. Each candidate is materialized into the public
//! icon directory and the matching public URL is returned.
//!
//! Candidates are tried in order. For each one: if its cached copy already
//! exists (and `replace` is off) its URL is returned without any I/O;
//! otherwise a remote reference is downloaded and a local one copied. The
//! first success wins. An empty string means "no icon available".

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use url::Url;

use crate::fetch::{FetchOutcome, Fetcher};

#[derive(Debug, Clone, PartialEq)]
pub enum IconRef {
    Remote(Url),
    Local(PathBuf),
}

impl IconRef {
    /// `http(s)` URLs are remote; anything else is a local path.
    pub fn parse(reference: &str) -> Self {
        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => IconRef::Remote(url),
            _ => IconRef::Local(PathBuf::from(reference)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IconCandidate {
    pub reference: IconRef,
    pub cache_path: PathBuf,
    pub public_url: String,
}

/// Resolves icons for one source into `cache_dir`, served under `public_prefix`.
#[derive(Clone)]
pub struct IconResolver {
    fetcher: Fetcher,
    cache_dir: PathBuf,
    public_prefix: String,
}

impl IconResolver {
    pub fn new(fetcher: Fetcher, cache_dir: PathBuf, public_prefix: &str) -> Self {
        Self {
            fetcher,
            cache_dir,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Build the ordered candidate list for an icon name.
    pub fn candidates(&self, icon_name: &str, templates: &[String]) -> Vec<IconCandidate> {
        if icon_name.is_empty() {
            return Vec::new();
        }
        templates
            .iter()
            .filter_map(|template| {
                let rendered = template.replace("{icon}", icon_name);
                let file = file_name(&rendered)?;
                Some(IconCandidate {
                    reference: IconRef::parse(&rendered),
                    cache_path: self.cache_dir.join(&file),
                    public_url: format!("{}/{}", self.public_prefix, file),
                })
            })
            .collect()
    }

    /// Resolve an icon name straight to a public URL.
    pub async fn resolve_name(&self, icon_name: &str, templates: &[String], replace: bool) -> String {
        let candidates = self.candidates(icon_name, templates);
        self.resolve(&candidates, replace).await
    }

    pub async fn resolve(&self, candidates: &[IconCandidate], replace: bool) -> String {
        // Any cached copy beats a fetch, whichever template produced it.
        if !replace {
            if let Some(cached) = candidates.iter().find(|c| c.cache_path.is_file()) {
                return cached.public_url.clone();
            }
        }
        for candidate in candidates {
            if self.materialize(candidate).await {
                return candidate.public_url.clone();
            }
        }
        if let Some(first) = candidates.first() {
            debug!(cache = %first.cache_path.display(), "no icon source available");
        }
        String::new()
    }

    /// Primary reference with one remote fallback, both cached at
    /// `local_cache_path` and served at `public_url`.
    pub async fn resolve_icon(
        &self,
        primary: &str,
        local_cache_path: &Path,
        public_url: &str,
        remote_fallback: Option<&str>,
        replace: bool,
    ) -> String {
        let candidates: Vec<IconCandidate> = std::iter::once(primary)
            .chain(remote_fallback)
            .map(|reference| IconCandidate {
                reference: IconRef::parse(reference),
                cache_path: local_cache_path.to_path_buf(),
                public_url: public_url.to_string(),
            })
            .collect();
        self.resolve(&candidates, replace).await
    }

    async fn materialize(&self, candidate: &IconCandidate) -> bool {
        match &candidate.reference {
            IconRef::Remote(url) => match self.fetcher.fetch(url.as_str(), &candidate.cache_path).await {
                Ok(FetchOutcome::Success { .. }) => true,
                Ok(FetchOutcome::NotFound) => {
                    debug!(url = %url, "icon not found upstream");
                    false
                }
                Ok(outcome) => {
                    warn!(url = %url, ?outcome, "icon download failed");
                    false
                }
                Err(e) => {
                    warn!(url = %url, error = %format!("{:#}", e), "icon download failed");
                    false
                }
            },
            IconRef::Local(path) => {
                if !path.is_file() {
                    return false;
                }
                if let Some(parent) = candidate.cache_path.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        warn!(dir = %parent.display(), error = %e, "cannot create icon directory");
                        return false;
                    }
                }
                match tokio::fs::copy(path, &candidate.cache_path).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(from = %path.display(), error = %e, "icon copy failed");
                        false
                    }
                }
            }
        }
    }
}

/// Last path segment of a rendered template, without query or fragment.
fn file_name(rendered: &str) -> Option<String> {
    let path = match Url::parse(rendered) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
        _ => rendered.to_string(),
    };
    path.rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
