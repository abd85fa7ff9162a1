//! Named mirror job definitions

use mirror_gate_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::definition::MirrorJob;

/// Mirror jobs known to a runner, by name
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    jobs: BTreeMap<String, MirrorJob>,
}

impl JobCatalog {
    /// Build a catalog, rejecting duplicate names
    pub fn from_jobs(jobs: impl IntoIterator<Item = MirrorJob>) -> Result<Self> {
        let mut catalog = BTreeMap::new();
        for job in jobs {
            if catalog.contains_key(&job.name) {
                return Err(Error::DuplicateJob(job.name));
            }
            catalog.insert(job.name.clone(), job);
        }
        Ok(Self { jobs: catalog })
    }

    /// Load a JSON array of job definitions
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let jobs: Vec<MirrorJob> = serde_json::from_str(&data)?;
        let catalog = Self::from_jobs(jobs)?;

        info!(
            "Loaded {} mirror job(s) from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&MirrorJob> {
        self.jobs.get(name)
    }

    /// Look up a job, failing on unknown names
    pub fn require(&self, name: &str) -> Result<&MirrorJob> {
        self.get(name)
            .ok_or_else(|| Error::UnknownJob(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_gate_common::ImageReference;
    use std::io::Write;

    fn job(name: &str) -> MirrorJob {
        MirrorJob::new(
            name,
            ImageReference::new("public-registry", "app", "v1"),
            ImageReference::new("destination-registry", "app", "v1"),
        )
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = JobCatalog::from_jobs(vec![job("a"), job("a")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateJob(name) if name == "a"));
    }

    #[test]
    fn test_lookup() {
        let catalog = JobCatalog::from_jobs(vec![job("b"), job("a")]).unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(catalog.get("a").is_some());
        assert!(matches!(catalog.require("c"), Err(Error::UnknownJob(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let jobs = serde_json::to_string(&vec![job("mirror-app")]).unwrap();
        file.write_all(jobs.as_bytes()).unwrap();

        let catalog = JobCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.require("mirror-app").unwrap().source.tag, "v1");
    }

    #[test]
    fn test_from_missing_file() {
        let err = JobCatalog::from_file("/nonexistent/jobs.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
