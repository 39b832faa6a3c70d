//! Compiled contract artifacts, looked up by name.

use std::collections::BTreeMap;
use std::path::Path;

use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use error_stack::{Report, ResultExt};
use walkdir::WalkDir;

use crate::errors::{HarnessError, HarnessResult};

pub mod formats;

use formats::{parse_bytecode, ArtifactJson};

const BUILD_INFO_DIR: &str = "build-info";
const DEBUG_FILE_SUFFIX: &str = ".dbg.json";

/// A compiled contract: immutable ABI and creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self { name: name.into(), abi, bytecode }
    }

    /// Parse an artifact file body in any supported layout.
    /// `fallback_name` is used when the layout does not name its contract.
    pub fn from_json(fallback_name: &str, source: &str) -> HarnessResult<Self> {
        let invalid = |reason: String| {
            Report::new(HarnessError::InvalidArtifact { name: fallback_name.to_string(), reason })
        };

        let parsed: ArtifactJson = serde_json::from_str(source).map_err(|e| {
            invalid(format!("not a foundry, hardhat or solc artifact: {}", e))
        })?;
        let name = parsed.contract_name().unwrap_or(fallback_name).to_string();
        let (abi, raw_bytecode) = parsed.into_parts().map_err(invalid)?;
        let bytecode = parse_bytecode(&raw_bytecode).map_err(|reason| {
            Report::new(HarnessError::InvalidArtifact { name: name.clone(), reason })
        })?;
        Ok(Self { name, abi, bytecode })
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Ready(Artifact),
    /// Recognized on disk but unusable; reported when the artifact is requested.
    Invalid(String),
}

/// In-memory registry of artifacts. Lookups never touch the filesystem.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLoader {
    entries: BTreeMap<String, Entry>,
}

impl ArtifactLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` recursively for artifact files.
    ///
    /// Files that are not artifacts (debug files, build info, unrelated JSON)
    /// are skipped. Artifacts with unusable bytecode are remembered and fail
    /// with [HarnessError::InvalidArtifact] when loaded.
    pub fn from_dir(dir: impl AsRef<Path>) -> HarnessResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Report::new(HarnessError::Config(format!(
                "artifacts directory {} does not exist",
                dir.display()
            ))));
        }

        let mut loader = Self::new();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != BUILD_INFO_DIR);

        for entry in walker {
            let entry = entry
                .map_err(|e| Report::new(HarnessError::Config(e.to_string())))
                .attach_printable_lazy(|| format!("Scanning artifacts in {}", dir.display()))?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_file()
                || !file_name.ends_with(".json")
                || file_name.ends_with(DEBUG_FILE_SUFFIX)
            {
                continue;
            }

            let source = std::fs::read_to_string(path)
                .map_err(|e| Report::new(HarnessError::Config(e.to_string())))
                .attach_printable_lazy(|| format!("Reading artifact {}", path.display()))?;
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<ArtifactJson>(&source) else {
                log::debug!("skipping {}: not a contract artifact", path.display());
                continue;
            };
            let name = parsed.contract_name().unwrap_or(&stem).to_string();

            match Artifact::from_json(&stem, &source) {
                Ok(artifact) => loader.register(name, Entry::Ready(artifact)),
                Err(report) => {
                    let reason = match report.current_context() {
                        HarnessError::InvalidArtifact { reason, .. } => reason.clone(),
                        other => other.to_string(),
                    };
                    log::debug!("artifact {} at {} is unusable: {}", name, path.display(), reason);
                    loader.register(name, Entry::Invalid(reason));
                }
            }
        }

        log::info!("loaded {} artifact(s) from {}", loader.entries.len(), dir.display());
        Ok(loader)
    }

    /// Register an artifact programmatically, replacing any with the same name.
    pub fn insert(&mut self, artifact: Artifact) {
        self.entries.insert(artifact.name.clone(), Entry::Ready(artifact));
    }

    pub fn load(&self, name: &str) -> HarnessResult<Artifact> {
        match self.entries.get(name) {
            Some(Entry::Ready(artifact)) => Ok(artifact.clone()),
            Some(Entry::Invalid(reason)) => Err(Report::new(HarnessError::InvalidArtifact {
                name: name.to_string(),
                reason: reason.clone(),
            })),
            None => {
                let mut error = Report::new(HarnessError::ArtifactNotFound(name.to_string()));
                if !self.entries.is_empty() {
                    let known: Vec<&str> = self.names().collect();
                    error = error.attach_printable(format!("Known artifacts: {}", known.join(", ")));
                }
                Err(error)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn register(&mut self, name: String, entry: Entry) {
        // A usable artifact is never shadowed by an unusable one of the same name
        // (e.g. an interface compiled next to its implementation).
        if let (Some(Entry::Ready(_)), Entry::Invalid(_)) = (self.entries.get(&name), &entry) {
            return;
        }
        if let Some(Entry::Ready(_)) = self.entries.insert(name.clone(), entry) {
            log::warn!("artifact {} found more than once; keeping the last one", name);
        }
    }
}
