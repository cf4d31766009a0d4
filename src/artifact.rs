//! Locating the model artifact on disk

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_FILE_STEM: &str = "best_house_price_model";
pub const DEFAULT_SEARCH_DIRECTORY: &str = "notebook";

/// Encoding of an artifact file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// Serialized ONNX graph
    Onnx,
    /// Native booster JSON dump
    BoosterJson,
}

impl ArtifactFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "onnx" => Some(ArtifactFormat::Onnx),
            "json" => Some(ArtifactFormat::BoosterJson),
            _ => None,
        }
    }

    /// Extension first, then content: JSON dumps start with `{`.
    pub fn detect(path: &Path, bytes: &[u8]) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_else(|| {
                match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
                    Some(b'{') => ArtifactFormat::BoosterJson,
                    _ => ArtifactFormat::Onnx,
                }
            })
    }
}

/// Where and how to look for the artifact
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Tried before anything else.
    pub explicit_path: Option<PathBuf>,
    /// Conventional directories, relative to the working and install dirs.
    pub search_directories: Vec<PathBuf>,
    pub file_stem: String,
    /// Known artifact extensions, in preference order.
    pub extensions: Vec<String>,
    pub working_dir: PathBuf,
    pub install_dir: Option<PathBuf>,
    /// Fall back to the first file with a known extension in each search
    /// directory.
    pub scan_directories: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        Self {
            explicit_path: None,
            search_directories: vec![PathBuf::from(DEFAULT_SEARCH_DIRECTORY)],
            file_stem: DEFAULT_FILE_STEM.to_string(),
            extensions: vec!["json".to_string(), "onnx".to_string()],
            working_dir,
            install_dir,
            scan_directories: true,
        }
    }
}

impl LoaderOptions {
    /// Options rooted at `dir` with no install-dir fallback.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: dir.into(),
            install_dir: None,
            ..Self::default()
        }
    }

    pub fn with_explicit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    fn file_names(&self) -> impl Iterator<Item = String> + '_ {
        self.extensions
            .iter()
            .map(move |ext| format!("{}.{}", self.file_stem, ext))
    }

    fn anchor(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Ordered candidate locations, duplicates removed. The directory scan
    /// touches the filesystem; everything else is pure path arithmetic.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();

        if let Some(explicit) = &self.explicit_path {
            out.push(self.anchor(explicit));
        }
        for dir in &self.search_directories {
            let dir = self.anchor(dir);
            out.extend(self.file_names().map(|name| dir.join(name)));
        }
        if let Some(install) = &self.install_dir {
            for dir in &self.search_directories {
                let dir = install.join(dir);
                out.extend(self.file_names().map(|name| dir.join(name)));
            }
        }
        out.extend(self.file_names().map(|name| self.working_dir.join(name)));
        out.extend(self.file_names().map(|name| absolute(&self.working_dir.join(name))));
        if self.scan_directories {
            for dir in &self.search_directories {
                if let Some(found) = self.scan(&self.anchor(dir)) {
                    out.push(found);
                }
            }
        }

        let mut seen = Vec::with_capacity(out.len());
        out.retain(|p| {
            if seen.contains(p) {
                false
            } else {
                seen.push(p.clone());
                true
            }
        });
        out
    }

    fn scan(&self, dir: &Path) -> Option<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping artifact scan");
                return None;
            }
        };
        entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .find(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map_or(false, |ext| {
                            self.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext))
                        })
            })
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
