// ABOUTME: Tutorial catalog: descriptors, slide sources and validator descriptors
// Loaded from <dir>/<slug>/tutorial.json; the same directory is the container build context

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DESCRIPTOR_FILE: &str = "tutorial.json";

#[derive(Error, Debug)]
pub enum TutorialError {
    #[error("Tutorial '{0}' has not been loaded")]
    NotFound(String),
    #[error("Tutorial '{slug}' has no slide {index}")]
    SlideNotFound { slug: String, index: usize },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid tutorial descriptor {path}: {source}")]
    InvalidDescriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideDescriptor {
    /// Markdown file, relative to the tutorial directory
    pub src: String,
    /// One object per validator set
    #[serde(default)]
    pub validators: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorialDescriptor {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub slides: Vec<SlideDescriptor>,
    /// Directory the descriptor was loaded from
    #[serde(skip)]
    pub directory: PathBuf,
}

impl TutorialDescriptor {
    /// Validator descriptors of every slide, in order.
    pub fn slide_validators(&self) -> impl Iterator<Item = &[Value]> {
        self.slides.iter().map(|slide| slide.validators.as_slice())
    }
}

/// Narrow read interface on the tutorial store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TutorialCatalog: Send + Sync {
    async fn get_tutorial(&self, slug: &str) -> Result<TutorialDescriptor, TutorialError>;

    /// Source text of the slide at `index` (zero based).
    async fn slide_source(&self, slug: &str, index: usize) -> Result<String, TutorialError>;

    async fn list(&self) -> Vec<TutorialDescriptor>;
}

/// Catalog read from tutorial directories on disk.
#[derive(Debug, Default)]
pub struct FsTutorialCatalog {
    tutorials: IndexMap<String, TutorialDescriptor>,
}

impl FsTutorialCatalog {
    /// Load every `<dir>/<slug>/tutorial.json`. The first directory declaring a slug wins.
    pub fn load(directories: &[PathBuf]) -> Result<Self, TutorialError> {
        let mut tutorials = IndexMap::new();

        for directory in directories {
            if !directory.is_dir() {
                warn!("Tutorial directory {} does not exist, skipping", directory.display());
                continue;
            }

            for tutorial in Self::load_from(directory)? {
                if tutorials.contains_key(&tutorial.slug) {
                    warn!(
                        "Tutorial '{}' in {} shadowed by an earlier directory",
                        tutorial.slug,
                        tutorial.directory.display()
                    );
                    continue;
                }
                tutorials.insert(tutorial.slug.clone(), tutorial);
            }
        }

        info!("Loaded {} tutorials", tutorials.len());
        Ok(Self { tutorials })
    }

    fn load_from(directory: &Path) -> Result<Vec<TutorialDescriptor>, TutorialError> {
        let mut entries = std::fs::read_dir(directory)
            .map_err(io_error(directory))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect::<Vec<_>>();
        entries.sort();

        let mut tutorials = Vec::new();
        for tutorial_dir in entries {
            let path = tutorial_dir.join(DESCRIPTOR_FILE);
            if !path.is_file() {
                debug!("No {} in {}, skipping", DESCRIPTOR_FILE, tutorial_dir.display());
                continue;
            }

            let content = std::fs::read_to_string(&path).map_err(io_error(&path))?;
            let mut tutorial: TutorialDescriptor = serde_json::from_str(&content)
                .map_err(|source| TutorialError::InvalidDescriptor { path: path.clone(), source })?;
            tutorial.directory = tutorial_dir;
            debug!("Loaded tutorial '{}' from {}", tutorial.slug, path.display());
            tutorials.push(tutorial);
        }
        Ok(tutorials)
    }

    fn tutorial(&self, slug: &str) -> Result<&TutorialDescriptor, TutorialError> {
        self.tutorials
            .get(slug)
            .ok_or_else(|| TutorialError::NotFound(slug.to_string()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TutorialError {
    let path = path.to_path_buf();
    move |source| TutorialError::Io { path, source }
}

#[async_trait]
impl TutorialCatalog for FsTutorialCatalog {
    async fn get_tutorial(&self, slug: &str) -> Result<TutorialDescriptor, TutorialError> {
        self.tutorial(slug).cloned()
    }

    async fn slide_source(&self, slug: &str, index: usize) -> Result<String, TutorialError> {
        let tutorial = self.tutorial(slug)?;
        let slide = tutorial.slides.get(index).ok_or_else(|| TutorialError::SlideNotFound {
            slug: slug.to_string(),
            index,
        })?;

        let path = tutorial.directory.join(&slide.src);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| TutorialError::Io { path, source })
    }

    async fn list(&self) -> Vec<TutorialDescriptor> {
        self.tutorials.values().cloned().collect()
    }
}

/// Catalog held in memory, slide sources included.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tutorials: IndexMap<String, (TutorialDescriptor, Vec<String>)>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tutorial: TutorialDescriptor, sources: Vec<String>) {
        self.tutorials.insert(tutorial.slug.clone(), (tutorial, sources));
    }

    pub fn with(mut self, tutorial: TutorialDescriptor, sources: Vec<String>) -> Self {
        self.insert(tutorial, sources);
        self
    }
}

#[async_trait]
impl TutorialCatalog for InMemoryCatalog {
    async fn get_tutorial(&self, slug: &str) -> Result<TutorialDescriptor, TutorialError> {
        self.tutorials
            .get(slug)
            .map(|(tutorial, _)| tutorial.clone())
            .ok_or_else(|| TutorialError::NotFound(slug.to_string()))
    }

    async fn slide_source(&self, slug: &str, index: usize) -> Result<String, TutorialError> {
        let (_, sources) = self
            .tutorials
            .get(slug)
            .ok_or_else(|| TutorialError::NotFound(slug.to_string()))?;
        sources.get(index).cloned().ok_or_else(|| TutorialError::SlideNotFound {
            slug: slug.to_string(),
            index,
        })
    }

    async fn list(&self) -> Vec<TutorialDescriptor> {
        self.tutorials.values().map(|(tutorial, _)| tutorial.clone()).collect()
    }
}
