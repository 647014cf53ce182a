// ABOUTME: Docker image builder for tutorial containers
// Packs a tutorial directory as build context and follows the build stream

use anyhow::{Context, Result};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tar::{Builder, HeaderMode};
use tracing::{debug, error, info};

use crate::tutorial::{TutorialDescriptor, DESCRIPTOR_FILE};

/// Directories never sent to the daemon as part of a build context
const SKIPPED_DIRECTORIES: [&str; 4] = [".git", "node_modules", "target", ".cache"];

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Build the image tagged `tag` from `context_dir/Dockerfile`
    pub async fn build_image(&self, tag: &str, context_dir: &Path) -> Result<()> {
        info!("Building Docker image {} from {}", tag, context_dir.display());

        let context = BuildContext::for_tutorial(context_dir)?;
        let archive = tokio::task::spawn_blocking(move || context.pack())
            .await
            .context("Build context task panicked")?
            .with_context(|| format!("Failed to pack build context {}", context_dir.display()))?;

        let build_image_options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,
            ..Default::default()
        };

        let mut build_stream = self.docker.build_image(build_image_options, None, Some(archive.into()));

        while let Some(build_result) = build_stream.next().await {
            match build_result {
                Ok(build_info) => {
                    if let Some(stream) = &build_info.stream {
                        debug!("Build {}: {}", tag, stream.trim());
                    }
                    if let Some(error) = &build_info.error {
                        error!("Build error for {}: {}", tag, error);
                        return Err(anyhow::anyhow!("Build failed: {}", error));
                    }
                }
                Err(e) => {
                    error!("Build stream error for {}: {}", tag, e);
                    return Err(anyhow::anyhow!("Build stream error: {}", e));
                }
            }
        }

        info!("Successfully built image: {}", tag);
        Ok(())
    }
}

/// Files of a tutorial directory that the image is built from.
///
/// The tutorial descriptor and the slide sources it lists stay out of the archive: they are
/// served to the learner, not baked into the container. Symlinks are not followed.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    excluded: HashSet<PathBuf>,
}

impl BuildContext {
    pub fn for_tutorial(root: &Path) -> Result<Self> {
        let mut excluded = HashSet::new();
        let descriptor = root.join(DESCRIPTOR_FILE);
        if descriptor.is_file() {
            let content = std::fs::read_to_string(&descriptor)
                .with_context(|| format!("Failed to read {}", descriptor.display()))?;
            let tutorial: TutorialDescriptor = serde_json::from_str(&content)
                .with_context(|| format!("Invalid tutorial descriptor {}", descriptor.display()))?;
            excluded.extend(tutorial.slides.iter().map(|slide| relative(&slide.src)));
            excluded.insert(PathBuf::from(DESCRIPTOR_FILE));
        }
        Ok(Self {
            root: root.to_path_buf(),
            excluded,
        })
    }

    /// Paths of the archived files, relative to the tutorial directory, sorted.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![PathBuf::new()];

        while let Some(dir) = pending.pop() {
            let absolute = self.root.join(&dir);
            let entries = std::fs::read_dir(&absolute)
                .with_context(|| format!("Failed to list {}", absolute.display()))?;
            for entry in entries {
                let entry = entry?;
                let name = entry.file_name();
                let path = dir.join(&name);
                let file_type = entry.file_type()?;

                if file_type.is_dir() {
                    if !SKIPPED_DIRECTORIES.contains(&name.to_string_lossy().as_ref()) {
                        pending.push(path);
                    }
                } else if file_type.is_file() && !self.excluded.contains(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Tar the context. Blocking.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut archive = Builder::new(Vec::new());
        archive.mode(HeaderMode::Deterministic);
        for file in self.files()? {
            archive
                .append_path_with_name(self.root.join(&file), &file)
                .with_context(|| format!("Failed to archive {}", file.display()))?;
        }
        archive.into_inner().context("Failed to finish build context")
    }
}

/// `./slides/01.md` and `slides/01.md` name the same entry.
fn relative(src: &str) -> PathBuf {
    Path::new(src)
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
