// ABOUTME: CLI check command
// Parses every slide descriptor so configuration errors show up before a learner hits them

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::{CheckArgs, OutputFormat};
use crate::config::AppConfig;
use crate::tutorial::{FsTutorialCatalog, TutorialCatalog, TutorialDescriptor};
use crate::validators::{ValidatorDescriptorsParser, ValidatorFactory};

/// JSON output structure for one checked tutorial
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CheckOutput {
    pub tutorial: String,
    pub slides: usize,
    pub error: Option<String>,
}

pub fn check_tutorial(tutorial: &TutorialDescriptor) -> CheckOutput {
    let result = ValidatorDescriptorsParser::parse_tutorial(
        tutorial.slide_validators(),
        &ValidatorFactory::detached(),
    );
    CheckOutput {
        tutorial: tutorial.slug.clone(),
        slides: tutorial.slides.len(),
        error: result.err().map(|e| e.to_string()),
    }
}

pub async fn execute(args: CheckArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let catalog = FsTutorialCatalog::load(&config.tutorials.directories)
        .context("Failed to load tutorials")?;

    let tutorials = match &args.slug {
        Some(slug) => vec![catalog.get_tutorial(slug).await?],
        None => catalog.list().await,
    };
    let results: Vec<CheckOutput> = tutorials.iter().map(check_tutorial).collect();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&results).context("Failed to serialize results")?
            );
        }
        OutputFormat::Text => {
            for result in &results {
                match &result.error {
                    None => println!("\x1b[32m✓\x1b[0m {} ({} slides)", result.tutorial, result.slides),
                    Some(error) => println!("\x1b[31m✗\x1b[0m {}: {}", result.tutorial, error),
                }
            }
        }
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!("{} of {} tutorials have invalid validators", failed, results.len());
    }
    Ok(())
}
