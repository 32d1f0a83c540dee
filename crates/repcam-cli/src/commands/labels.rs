//! Labels command - show what a custom classifier predicts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use repcam_adapters::ProjectConfig;
use repcam_core::inference::LABELS_FILE;
use repcam_core::LabelMap;

/// Arguments for the labels command
#[derive(Args)]
pub struct LabelsArgs {
    /// Directory holding label2int.json
    #[arg(long = "custom_classifier", alias = "custom-classifier", value_name = "PATH")]
    pub custom_classifier: PathBuf,

    /// Project document whose tags are listed next to each label
    #[arg(long, value_name = "FILE")]
    pub project: Option<PathBuf>,
}

/// Run the labels command.
pub fn run(args: &LabelsArgs) -> Result<()> {
    let labels = LabelMap::load(args.custom_classifier.join(LABELS_FILE))
        .context("Failed to load classifier labels")?;
    let project = args
        .project
        .as_deref()
        .map(ProjectConfig::load)
        .transpose()?;

    for line in render(&labels, project.as_ref()) {
        println!("{line}");
    }
    Ok(())
}

/// One `index<TAB>label[<TAB>tags]` line per label, in index order.
fn render(labels: &LabelMap, project: Option<&ProjectConfig>) -> Vec<String> {
    labels
        .iter()
        .map(|(index, label)| match project {
            Some(project) => {
                format!("{index}\t{label}\t{}", project.tags_of(label).join(","))
            }
            None => format!("{index}\t{label}"),
        })
        .collect()
}
