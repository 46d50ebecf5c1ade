//! Manifest command - normalize a rendered manifest for drift diffs

use console::style;
use helmform_release::{ChangeType, diff_manifests, normalize};
use std::path::Path;

use crate::error::{CliError, Result};

fn normalized(path: &Path, sensitive: &[String]) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
        message: format!("{}: {}", path.display(), e),
    })?;
    Ok(normalize(&content, sensitive)?)
}

pub fn run(file: &Path, against: Option<&Path>, sensitive: &[String]) -> Result<()> {
    let current = normalized(file, sensitive)?;

    let Some(against) = against else {
        println!("{}", current);
        return Ok(());
    };

    let proposed = normalized(against, sensitive)?;
    let diff = diff_manifests(&current, &proposed)?;

    for change in &diff.changes {
        let header = match change.change_type {
            ChangeType::Added => style(format!("+ {}", change.resource)).green().bold(),
            ChangeType::Modified => style(format!("~ {}", change.resource)).yellow().bold(),
            ChangeType::Removed => style(format!("- {}", change.resource)).red().bold(),
        };
        println!("{}", header);
        for line in change.diff.lines() {
            match line.chars().next() {
                Some('+') => println!("  {}", style(line).green()),
                Some('-') => println!("  {}", style(line).red()),
                _ => println!("  {}", style(line).dim()),
            }
        }
        println!();
    }
    println!("{}", style(diff.summary()).bold());
    Ok(())
}
