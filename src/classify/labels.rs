use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Read a label file: one label per line, blank lines and `#` comments skipped.
///
/// Lines in ImageNet synset form (`n01440764 tench, Tinca tinca`) keep only
/// the first human-readable name (`tench`).
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let labels = parse_labels(&raw);
    if labels.is_empty() {
        return Err(anyhow!("labels file {} has no labels", path.display()));
    }
    Ok(labels)
}

pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(clean_label)
        .collect()
}

fn clean_label(line: &str) -> String {
    let line = match line.split_once(' ') {
        Some((synset, rest)) if is_synset(synset) => rest,
        _ => line,
    };
    line.split(',').next().unwrap_or(line).trim().to_string()
}

fn is_synset(token: &str) -> bool {
    token.len() == 9 && token.starts_with('n') && token[1..].bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_synset_lines() {
        let raw = "# imagenet\nn01440764 tench, Tinca tinca\n\ngoldfish\n  tabby cat  \n";
        assert_eq!(parse_labels(raw), vec!["tench", "goldfish", "tabby cat"]);
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_labels(file.path()).is_err());
    }
}
