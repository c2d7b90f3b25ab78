//! # File-system Edges
//!
//! The only module that touches directories. Everything else works on
//! in-memory documents; these helpers read them in and write them out.
//!
//! Directory scans are sorted by file name so runs are reproducible.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::augment::{is_augmented, strip_category_iob};
use crate::corpus::{parse_iob, parse_iob_document, TaggedDocument};
use crate::error::{Error, Result};
use crate::report::Issue;
use crate::splitter::{Split, SplitOutcome};
use crate::tagger::EntityCategory;

pub const IOB_EXTENSION: &str = "iob";

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Writes `contents`, creating parent directories.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).map_err(|e| Error::io(path, e))
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Regular files in `dir` with the given extension, sorted by name.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Expands directories into their files with `extension`; plain files are
/// kept. The result is sorted by path and deduplicated.
pub fn expand_inputs(inputs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(list_files(input, extension)?);
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Fails when two files share a stem. Document ids and staging outputs are
/// named after the stem, so such files would overwrite each other.
pub fn ensure_unique_stems(files: &[PathBuf]) -> Result<()> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for path in files {
        if let Some(first) = seen.insert(file_stem(path), path) {
            return Err(Error::Config(format!(
                "input files '{}' and '{}' share the stem '{}'",
                first.display(),
                path.display(),
                file_stem(path)
            )));
        }
    }
    Ok(())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn iob_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.{}", id, IOB_EXTENSION))
}

/// Writes one `<id>.iob` per document.
pub fn write_iob_files(dir: &Path, docs: &[TaggedDocument]) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    docs.iter()
        .map(|doc| {
            let path = iob_path(dir, &doc.id);
            write_string(&path, &doc.to_iob())?;
            Ok(path)
        })
        .collect()
}

pub fn read_iob_file(path: &Path) -> Result<(TaggedDocument, Vec<Issue>)> {
    let input = read_to_string(path)?;
    let (doc, issues) = parse_iob_document(&input, &file_stem(path));
    let issues = issues.into_iter().map(|i| i.in_file(path)).collect();
    Ok((doc, issues))
}

/// Reads every `.iob` file of `dir`, ids taken from the file stems.
pub fn read_iob_dir(dir: &Path) -> Result<(Vec<TaggedDocument>, Vec<Issue>)> {
    let mut docs = Vec::new();
    let mut issues = Vec::new();
    for path in list_files(dir, IOB_EXTENSION)? {
        let (doc, file_issues) = read_iob_file(&path)?;
        docs.push(doc);
        issues.extend(file_issues);
    }
    Ok((docs, issues))
}

/// `Line k: reason`, one per issue.
pub fn write_error_log(path: &Path, issues: &[Issue]) -> Result<()> {
    let mut out = String::new();
    for issue in issues {
        out.push_str(&issue.log_line());
        out.push('\n');
    }
    write_string(path, &out)
}

/// Creates `train/`, `eval/`, `test/` under `root` and removes the `.iob`
/// files left in them by a previous run. Returns how many were removed.
pub fn clear_split_dirs(root: &Path) -> Result<usize> {
    let mut removed = 0;
    for split in Split::ALL {
        let dir = root.join(split.name());
        ensure_dir(&dir)?;
        for path in list_files(&dir, IOB_EXTENSION)? {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Copies each assigned document's `<id>.iob` from `staging` into its split
/// directory.
pub fn copy_splits(staging: &Path, root: &Path, outcome: &SplitOutcome) -> Result<usize> {
    let mut copied = 0;
    for split in Split::ALL {
        let dir = root.join(split.name());
        ensure_dir(&dir)?;
        for id in outcome.members(split) {
            let from = iob_path(staging, id);
            let to = iob_path(&dir, id);
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Deletes augmented `.iob` files from `dir` and returns their paths.
pub fn prune_augmented(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in list_files(dir, IOB_EXTENSION)? {
        if is_augmented(&file_stem(&path)) {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            tracing::debug!("Removed {}", path.display());
            removed.push(path);
        }
    }
    tracing::info!("Removed {} augmented file(s) from {}", removed.len(), dir.display());
    Ok(removed)
}

/// Result of [`strip_category_in_dir`].
#[derive(Debug, Default)]
pub struct StripSummary {
    /// Files rewritten.
    pub files: usize,
    /// Token lines removed.
    pub tokens: usize,
    /// Lines that did not parse. They are left in the files untouched.
    pub issues: Vec<Issue>,
}

/// Strips `category` from every `.iob` file of `dir` in place. Only the
/// category's token lines are removed; blank lines and unparsed lines stay.
pub fn strip_category_in_dir(dir: &Path, category: EntityCategory) -> Result<StripSummary> {
    let mut summary = StripSummary::default();
    for path in list_files(dir, IOB_EXTENSION)? {
        let input = read_to_string(&path)?;
        let parse_issues = parse_iob(&input, &file_stem(&path)).issues;
        if !parse_issues.is_empty() {
            tracing::warn!(
                "{}: {} line(s) do not parse and are kept as they are",
                path.display(),
                parse_issues.len()
            );
            summary
                .issues
                .extend(parse_issues.into_iter().map(|i| i.in_file(&path)));
        }

        let (output, removed) = strip_category_iob(&input, category);
        if removed > 0 {
            write_string(&path, &output)?;
            summary.files += 1;
            summary.tokens += removed;
        }
    }
    tracing::info!(
        "Removed {} {} token(s) from {} file(s) in {}",
        summary.tokens,
        category,
        summary.files,
        dir.display()
    );
    Ok(summary)
}
