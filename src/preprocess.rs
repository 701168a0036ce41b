//! Init-image pre-flight pipeline.
//!
//! Before a generation run starts every user-supplied init image must match
//! the backend-mandated resolution. Images that already match pass through
//! untouched; everything else is resized into the session workspace. Each
//! image is handled independently, a failure never aborts sibling work.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::imageops::FilterType;
use image::GenericImageView;
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::session::SessionContext;

/// Prompts longer than this many effective words risk being truncated by
/// the backend.
pub const PROMPT_WORD_WARN_THRESHOLD: usize = 55;

/// Rename attempts before `unique_path` gives up.
pub const UNIQUE_PATH_MAX_TRIES: u32 = 1000;

/// Result of a batch normalization run.
#[derive(Debug)]
pub struct PreprocessOutcome {
    /// Original path to usable path. Entries for failed images are absent.
    pub mapping: HashMap<PathBuf, PathBuf>,
    /// Images imported successfully, including pass-throughs.
    pub succeeded: usize,
    /// Images that needed a resize.
    pub resized: usize,
    target: (u32, u32),
}

impl PreprocessOutcome {
    /// Human-readable one-line summary for the presentation layer.
    pub fn summary(&self) -> String {
        if self.resized > 0 {
            format!(
                "Imported {} images - {} were resized to {}x{}.",
                self.succeeded, self.resized, self.target.0, self.target.1
            )
        } else {
            format!("Imported {} images.", self.succeeded)
        }
    }
}

enum Normalized {
    PassThrough,
    Resized(PathBuf),
}

/// Normalizes init images into the session workspace.
pub struct Preprocessor {
    session: SessionContext,
}

impl Preprocessor {
    pub fn new(session: SessionContext) -> Self {
        Self { session }
    }

    /// Concurrently bring every source image to `target` dimensions.
    ///
    /// Parallelism is bounded by the processor count; decode and resize run
    /// on blocking worker threads. The returned outcome is only built after
    /// every scheduled task has finished.
    pub async fn normalize_init_images(
        &self,
        paths: &[PathBuf],
        target: (u32, u32),
    ) -> Result<PreprocessOutcome> {
        log::info!("Importing initialization images...");

        let inits_dir = self.session.session_dir()?.join("inits");
        fs::create_dir_all(&inits_dir)?;

        let succeeded = Arc::new(AtomicUsize::new(0));
        let resized = Arc::new(AtomicUsize::new(0));
        let permits = Arc::new(Semaphore::new(num_cpus::get()));
        let mut tasks: JoinSet<(usize, PathBuf, Option<PathBuf>)> = JoinSet::new();

        for (index, source) in paths.iter().cloned().enumerate() {
            let permits = Arc::clone(&permits);
            let succeeded = Arc::clone(&succeeded);
            let resized = Arc::clone(&resized);
            let inits_dir = inits_dir.clone();

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                let work_source = source.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    normalize_one(&work_source, target, &inits_dir, index)
                })
                .await;

                match outcome {
                    Ok(Ok(Normalized::PassThrough)) => {
                        log::debug!(
                            "Init image {:?} already has target dimensions {}x{}",
                            source,
                            target.0,
                            target.1
                        );
                        succeeded.fetch_add(1, Ordering::Relaxed);
                        (index, source.clone(), Some(source))
                    }
                    Ok(Ok(Normalized::Resized(out))) => {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                        resized.fetch_add(1, Ordering::Relaxed);
                        (index, source, Some(out))
                    }
                    Ok(Err(e)) => {
                        log::warn!("Failed to import init image {:?}: {}", source, e);
                        (index, source, None)
                    }
                    Err(e) => {
                        log::warn!("Init image worker for {:?} panicked: {}", source, e);
                        (index, source, None)
                    }
                }
            });
        }

        // One slot per input index; nothing is read until every task joins.
        let mut slots: Vec<Option<(PathBuf, PathBuf)>> = vec![None; paths.len()];
        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, original, usable)) = joined {
                slots[index] = usable.map(|out| (original, out));
            }
        }

        let outcome = PreprocessOutcome {
            mapping: slots.into_iter().flatten().collect(),
            succeeded: succeeded.load(Ordering::Relaxed),
            resized: resized.load(Ordering::Relaxed),
            target,
        };

        log::info!("{}", outcome.summary());
        Ok(outcome)
    }

    /// Synchronously resize one mandatory init image to the fixed
    /// session-scoped filename, overwriting any prior value. No
    /// pass-through: the image is always re-encoded.
    pub fn resize_single(&self, path: &Path, target: (u32, u32)) -> Result<PathBuf> {
        let out = self.session.session_dir()?.join("init.bmp");

        let img = image::open(path)?;
        img.resize_exact(target.0, target.1, FilterType::Triangle)
            .to_rgb8()
            .save(&out)?;

        log::debug!("Resized init image to {}x{}.", target.0, target.1);
        Ok(out)
    }
}

fn normalize_one(
    source: &Path,
    target: (u32, u32),
    inits_dir: &Path,
    index: usize,
) -> Result<Normalized> {
    let img = image::open(source)?;
    if img.dimensions() == target {
        return Ok(Normalized::PassThrough);
    }

    // Output is named by ordinal index, not original filename, so two
    // sources with the same basename cannot collide.
    let out = inits_dir.join(format!("{}.png", index));
    img.resize_exact(target.0, target.1, FilterType::Triangle)
        .save(&out)?;
    Ok(Normalized::Resized(out))
}

/// Drop init-image entries whose file no longer exists. Returns the kept
/// paths and the number removed.
pub fn prune_missing(paths: &[PathBuf]) -> (Vec<PathBuf>, usize) {
    let kept: Vec<PathBuf> = paths.iter().filter(|p| p.is_file()).cloned().collect();
    let removed = paths.len() - kept.len();
    (kept, removed)
}

/// Count the words the backend will actually see: bracketed exclusion
/// segments are interpreted as syntax, not prompt content, and are stripped
/// before counting.
pub fn effective_word_count(prompt: &str) -> usize {
    let exclusions = Regex::new(r"\[[^\[]*?\]").expect("literal pattern is valid");
    let stripped = exclusions.replace_all(prompt, "");
    let stripped = stripped.replace(['[', ']'], "");
    stripped
        .split([' ', '\r', '\n'])
        .filter(|word| !word.is_empty())
        .count()
}

/// Effective word count of the longest prompt in the batch.
pub fn longest_prompt_word_count(prompts: &[String]) -> usize {
    prompts
        .iter()
        .max_by_key(|prompt| prompt.len())
        .map(|prompt| effective_word_count(prompt))
        .unwrap_or(0)
}

/// Whether any prompt in the batch exceeds the warning threshold.
pub fn prompt_too_long(prompts: &[String]) -> bool {
    longest_prompt_word_count(prompts) > PROMPT_WORD_WARN_THRESHOLD
}

/// Whether a prompt uses bracketed exclusion syntax.
pub fn contains_exclusion_syntax(prompt: &str) -> bool {
    let pairs = Regex::new(r"\[[^\]]*\]").expect("literal pattern is valid");
    pairs.is_match(prompt)
}

/// Find a free path near `preferred` by appending a counter before the
/// extension. `None` after `UNIQUE_PATH_MAX_TRIES` attempts.
pub fn unique_path(preferred: &Path) -> Option<PathBuf> {
    unique_path_with_limit(preferred, UNIQUE_PATH_MAX_TRIES)
}

/// `unique_path` with a caller-chosen attempt limit.
pub fn unique_path_with_limit(preferred: &Path, max_tries: u32) -> Option<PathBuf> {
    if !preferred.exists() {
        return Some(preferred.to_path_buf());
    }

    let parent = preferred.parent().unwrap_or_else(|| Path::new(""));
    let stem = preferred
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = preferred.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter: u32 = 1;
    loop {
        let file_name = match &ext {
            Some(ext) => format!("{}{}.{}", stem, counter, ext),
            None => format!("{}{}", stem, counter),
        };
        let candidate = parent.join(file_name);
        if !candidate.exists() {
            return Some(candidate);
        }

        counter += 1;
        if counter >= max_tries {
            return None;
        }
    }
}

/// Move a post-processed image next to its source as `stem.fix.ext`,
/// avoiding collisions with a numeric suffix.
pub fn export_postprocessed(source: &Path, processed: &Path) -> Result<PathBuf> {
    let preferred = match source.extension() {
        Some(ext) => {
            let stem = source.with_extension("");
            PathBuf::from(format!("{}.fix.{}", stem.display(), ext.to_string_lossy()))
        }
        None => {
            let mut path = source.as_os_str().to_owned();
            path.push(".fix");
            PathBuf::from(path)
        }
    };

    let dest = unique_path(&preferred).ok_or(Error::PathCollision(preferred))?;
    fs::rename(processed, &dest)?;
    log::info!("Saved post-processed image as {:?}", dest);
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_word_count_strips_exclusions() {
        assert_eq!(effective_word_count("a quick brown fox"), 4);
        assert_eq!(effective_word_count("portrait [ugly, blurry] of a cat"), 4);
        assert_eq!(effective_word_count("line one\r\nline two"), 4);
        assert_eq!(effective_word_count("dangling [ bracket"), 3);
        assert_eq!(effective_word_count(""), 0);
    }

    #[test]
    fn test_longest_prompt_wins() {
        let prompts = vec![
            "short one".to_string(),
            "this is the longest prompt in the whole batch".to_string(),
        ];
        assert_eq!(longest_prompt_word_count(&prompts), 9);
        assert!(!prompt_too_long(&prompts));

        let long = vec!["word ".repeat(PROMPT_WORD_WARN_THRESHOLD + 1)];
        assert!(prompt_too_long(&long));
    }

    #[test]
    fn test_contains_exclusion_syntax() {
        assert!(contains_exclusion_syntax("cat [not a dog]"));
        assert!(!contains_exclusion_syntax("cat without brackets"));
        assert!(!contains_exclusion_syntax("unclosed [ bracket"));
    }

    #[test]
    fn test_unique_path_free_path_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        assert_eq!(unique_path(&path), Some(path));
    }

    #[test]
    fn test_unique_path_counts_past_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        fs::write(&path, b"x").unwrap();
        fs::write(dir.path().join("out1.png"), b"x").unwrap();
        fs::write(dir.path().join("out2.png"), b"x").unwrap();

        assert_eq!(unique_path(&path), Some(dir.path().join("out3.png")));
    }

    #[test]
    fn test_unique_path_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        fs::write(&path, b"x").unwrap();
        for counter in 1..5 {
            fs::write(dir.path().join(format!("out{}.png", counter)), b"x").unwrap();
        }

        assert_eq!(unique_path_with_limit(&path, 5), None);
    }

    #[test]
    fn test_prune_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.png");
        fs::write(&present, b"x").unwrap();
        let gone = dir.path().join("b.png");

        let (kept, removed) = prune_missing(&[present.clone(), gone]);
        assert_eq!(kept, vec![present]);
        assert_eq!(removed, 1);
    }
}
