//! Ordered, de-duplicated list of source images for one slideshow.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::scan::is_supported_image;

/// One source image. Identity is the normalized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    path: PathBuf,
    name: String,
}

impl ImageEntry {
    fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name shown in the list.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The user's image list. Only ever mutated by the UI thread.
#[derive(Debug, Clone, Default)]
pub struct ImageList {
    items: Vec<ImageEntry>,
    seen: HashSet<PathBuf>,
}

impl ImageList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items contained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&ImageEntry> {
        self.items.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.items.iter()
    }

    /// Paths in display order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.items.iter().map(|e| e.path.clone()).collect()
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(&normalize_path(path))
    }

    /// Append supported images that are not already listed. Returns how many were added.
    pub fn add_paths<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut added = 0;
        for path in paths {
            let norm = normalize_path(path.as_ref());
            if !is_supported_image(&norm) || self.seen.contains(&norm) {
                continue;
            }
            self.seen.insert(norm.clone());
            self.items.push(ImageEntry::new(norm));
            added += 1;
        }
        added
    }

    /// Remove the entries at `indices` (any order, duplicates ignored). Returns how many
    /// entries were removed.
    pub fn remove_indices(&mut self, indices: &[usize]) -> usize {
        let doomed: HashSet<usize> = indices
            .iter()
            .copied()
            .filter(|i| *i < self.items.len())
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        let mut idx = 0;
        let seen = &mut self.seen;
        self.items.retain(|entry| {
            let keep = !doomed.contains(&idx);
            if !keep {
                seen.remove(&entry.path);
            }
            idx += 1;
            keep
        });
        doomed.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        self.seen.clear();
        count
    }

    /// Move one entry so that it ends up at position `to`. Returns `false` when either
    /// index is out of bounds.
    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        if from != to {
            let entry = self.items.remove(from);
            self.items.insert(to, entry);
        }
        true
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.items.shuffle(rng);
    }

    /// Stable sort by case-insensitive file name.
    pub fn sort_by_name(&mut self) {
        self.items.sort_by_cached_key(|e| e.name.to_lowercase());
    }
}

/// Absolute path with `.` and `..` components resolved lexically.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
