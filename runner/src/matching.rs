use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("{0:?} is not a valid directory")]
    InvalidRoot(PathBuf),
    #[error("Failed to resolve root {path:?}: {source}")]
    ResolveRoot { path: PathBuf, source: io::Error },
    #[error("No roles were requested under {0:?}")]
    NoRoles(PathBuf),
    #[error("{label} ({file_name:?}) not found under {root:?}")]
    MissingRole {
        root: PathBuf,
        label: String,
        file_name: String,
    },
}

/// A named input file requirement, i.e., a label and the literal file name to search for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub label: String,
    pub file_name: String,
}

impl Role {
    pub fn new(label: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            file_name: file_name.into(),
        }
    }
}

/// A discovered absolute path, pre-split into its components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    components: Vec<OsString>,
}

impl Candidate {
    pub fn new(path: PathBuf) -> Self {
        let components = path
            .components()
            .map(|component| component.as_os_str().to_owned())
            .collect();

        Self { path, components }
    }

    pub fn components(&self) -> &[OsString] {
        &self.components
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }
}

/// How many leading components two split paths share
pub fn common_prefix<T: PartialEq>(left: &[T], right: &[T]) -> usize {
    left.iter()
        .zip(right.iter())
        .take_while(|(a, b)| a == b)
        .count()
}

/// One chosen candidate per role, kept in role declaration order
#[derive(Debug, Clone)]
pub struct Combination {
    anchor: usize,
    entries: Vec<(String, Candidate)>,
}

impl Combination {
    pub fn anchor(&self) -> &Candidate {
        &self.entries[self.anchor].1
    }

    #[cfg(test)]
    pub fn anchor_label(&self) -> &str {
        &self.entries[self.anchor].0
    }

    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<&Candidate> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, candidate)| candidate)
    }

    pub fn entries(&self) -> &[(String, Candidate)] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// the candidate with the most path components, first one wins on equal depth
    pub fn deepest(&self) -> Option<&Candidate> {
        self.entries.iter().map(|(_, candidate)| candidate).fold(
            None,
            |best: Option<&Candidate>, candidate| match best {
                Some(current) if current.depth() >= candidate.depth() => Some(current),
                _ => Some(candidate),
            },
        )
    }
}

/// Walk `root` and collect, per role, every file whose name equals the role's file name.
/// Entries are visited sorted by file name so the result does not depend on the platform's
/// directory order.
pub fn collect_paths(root: &Path, roles: &[Role]) -> Result<Vec<Vec<Candidate>>, MatchError> {
    let root = root.canonicalize().map_err(|source| MatchError::ResolveRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut found = vec![Vec::new(); roles.len()];
    let mut builder = WalkBuilder::new(&root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));

    builder
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(error = %error, root = ?root, "Skipped unreadable entry while collecting paths");
                None
            }
        })
        // symlinked files count, symlinked directories are not descended into
        .filter(|entry| match entry.file_type() {
            Some(kind) if kind.is_file() => true,
            Some(kind) if kind.is_symlink() => entry.path().is_file(),
            _ => false,
        })
        .map(DirEntry::into_path)
        .for_each(|path| {
            let Some(file_name) = path.file_name() else {
                return;
            };

            for (index, role) in roles.iter().enumerate() {
                if file_name == role.file_name.as_str() {
                    found[index].push(Candidate::new(path.clone()));
                }
            }
        });

    Ok(found)
}

/// Index of the role with the most candidates; the first declared role wins a tie
fn select_anchor(candidates: &[Vec<Candidate>]) -> usize {
    candidates
        .iter()
        .enumerate()
        .fold((0, 0), |(best, count), (index, paths)| {
            if paths.len() > count {
                (index, paths.len())
            } else {
                (best, count)
            }
        })
        .0
}

/// Candidate sharing the longest leading path with `anchor`; first seen wins a tie
fn nearest<'a>(anchor: &Candidate, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
    candidates
        .iter()
        .fold(None, |best: Option<(&Candidate, usize)>, candidate| {
            let shared = common_prefix(anchor.components(), candidate.components());

            match best {
                Some((_, best_shared)) if best_shared >= shared => best,
                _ => Some((candidate, shared)),
            }
        })
        .map(|(candidate, _)| candidate)
}

/// Produce one combination per occurrence of the anchor role under `root`, pairing every
/// other role with its nearest candidate by shared directory prefix.
pub fn proximity_combinations(root: &Path, roles: &[Role]) -> Result<Vec<Combination>, MatchError> {
    if !root.is_dir() {
        return Err(MatchError::InvalidRoot(root.to_path_buf()));
    }

    if roles.is_empty() {
        return Err(MatchError::NoRoles(root.to_path_buf()));
    }

    let candidates = collect_paths(root, roles)?;

    if let Some((role, _)) = roles
        .iter()
        .zip(candidates.iter())
        .find(|(_, paths)| paths.is_empty())
    {
        return Err(MatchError::MissingRole {
            root: root.to_path_buf(),
            label: role.label.clone(),
            file_name: role.file_name.clone(),
        });
    }

    let anchor = select_anchor(&candidates);

    debug!(
        root = ?root,
        anchor = %roles[anchor].label,
        counts = ?roles
            .iter()
            .zip(candidates.iter())
            .map(|(role, paths)| format!("{}={}", role.label, paths.len()))
            .collect_vec(),
        "Collected role candidates"
    );

    let combinations = candidates[anchor]
        .iter()
        .map(|anchor_path| {
            let entries = roles
                .iter()
                .zip(candidates.iter())
                .enumerate()
                .map(|(index, (role, paths))| {
                    let chosen = if index == anchor {
                        anchor_path
                    } else {
                        // non-empty lists were checked above
                        nearest(anchor_path, paths).unwrap_or(&paths[0])
                    };

                    (role.label.clone(), chosen.clone())
                })
                .collect_vec();

            Combination { anchor, entries }
        })
        .collect_vec();

    Ok(combinations)
}
