use crate::assemble::Run;
use itertools::Itertools;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Several runs packed into one job, every label maps to one path per member run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub fields: Vec<(String, Vec<PathBuf>)>,
    pub task_dir: PathBuf,
    pub members: Vec<PathBuf>,
}

impl Batch {
    fn new(run: &Run, task_dir: PathBuf) -> Self {
        Self {
            fields: run
                .args
                .iter()
                .map(|(label, _)| (label.clone(), Vec::new()))
                .collect(),
            task_dir,
            members: Vec::new(),
        }
    }

    fn push(&mut self, run: &Run) {
        for (label, path) in run.args.iter() {
            match self.fields.iter_mut().find(|(name, _)| name == label) {
                Some((_, paths)) => paths.push(path.clone()),
                None => self.fields.push((label.clone(), vec![path.clone()])),
            }
        }

        self.members.push(run.task_dir.clone());
    }

    pub fn get(&self, label: &str) -> Option<&[PathBuf]> {
        self.fields
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, paths)| paths.as_slice())
    }

    /// path of the first member for `label`
    pub fn first(&self, label: &str) -> Option<&Path> {
        self.get(label)
            .and_then(|paths| paths.first())
            .map(PathBuf::as_path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// One argument per label, each a bracketed list literal of the member paths
    pub fn render_args(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|(_, paths)| render_list(paths))
            .collect()
    }
}

/// `['a', 'b']` with quotes and backslashes escaped
pub fn render_list<P: AsRef<Path>>(paths: &[P]) -> String {
    let items = paths
        .iter()
        .map(|path| {
            let escaped = path
                .as_ref()
                .to_string_lossy()
                .replace('\\', "\\\\")
                .replace('\'', "\\'");
            format!("'{escaped}'")
        })
        .join(", ");

    format!("[{items}]")
}

/// Walk `levels` parents up, stopping at the filesystem root
pub fn ancestor(path: &Path, levels: usize) -> PathBuf {
    let mut current = path;

    for _ in 0..levels {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    current.to_path_buf()
}

/// Group runs by the ancestor `levels` above their task directory. Batches keep the order in
/// which their ancestor first appears and members keep run order. `levels == 0` never merges.
pub fn batch_by_parent(runs: &[Run], levels: usize) -> Vec<Batch> {
    if levels == 0 {
        return runs
            .iter()
            .map(|run| {
                let mut batch = Batch::new(run, run.task_dir.clone());
                batch.push(run);
                batch
            })
            .collect();
    }

    let mut batches: Vec<Batch> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for run in runs {
        let parent = ancestor(&run.task_dir, levels);
        let position = *index.entry(parent.clone()).or_insert_with(|| {
            batches.push(Batch::new(run, parent));
            batches.len() - 1
        });

        batches[position].push(run);
    }

    debug!(
        runs = runs.len(),
        batches = batches.len(),
        levels,
        "Batched runs by parent directory"
    );

    batches
}
