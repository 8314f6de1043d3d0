use super::{FamilyError, PendingTask, RunLayout, SortKey};
use crate::{
    assemble::Run,
    batch::batch_by_parent,
    matching::Role,
    sizing::{self, AtomCounter},
};
use std::{
    cmp::Reverse,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

pub const STRUCTURE: &str = "structure";

/// LAMMPS runs driven through a python task script, sized by atom count
#[derive(Debug, Clone)]
pub struct LammpsJob {
    pub layout: RunLayout,
    // ffield, in_lammps, control and structure
    pub roles: Vec<Role>,
    // file name of the task script inside the inputs directory
    pub task_script: String,
    // argv order the task script expects
    pub order: Vec<String>,
    // group runs by the ancestor this many levels up
    pub batch_levels: Option<usize>,
    pub atoms_per_task: f64,
    pub cpus_per_task: usize,
    pub gpus_per_task: usize,
    pub sort: bool,
    pub python: PathBuf,
}

pub(super) fn structure_of(run: &Run) -> Result<&Path, FamilyError> {
    run.get(STRUCTURE)
        .ok_or_else(|| FamilyError::MissingLabel(STRUCTURE.to_owned()))
}

impl LammpsJob {
    pub fn sort_key(&self, counter: &dyn AtomCounter, path: &Path) -> Result<SortKey, FamilyError> {
        let atoms = counter
            .atom_count(path)
            .map_err(sizing::SizingError::from)?;

        Ok(SortKey::Atoms(Reverse(atoms)))
    }

    pub fn task_counts(
        &self,
        counter: &dyn AtomCounter,
        paths: &[PathBuf],
    ) -> Result<Vec<usize>, FamilyError> {
        Ok(sizing::task_counts(counter, paths, self.atoms_per_task)?)
    }

    /// absolute path of the task script, which has to exist
    pub fn task_script_path(&self) -> Result<PathBuf, FamilyError> {
        let path = self.layout.inputs_directory.join(&self.task_script);

        match path.canonicalize() {
            Ok(resolved) if resolved.is_file() => Ok(resolved),
            _ => Err(FamilyError::MissingTaskScript(path)),
        }
    }

    pub fn task_command(&self) -> Result<Vec<String>, FamilyError> {
        Ok(vec![
            self.python.to_string_lossy().into_owned(),
            self.task_script_path()?.to_string_lossy().into_owned(),
        ])
    }

    pub fn runs(&self) -> Result<Vec<Run>, FamilyError> {
        if !self.order.iter().any(|label| label == STRUCTURE) {
            return Err(FamilyError::MissingLabel(STRUCTURE.to_owned()));
        }

        self.layout
            .build_runs(&self.roles, Some(self.order.as_slice()))
    }

    /// One task per run, or per batch when batching; either is sized by its (first) structure
    pub fn pending(&self, runs: Vec<Run>) -> Result<Vec<PendingTask>, FamilyError> {
        let Some(levels) = self.batch_levels else {
            return runs
                .into_iter()
                .map(|run| {
                    let size_path = structure_of(&run)?.to_path_buf();

                    Ok(PendingTask {
                        args: run
                            .paths()
                            .map(|path| path.to_string_lossy().into_owned())
                            .collect(),
                        task_dir: run.task_dir,
                        size_path,
                    })
                })
                .collect();
        };

        let batches = batch_by_parent(&runs, levels);

        info!(
            runs = runs.len(),
            batches = batches.len(),
            "Batched runs by parent directory"
        );

        batches
            .into_iter()
            .map(|batch| {
                debug!(task_dir = ?batch.task_dir, members = batch.members.len(), "Batched runs");

                // a batch is sized by its first member only
                let size_path = batch
                    .first(STRUCTURE)
                    .map(Path::to_path_buf)
                    .ok_or_else(|| FamilyError::MissingLabel(STRUCTURE.to_owned()))?;

                Ok(PendingTask {
                    args: batch.render_args(),
                    task_dir: batch.task_dir,
                    size_path,
                })
            })
            .collect()
    }
}
