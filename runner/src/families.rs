mod lammps;
mod mace;
mod reaxff;

pub use lammps::LammpsJob;
pub use mace::MaceJob;
pub use reaxff::ReaxFFJob;

use crate::{
    assemble::{build_full_runs, AssembleError, Run},
    executors::{PlannedTask, TaskPlan},
    matching::Role,
    sizing::{AtomCounter, SizingError},
};
use itertools::Itertools;
use std::{
    cmp::Reverse,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FamilyError {
    #[error("Failed to assemble runs")]
    Assemble(#[from] AssembleError),
    #[error("Failed to size tasks")]
    Sizing(#[from] SizingError),
    #[error("Check file {0} does not name a known input file")]
    UnknownCheckFile(String),
    #[error("Invalid task command {0:?}; file does not exist")]
    MissingTaskScript(PathBuf),
    #[error("Runs carry no {0} argument")]
    MissingLabel(String),
    #[error("Cannot draw {fits} distinct seeds below {upper}")]
    TooManyFits { fits: usize, upper: usize },
}

/// Ordering used to arrange tasks before hand-off
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    // larger structures first
    Atoms(Reverse<usize>),
    Name(String),
}

/// The two trees a family draws its files from
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub run_directory: PathBuf,
    pub inputs_directory: PathBuf,
    // labels searched in the run directory, all other roles come from the inputs directory
    pub check_files: Vec<String>,
}

impl RunLayout {
    /// per-case roles in `check_files` order and template roles in declaration order
    pub fn split_roles(&self, roles: &[Role]) -> Result<(Vec<Role>, Vec<Role>), FamilyError> {
        let case_roles = self
            .check_files
            .iter()
            .map(|label| {
                roles
                    .iter()
                    .find(|role| &role.label == label)
                    .cloned()
                    .ok_or_else(|| FamilyError::UnknownCheckFile(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let template_roles = roles
            .iter()
            .filter(|role| !self.check_files.contains(&role.label))
            .cloned()
            .collect_vec();

        Ok((case_roles, template_roles))
    }

    /// Match both trees; without an explicit `order` the per-case labels come first
    pub fn build_runs(&self, roles: &[Role], order: Option<&[String]>) -> Result<Vec<Run>, FamilyError> {
        let (case_roles, template_roles) = self.split_roles(roles)?;
        let default_order = case_roles
            .iter()
            .chain(template_roles.iter())
            .map(|role| role.label.clone())
            .collect_vec();

        let runs = build_full_runs(
            &self.run_directory,
            &case_roles,
            &self.inputs_directory,
            &template_roles,
            order.unwrap_or(&default_order),
        )?;

        debug!(runs = runs.len(), "Built runs");

        Ok(runs)
    }
}

/// `--label value` for every pair
pub fn flag_args<'a, I>(pairs: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    pairs
        .into_iter()
        .flat_map(|(label, value)| [format!("--{label}"), value])
        .collect()
}

/// Label/path pairs of a run as flag arguments
pub fn run_flags(run: &Run) -> Vec<String> {
    flag_args(
        run.args
            .iter()
            .map(|(label, path)| (label.as_str(), path.to_string_lossy().into_owned())),
    )
}

/// Stable sort of `runs` by a fallible key
pub fn sort_runs<F>(runs: Vec<Run>, key: F) -> Result<Vec<Run>, FamilyError>
where
    F: Fn(&Run) -> Result<SortKey, FamilyError>,
{
    let mut keyed = runs
        .into_iter()
        .map(|run| key(&run).map(|sort_key| (sort_key, run)))
        .collect::<Result<Vec<_>, _>>()?;

    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));

    Ok(keyed.into_iter().map(|(_, run)| run).collect())
}

/// path sort key shared by the families that don't size by structure
pub fn name_key(path: &Path) -> SortKey {
    SortKey::Name(path.to_string_lossy().to_lowercase())
}

/// A task whose subtask count is still to be derived from `size_path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub args: Vec<String>,
    pub task_dir: PathBuf,
    pub size_path: PathBuf,
}

/// All supported job families
/// (this is deliberately not made with dynamic dispatch to avoid the headache)
#[derive(Debug, Clone)]
pub enum JobFamily {
    Lammps(LammpsJob),
    ReaxFF(ReaxFFJob),
    Mace(MaceJob),
}

impl JobFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lammps(_) => "lammps",
            Self::ReaxFF(_) => "reaxff",
            Self::Mace(_) => "mace",
        }
    }

    pub fn sort_key(&self, counter: &dyn AtomCounter, path: &Path) -> Result<SortKey, FamilyError> {
        match self {
            Self::Lammps(job) => job.sort_key(counter, path),
            Self::ReaxFF(_) | Self::Mace(_) => Ok(name_key(path)),
        }
    }

    pub fn task_counts(
        &self,
        counter: &dyn AtomCounter,
        paths: &[PathBuf],
    ) -> Result<Vec<usize>, FamilyError> {
        match self {
            Self::Lammps(job) => job.task_counts(counter, paths),
            Self::ReaxFF(job) => Ok(job.task_counts(paths)),
            Self::Mace(job) => Ok(job.task_counts(paths)),
        }
    }

    pub fn task_command(&self) -> Result<Vec<String>, FamilyError> {
        match self {
            Self::Lammps(job) => job.task_command(),
            Self::ReaxFF(job) => Ok(job.task_command()),
            Self::Mace(job) => Ok(job.task_command()),
        }
    }

    fn sorted(&self) -> bool {
        match self {
            Self::Lammps(job) => job.sort,
            Self::ReaxFF(job) => job.sort,
            Self::Mace(job) => job.sort,
        }
    }

    // (cpus, gpus) per subtask
    fn resources(&self) -> (usize, usize) {
        match self {
            Self::Lammps(job) => (job.cpus_per_task, job.gpus_per_task),
            Self::ReaxFF(job) => (job.cpus_per_task, job.gpus_per_task),
            Self::Mace(job) => (job.cpus_per_task, job.gpus_per_task),
        }
    }

    fn runs(&self) -> Result<Vec<Run>, FamilyError> {
        match self {
            Self::Lammps(job) => job.runs(),
            Self::ReaxFF(job) => job.runs(),
            Self::Mace(job) => job.runs(),
        }
    }

    /// the path a run is ordered by
    fn sort_path<'a>(&self, run: &'a Run) -> Result<&'a Path, FamilyError> {
        match self {
            Self::Lammps(_) => lammps::structure_of(run),
            Self::ReaxFF(_) | Self::Mace(_) => Ok(run.paths().next().unwrap_or(&run.task_dir)),
        }
    }

    fn pending(&self, runs: Vec<Run>) -> Result<Vec<PendingTask>, FamilyError> {
        match self {
            Self::Lammps(job) => job.pending(runs),
            Self::ReaxFF(job) => Ok(job.pending(runs)),
            Self::Mace(job) => job.pending(runs),
        }
    }

    /// Match, sort, size and (for LAMMPS) batch everything into a plan for the executor
    pub fn plan(&self, counter: &dyn AtomCounter) -> Result<TaskPlan, FamilyError> {
        let command = self.task_command()?;
        let mut runs = self.runs()?;

        if self.sorted() {
            runs = sort_runs(runs, |run| self.sort_key(counter, self.sort_path(run)?))?;
        }

        let pending = self.pending(runs)?;
        let size_paths = pending
            .iter()
            .map(|task| task.size_path.clone())
            .collect_vec();
        let counts = self.task_counts(counter, &size_paths)?;

        let tasks = pending
            .into_iter()
            .zip(counts)
            .map(|(task, subtasks)| PlannedTask {
                args: task.args,
                task_dir: task.task_dir,
                subtasks,
            })
            .collect_vec();
        let (cpus_per_task, gpus_per_task) = self.resources();

        debug!(family = self.name(), tasks = tasks.len(), "Planned family tasks");

        Ok(TaskPlan {
            command,
            tasks,
            cpus_per_task,
            gpus_per_task,
        })
    }
}
