use crate::structure::StructureError;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SizingError {
    #[error("Atoms per task must be a positive number, got {0}")]
    InvalidRatio(f64),
    #[error("Failed to size task")]
    Structure(#[from] StructureError),
}

/// Capability to count the atoms of a structure file
pub trait AtomCounter {
    fn atom_count(&self, path: &Path) -> Result<usize, StructureError>;
}

/// max(1, floor(atoms / atoms_per_task))
pub fn subtasks(atoms: usize, atoms_per_task: f64) -> usize {
    ((atoms as f64 / atoms_per_task).floor() as usize).max(1)
}

/// Number of subtasks for every structure in `paths`, any unreadable structure aborts
pub fn task_counts<C, P>(
    counter: &C,
    paths: &[P],
    atoms_per_task: f64,
) -> Result<Vec<usize>, SizingError>
where
    C: AtomCounter + ?Sized,
    P: AsRef<Path>,
{
    if !atoms_per_task.is_finite() || atoms_per_task <= 0.0 {
        return Err(SizingError::InvalidRatio(atoms_per_task));
    }

    paths
        .iter()
        .map(|path| {
            let atoms = counter.atom_count(path.as_ref())?;
            let tasks = subtasks(atoms, atoms_per_task);
            debug!(path = ?path.as_ref(), atoms, tasks, "Sized task");

            Ok(tasks)
        })
        .collect()
}
