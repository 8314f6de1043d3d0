use super::{flag_args, run_flags, FamilyError, PendingTask, RunLayout};
use crate::{assemble::Run, matching::Role};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use std::path::PathBuf;
use tracing::debug;

/// MACE refits, every run is repeated once per random seed in its own directory
#[derive(Debug, Clone)]
pub struct MaceJob {
    pub layout: RunLayout,
    // foundation_model, config, train_file and test_file
    pub roles: Vec<Role>,
    pub fits_per_runpath: usize,
    // seeds are drawn from 0..seed_upper without replacement
    pub seed_upper: usize,
    // fixes the seed draw, otherwise it is seeded from the OS
    pub rng_seed: Option<u64>,
    pub cpus_per_task: usize,
    pub gpus_per_task: usize,
    pub sort: bool,
    pub program: String,
    pub run_name: String,
}

/// Repeat every run `fits` times below `<task_dir>/<seed>`, seeds are distinct per run
pub fn expand_seeds<R: Rng + ?Sized>(
    runs: Vec<Run>,
    fits: usize,
    upper: usize,
    rng: &mut R,
) -> Result<Vec<(Run, usize)>, FamilyError> {
    if fits > upper {
        return Err(FamilyError::TooManyFits { fits, upper });
    }

    let mut expanded = Vec::with_capacity(runs.len() * fits);

    for run in runs {
        for seed in index::sample(rng, upper, fits).into_iter() {
            let mut seeded = run.clone();
            seeded.task_dir = run.task_dir.join(seed.to_string());
            expanded.push((seeded, seed));
        }
    }

    Ok(expanded)
}

impl MaceJob {
    pub fn task_counts(&self, paths: &[PathBuf]) -> Vec<usize> {
        vec![1; paths.len()]
    }

    pub fn task_command(&self) -> Vec<String> {
        vec![self.program.clone()]
    }

    pub fn runs(&self) -> Result<Vec<Run>, FamilyError> {
        self.layout.build_runs(&self.roles, None)
    }

    /// One task per run and seed, led by the run name and seed flags
    pub fn pending(&self, runs: Vec<Run>) -> Result<Vec<PendingTask>, FamilyError> {
        let expanded = match self.rng_seed {
            Some(seed) => expand_seeds(
                runs,
                self.fits_per_runpath,
                self.seed_upper,
                &mut StdRng::seed_from_u64(seed),
            )?,
            None => expand_seeds(
                runs,
                self.fits_per_runpath,
                self.seed_upper,
                &mut rand::rng(),
            )?,
        };

        debug!(tasks = expanded.len(), "Expanded runs by seed");

        Ok(expanded
            .into_iter()
            .map(|(run, seed)| {
                let mut args = flag_args([
                    ("name", self.run_name.clone()),
                    ("seed", seed.to_string()),
                ]);
                args.extend(run_flags(&run));

                PendingTask {
                    args,
                    size_path: run.task_dir.clone(),
                    task_dir: run.task_dir,
                }
            })
            .collect())
    }
}
