mod assemble;
mod batch;
mod config;
mod executors;
mod families;
mod lifecycle;
mod matching;
mod scheduler;
mod sizing;
mod structure;

#[cfg(test)]
mod assemble_test;
#[cfg(test)]
mod batch_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod executors_test;
#[cfg(test)]
mod scheduler_test;

use clap::{Args, Parser, Subcommand};
use config::RunnerConfig;
use executors::Executors;
use families::{JobFamily, LammpsJob, MaceJob, ReaxFFJob, RunLayout};
use lifecycle::{Job, JobLifecycleController, LifecycleSettings, Outcome};
use matching::Role;
use scheduler::SlurmScheduler;
use std::{path::PathBuf, process::exit, time::Duration};
use structure::LammpsStructure;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Match, size and launch ensembles of simulation runs", long_about = None)]
struct Cli {
    /// YAML runner configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// LAMMPS runs through a python task script
    Lammps(LammpsArgs),
    /// JAX-ReaxFF force field fits
    Reaxff(ReaxFFArgs),
    /// MACE model refits
    Mace(MaceArgs),
    /// Submit a job script and follow it through the scheduler
    Submit(SubmitArgs),
}

#[derive(Args, Debug)]
struct LayoutArgs {
    /// root searched for the per-case files
    #[arg(short, long, default_value = "run_directory")]
    run_directory: PathBuf,
    /// root searched for the shared template files
    #[arg(short, long, default_value = "inputs_directory")]
    inputs_directory: PathBuf,
    /// print the plan instead of executing it
    #[arg(long)]
    dry_run: bool,
    /// order tasks before hand-off
    #[arg(long)]
    sort: bool,
}

#[derive(Args, Debug)]
struct LammpsArgs {
    #[command(flatten)]
    layout: LayoutArgs,
    /// labels looked up in the run directory
    #[arg(long, num_args = 1.., default_values_t = ["ffield".to_string()])]
    check_files: Vec<String>,
    #[arg(long, default_value = "ffield")]
    ffield: String,
    #[arg(long, default_value = "in.matensemble")]
    in_lammps: String,
    #[arg(long, default_value = "control")]
    control: String,
    #[arg(long, default_value = "structure.lmp")]
    structure: String,
    /// task script, must exist in the inputs directory
    #[arg(long, default_value = "lammps_task.py")]
    lammps_task: String,
    #[arg(
        long,
        num_args = 1..,
        default_values_t = ["ffield", "in_lammps", "control", "structure"].map(String::from)
    )]
    lammps_task_order: Vec<String>,
    /// group runs sharing a parent directory into one task
    #[arg(long)]
    batch: bool,
    #[arg(long, default_value_t = 1)]
    parent_levels: usize,
    #[arg(long, default_value_t = 10.0)]
    atoms_per_task: f64,
    #[arg(long, default_value_t = 1)]
    cpus_per_task: usize,
    #[arg(long, default_value_t = 0)]
    gpus_per_task: usize,
}

#[derive(Args, Debug)]
struct ReaxFFArgs {
    #[command(flatten)]
    layout: LayoutArgs,
    #[arg(long, num_args = 1.., default_values_t = ["init_FF".to_string()])]
    check_files: Vec<String>,
    #[arg(long = "init-ff", default_value = "ffield")]
    init_ff: String,
    #[arg(long, default_value = "params")]
    params: String,
    #[arg(long, default_value = "geo")]
    geo: String,
    #[arg(long, default_value = "trainset.in")]
    train_file: String,
    /// also match a validation set
    #[arg(long)]
    use_valid: bool,
    #[arg(long, default_value = "validset.in")]
    valid_file: String,
    #[arg(long, default_value = "valid_geo")]
    valid_geo_file: String,
    #[arg(long, default_value_t = 4)]
    fits_per_runpath: usize,
    #[arg(long, default_value_t = 16)]
    cpus_per_task: usize,
    #[arg(long, default_value_t = 1)]
    gpus_per_task: usize,
    #[arg(long, default_value = "jaxreaxff")]
    program: String,
    /// forwarded to every fit
    #[arg(last = true)]
    extra_args: Vec<String>,
}

#[derive(Args, Debug)]
struct MaceArgs {
    #[command(flatten)]
    layout: LayoutArgs,
    #[arg(long, num_args = 1.., default_values_t = ["foundation_model".to_string()])]
    check_files: Vec<String>,
    #[arg(long, default_value = "model.model")]
    foundation_model: String,
    #[arg(long, default_value = "config.yml")]
    config_file: String,
    #[arg(long, default_value = "train.xyz")]
    train_file: String,
    #[arg(long, default_value = "test.xyz")]
    test_file: String,
    /// each run is repeated this many times with distinct seeds
    #[arg(long, default_value_t = 1)]
    fits_per_runpath: usize,
    #[arg(long, default_value_t = 10000)]
    seed_upper: usize,
    /// fixes the seed draw
    #[arg(long)]
    rng_seed: Option<u64>,
    #[arg(long, default_value_t = 1)]
    cpus_per_task: usize,
    #[arg(long, default_value_t = 1)]
    gpus_per_task: usize,
    #[arg(long, default_value = "mace_run_train")]
    program: String,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
    #[arg(long)]
    submission_file: PathBuf,
    /// resubmit whenever the job leaves the queue unfinished
    #[arg(long)]
    resubmit: bool,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long, default_value_t = 0)]
    retry_count: u32,
    /// seconds between polls
    #[arg(long)]
    poll_interval: Option<u64>,
}

impl LayoutArgs {
    fn layout(&self, check_files: &[String]) -> RunLayout {
        RunLayout {
            run_directory: self.run_directory.clone(),
            inputs_directory: self.inputs_directory.clone(),
            check_files: check_files.to_vec(),
        }
    }
}

fn lammps_family(args: LammpsArgs, config: &RunnerConfig) -> JobFamily {
    JobFamily::Lammps(LammpsJob {
        layout: args.layout.layout(&args.check_files),
        roles: vec![
            Role::new("ffield", args.ffield),
            Role::new("in_lammps", args.in_lammps),
            Role::new("control", args.control),
            Role::new("structure", args.structure),
        ],
        task_script: args.lammps_task,
        order: args.lammps_task_order,
        batch_levels: args.batch.then_some(args.parent_levels),
        atoms_per_task: args.atoms_per_task,
        cpus_per_task: args.cpus_per_task,
        gpus_per_task: args.gpus_per_task,
        sort: args.layout.sort,
        python: config.python.clone(),
    })
}

fn reaxff_family(args: ReaxFFArgs) -> JobFamily {
    let mut roles = vec![
        Role::new("init_FF", args.init_ff),
        Role::new("params", args.params),
        Role::new("geo", args.geo),
        Role::new("train_file", args.train_file),
    ];
    if args.use_valid {
        roles.push(Role::new("valid_file", args.valid_file));
        roles.push(Role::new("valid_geo_file", args.valid_geo_file));
    }

    JobFamily::ReaxFF(ReaxFFJob {
        layout: args.layout.layout(&args.check_files),
        roles,
        fits_per_runpath: args.fits_per_runpath,
        extra_args: args.extra_args,
        cpus_per_task: args.cpus_per_task,
        gpus_per_task: args.gpus_per_task,
        sort: args.layout.sort,
        program: args.program,
    })
}

fn mace_family(args: MaceArgs) -> JobFamily {
    JobFamily::Mace(MaceJob {
        layout: args.layout.layout(&args.check_files),
        roles: vec![
            Role::new("foundation_model", args.foundation_model),
            Role::new("config", args.config_file),
            Role::new("train_file", args.train_file),
            Role::new("test_file", args.test_file),
        ],
        fits_per_runpath: args.fits_per_runpath,
        seed_upper: args.seed_upper,
        rng_seed: args.rng_seed,
        cpus_per_task: args.cpus_per_task,
        gpus_per_task: args.gpus_per_task,
        sort: args.layout.sort,
        program: args.program,
        run_name: "MACE_MatEnsemble".to_owned(),
    })
}

fn launch(family: JobFamily, dry_run: bool, config: &RunnerConfig) -> bool {
    let plan = match family.plan(&LammpsStructure) {
        Ok(plan) => plan,
        Err(error) => {
            error!(family = family.name(), error = ?error, "Failed to plan tasks");
            return false;
        }
    };

    info!(
        family = family.name(),
        tasks = plan.tasks.len(),
        subtasks = plan.total_subtasks(),
        "Planned tasks"
    );

    let mut executor = match Executors::load(&config.executor, dry_run) {
        Ok(executor) => executor,
        Err(error) => {
            error!(error = ?error, "Failed to load executor");
            return false;
        }
    };

    match executor.execute(&plan) {
        Ok(()) => true,
        Err(error) => {
            error!(family = family.name(), error = ?error, "Failed to execute tasks");
            false
        }
    }
}

fn submit(args: SubmitArgs, config: &RunnerConfig) -> bool {
    let mut settings = LifecycleSettings::from(&config.lifecycle);
    settings.resubmit |= args.resubmit;
    if let Some(max_retries) = args.max_retries {
        settings.max_retries = max_retries;
    }
    if let Some(poll_interval) = args.poll_interval {
        settings.poll_interval = Duration::from_secs(poll_interval);
    }

    let controller =
        JobLifecycleController::new(SlurmScheduler::new(config.scheduler.clone()), settings);
    let mut job = Job::new(args.workdir, args.submission_file, args.retry_count);

    match controller.run(&mut job) {
        Ok(Outcome::Completed(id)) => {
            info!(job = id, "Workflow completed");
            true
        }
        Ok(Outcome::Stopped(id)) | Ok(Outcome::Vanished(id)) => {
            info!(job = id, state = ?job.state, "Stopped following job");
            true
        }
        Err(error) => {
            error!(workdir = ?job.workdir, job = ?job.id, error = ?error, "Job lifecycle failed");
            false
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match RunnerConfig::load(path) {
            Ok(config) => config,
            Err(error) => {
                error!(path = ?path, error = ?error, "Failed to load config");
                exit(1);
            }
        },
        None => RunnerConfig::default(),
    };

    if config.preflight_checks() {
        exit(1);
    }

    let success = match cli.command {
        Command::Lammps(args) => {
            let dry_run = args.layout.dry_run;
            let family = lammps_family(args, &config);
            launch(family, dry_run, &config)
        }
        Command::Reaxff(args) => {
            let dry_run = args.layout.dry_run;
            launch(reaxff_family(args), dry_run, &config)
        }
        Command::Mace(args) => {
            let dry_run = args.layout.dry_run;
            launch(mace_family(args), dry_run, &config)
        }
        Command::Submit(args) => submit(args, &config),
    };

    if !success {
        exit(1);
    }
}
