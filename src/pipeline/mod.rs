// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Drive work units through an ordered list of stages.
//!
//! Stages run strictly one after another; every task of a stage finishes
//! before the next stage starts. A fan-out stage runs its body once per
//! applicable unit on a bounded pool of worker threads. A collective stage runs
//! once over all units.
//!
//! The first failure stops the run. Tasks that were already handed to a worker
//! are allowed to finish, but nothing new is dispatched and no later stage
//! starts.

mod error;

pub use error::{StageError, StageFailure};

use std::{
    num::NonZeroUsize,
    sync::Mutex,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::unbounded;
use crossbeam_utils::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use scopeguard::defer_on_unwind;

use crate::{
    units::{Role, UnitId, WorkUnit},
    PROGRESS_BARS,
};

/// The body of a fan-out stage.
pub type FanOutFn<'a> = dyn Fn(&mut WorkUnit, &Peers) -> Result<(), StageError> + Send + Sync + 'a;

/// The body of a collective stage.
pub type CollectiveFn<'a> = dyn Fn(&mut [WorkUnit]) -> Result<(), StageError> + Send + Sync + 'a;

pub enum StageShape<'a> {
    FanOut(Box<FanOutFn<'a>>),
    Collective(Box<CollectiveFn<'a>>),
}

pub struct Stage<'a> {
    name: String,
    shape: StageShape<'a>,
    /// If set, a fan-out stage only runs on units with this role.
    role: Option<Role>,
    max_parallel: Option<NonZeroUsize>,
}

impl<'a> Stage<'a> {
    pub fn fan_out<F>(name: &str, f: F) -> Stage<'a>
    where
        F: Fn(&mut WorkUnit, &Peers) -> Result<(), StageError> + Send + Sync + 'a,
    {
        Stage {
            name: name.to_string(),
            shape: StageShape::FanOut(Box::new(f)),
            role: None,
            max_parallel: None,
        }
    }

    pub fn collective<F>(name: &str, f: F) -> Stage<'a>
    where
        F: Fn(&mut [WorkUnit]) -> Result<(), StageError> + Send + Sync + 'a,
    {
        Stage {
            name: name.to_string(),
            shape: StageShape::Collective(Box::new(f)),
            role: None,
            max_parallel: None,
        }
    }

    /// Only run this stage on units of the given role.
    pub fn for_role(mut self, role: Role) -> Stage<'a> {
        self.role = Some(role);
        self
    }

    /// Run at most `n` tasks of this stage at once. Zero means "no bound".
    pub fn max_parallel(mut self, n: usize) -> Stage<'a> {
        self.max_parallel = NonZeroUsize::new(n);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// The configured bound on concurrent tasks, if any.
    pub fn bound(&self) -> Option<usize> {
        self.max_parallel.map(|n| n.get())
    }

    pub fn is_collective(&self) -> bool {
        matches!(self.shape, StageShape::Collective(_))
    }

    fn applies_to(&self, unit: &WorkUnit) -> bool {
        self.role.map(|r| r == unit.role()).unwrap_or(true)
    }

    /// How many workers to use for `num_tasks` tasks.
    fn num_workers(&self, num_tasks: usize) -> usize {
        let bound = match self.max_parallel {
            Some(n) => n.get(),
            None => thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        bound.min(num_tasks).max(1)
    }
}

impl std::fmt::Debug for Stage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("collective", &self.is_collective())
            .field("role", &self.role)
            .field("max_parallel", &self.max_parallel)
            .finish()
    }
}

/// A read-only view of all units, taken when a fan-out stage starts. Tasks
/// use this to look at other units' results from earlier stages.
#[derive(Debug, Clone)]
pub struct Peers {
    units: Vec<WorkUnit>,
}

impl Peers {
    fn snapshot(units: &[WorkUnit]) -> Peers {
        Peers {
            units: units.to_vec(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkUnit> {
        self.units.iter()
    }

    pub fn get(&self, id: &UnitId) -> Option<&WorkUnit> {
        self.units.iter().find(|u| u.id() == id)
    }

    /// The calibrator unit covering `band`.
    pub fn calibrator_for(&self, band: usize) -> Result<&WorkUnit, StageError> {
        self.units
            .iter()
            .find(|u| u.role() == Role::Calibrator && u.id().band == band)
            .ok_or(StageError::MissingCalibrator { band })
    }
}

#[derive(Debug)]
pub enum PipelineStatus {
    Pending,
    Running { stage: String },
    Completed,
    Failed(StageFailure),
}

impl PipelineStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineStatus::Completed)
    }
}

pub struct Pipeline<'a> {
    name: String,
    stages: Vec<Stage<'a>>,
    status: Mutex<PipelineStatus>,
}

impl<'a> Pipeline<'a> {
    pub fn new(name: &str) -> Pipeline<'a> {
        Pipeline {
            name: name.to_string(),
            stages: vec![],
            status: Mutex::new(PipelineStatus::Pending),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, stage: Stage<'a>) -> Pipeline<'a> {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage<'a>] {
        &self.stages
    }

    /// Which stage is running right now, if any.
    pub fn current_stage(&self) -> Option<String> {
        match &*self.status.lock().unwrap() {
            PipelineStatus::Running { stage } => Some(stage.clone()),
            _ => None,
        }
    }

    /// Run every stage over `units`. The returned status is either
    /// [`PipelineStatus::Completed`] or [`PipelineStatus::Failed`].
    pub fn run(&self, units: &mut [WorkUnit]) -> PipelineStatus {
        info!(
            "Running pipeline '{}' ({} stages, {} units)",
            self.name,
            self.stages.len(),
            units.len()
        );
        let start = Instant::now();
        for stage in &self.stages {
            *self.status.lock().unwrap() = PipelineStatus::Running {
                stage: stage.name.clone(),
            };
            let stage_start = Instant::now();
            let result = match &stage.shape {
                StageShape::FanOut(f) => run_fan_out(stage, f.as_ref(), units),
                StageShape::Collective(f) => {
                    info!("Stage '{}'", stage.name);
                    f(units).map_err(|source| StageFailure {
                        stage: stage.name.clone(),
                        unit: None,
                        source,
                    })
                }
            };
            info!(
                "Stage '{}' took {}",
                stage.name,
                format_duration(stage_start.elapsed())
            );
            if let Err(failure) = result {
                warn!("{failure}");
                *self.status.lock().unwrap() = PipelineStatus::Pending;
                return PipelineStatus::Failed(failure);
            }
        }
        *self.status.lock().unwrap() = PipelineStatus::Pending;
        info!(
            "Pipeline '{}' finished in {}",
            self.name,
            format_duration(start.elapsed())
        );
        PipelineStatus::Completed
    }
}

fn run_fan_out(
    stage: &Stage,
    f: &FanOutFn,
    units: &mut [WorkUnit],
) -> Result<(), StageFailure> {
    // Tasks see other units as they were at the end of the previous stage.
    let peers = Peers::snapshot(units);

    let applicable: Vec<&mut WorkUnit> = units
        .iter_mut()
        .filter(|u| stage.applies_to(u))
        .collect();
    if applicable.is_empty() {
        debug!("Stage '{}' has no units to work on", stage.name);
        return Ok(());
    }
    let num_tasks = applicable.len();
    let num_workers = stage.num_workers(num_tasks);
    info!(
        "Stage '{}': {num_tasks} tasks on {num_workers} workers",
        stage.name
    );

    let (tx, rx) = unbounded();
    for unit in applicable {
        // The receiver is alive, so this can't fail.
        tx.send(unit).expect("receiver is alive");
    }
    drop(tx);

    let progress = ProgressBar::with_draw_target(
        Some(num_tasks as u64),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:20}: [{wide_bar:.blue}] {pos:3}/{len:3} units ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message(stage.name.clone());

    // Set once anything fails; workers stop taking new units.
    let stop = AtomicCell::new(false);
    let failure: Mutex<Option<StageFailure>> = Mutex::new(None);

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let handle = thread::Builder::new()
                .name(format!("{}-{i}", stage.name))
                .spawn_scoped(scope, || {
                    // If a panic happens, don't dispatch anything else.
                    defer_on_unwind! { stop.store(true); }

                    for unit in rx.iter() {
                        if stop.load() {
                            break;
                        }
                        let result = f(unit, &peers);
                        progress.inc(1);
                        if let Err(source) = result {
                            stop.store(true);
                            let mut slot = failure.lock().unwrap();
                            // Only the first failure is kept.
                            if slot.is_none() {
                                *slot = Some(StageFailure {
                                    stage: stage.name.clone(),
                                    unit: Some(unit.id().clone()),
                                    source,
                                });
                            }
                        }
                    }
                })
                .expect("OS can create threads");
            handles.push(handle);
        }

        // Panics in workers propagate here.
        for handle in handles {
            handle.join().unwrap();
        }
    });

    match failure.into_inner().unwrap() {
        Some(failure) => {
            progress.abandon_with_message(format!("{} failed", stage.name));
            Err(failure)
        }
        None => {
            progress.finish_with_message(stage.name.clone());
            Ok(())
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1} s")
    } else {
        format!("{:.0} min {:.0} s", (secs / 60.0).floor(), secs % 60.0)
    }
}
