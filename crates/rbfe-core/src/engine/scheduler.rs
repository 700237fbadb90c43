use super::config::ProductionConfig;
use super::context::RunContext;
use super::error::SchedulerError;
use super::exchange::{ExchangeStats, attempt_exchanges};
use super::perturb::{perturb, retry_rng};
use super::progress::{Progress, ProgressReporter};
use super::replica::ReplicaStatus;
use super::simulation::{Configuration, EngineOutput, EngineRequest, SimulationEngine, SimulationError};
use crate::core::analysis::{FreeEnergyEstimator, IncrementalEstimator};
use crate::core::atm::AtmState;
use crate::core::io::store::{SampleRecord, SampleStore};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Cooperative run-level cancellation, checked at cycle boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The configured number of cycles was reached.
    Completed,
    Cancelled,
    WallClockLimit,
    /// Every replica hit a fatal engine error.
    NoLiveReplicas,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaFailure {
    pub replica: usize,
    pub cycle: u64,
    pub state_index: usize,
    pub attempts: u32,
    pub fatal: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionReport {
    /// Last completed cycle.
    pub last_cycle: u64,
    pub cycles_run: u64,
    pub records_written: usize,
    pub failures: Vec<ReplicaFailure>,
    pub exchange_stats: ExchangeStats,
    pub final_permutation: Vec<usize>,
    pub stop_reason: StopReason,
}

struct Job {
    replica: usize,
    state_index: usize,
    state: AtmState,
    configuration: Configuration,
}

type JobResult = Result<(EngineOutput, u32), ReplicaFailure>;

/// Drives one engine invocation per replica per cycle and the state exchanges
/// between them.
pub struct ReplicaExchangeScheduler<'a> {
    engine: &'a dyn SimulationEngine,
    store: &'a mut dyn SampleStore,
    config: &'a ProductionConfig,
    reporter: &'a ProgressReporter<'a>,
    cancel: CancellationToken,
    monitor: Option<IncrementalEstimator>,
}

impl<'a> ReplicaExchangeScheduler<'a> {
    pub fn new(
        engine: &'a dyn SimulationEngine,
        store: &'a mut dyn SampleStore,
        config: &'a ProductionConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            engine,
            store,
            config,
            reporter,
            cancel: CancellationToken::new(),
            monitor: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Logs a running estimate every `estimate_interval` cycles.
    pub fn with_monitor(mut self, estimator: FreeEnergyEstimator) -> Self {
        self.monitor = Some(IncrementalEstimator::new(estimator));
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(skip_all, name = "replica_exchange")]
    pub fn run(&mut self, context: &mut RunContext) -> Result<ProductionReport, SchedulerError> {
        let started = Instant::now();
        let first_cycle = context.cycle() + 1;
        let remaining = self.config.cycles.saturating_sub(context.cycle());
        info!(
            replicas = context.replicas().len(),
            first_cycle,
            cycles = remaining,
            "Starting replica-exchange production."
        );
        self.reporter.report(Progress::PhaseStart { name: "Production" });
        self.reporter.report(Progress::TaskStart {
            total_steps: remaining,
        });

        let mut failures = Vec::new();
        let mut records_written = 0;
        let mut stop_reason = StopReason::Completed;

        while context.cycle() < self.config.cycles {
            if self.cancel.is_cancelled() {
                info!(cycle = context.cycle(), "Cancellation requested; stopping.");
                stop_reason = StopReason::Cancelled;
                break;
            }
            if let Some(limit) = self.config.wall_clock_limit {
                if started.elapsed() >= limit {
                    info!(?limit, "Wall-clock limit reached; stopping.");
                    stop_reason = StopReason::WallClockLimit;
                    break;
                }
            }
            if !context.replicas().iter().any(|r| r.status().is_live()) {
                warn!("No live replicas left; stopping.");
                stop_reason = StopReason::NoLiveReplicas;
                break;
            }

            let cycle = context.cycle() + 1;
            let (written, cycle_failures) = self.run_cycle(context, cycle)?;
            records_written += written;
            failures.extend(cycle_failures);

            if let Some(checkpoint) = &self.config.checkpoint {
                if checkpoint.interval > 0 && cycle % checkpoint.interval == 0 {
                    context.checkpoint().save(&checkpoint.path)?;
                    debug!(cycle, path = %checkpoint.path.display(), "Checkpoint written.");
                }
            }
            self.reporter.report(Progress::TaskIncrement);
        }

        if let Some(checkpoint) = &self.config.checkpoint {
            context.checkpoint().save(&checkpoint.path)?;
        }
        self.reporter.report(Progress::TaskFinish);
        self.reporter.report(Progress::PhaseFinish);

        let report = ProductionReport {
            last_cycle: context.cycle(),
            cycles_run: (context.cycle() + 1).saturating_sub(first_cycle),
            records_written,
            failures,
            exchange_stats: context.exchange_stats().clone(),
            final_permutation: context.permutation().to_vec(),
            stop_reason,
        };
        info!(
            last_cycle = report.last_cycle,
            records = report.records_written,
            failures = report.failures.len(),
            exchanges_accepted = report.exchange_stats.total_accepted(),
            exchanges_attempted = report.exchange_stats.total_attempts(),
            ?stop_reason,
            "Production finished."
        );
        Ok(report)
    }

    fn run_cycle(
        &mut self,
        context: &mut RunContext,
        cycle: u64,
    ) -> Result<(usize, Vec<ReplicaFailure>), SchedulerError> {
        let jobs = self.dispatch(context)?;
        let results = execute(self.engine, self.config, context.seed(), cycle, &jobs);

        let n = context.replicas().len();
        let mut records: Vec<Option<SampleRecord>> = vec![None; n];
        let mut failures = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            let replica = context.replica_mut(job.replica);
            match result {
                Ok((output, attempts)) => {
                    if attempts > 1 {
                        debug!(replica = job.replica, cycle, attempts, "Replica succeeded after retries.");
                    }
                    let record = SampleRecord::new(
                        job.replica,
                        cycle,
                        job.state_index,
                        &job.state,
                        output.potential_energy,
                        output.perturbation_energy,
                    )
                    .with_snapshot(output.configuration.snapshot.clone());
                    replica.set_configuration(output.configuration);
                    replica.transition(ReplicaStatus::AwaitingExchange)?;
                    records[job.replica] = Some(record);
                }
                Err(failure) => {
                    warn!(
                        replica = failure.replica,
                        cycle,
                        attempts = failure.attempts,
                        fatal = failure.fatal,
                        message = %failure.message,
                        "Replica produced no sample this cycle."
                    );
                    replica.transition(if failure.fatal {
                        ReplicaStatus::Completed
                    } else {
                        ReplicaStatus::Failed
                    })?;
                    failures.push(failure);
                }
            }
        }

        let written: Vec<SampleRecord> = records.iter().flatten().cloned().collect();
        self.store.append(&written)?;

        let (schedule, permutation, rng, stats) = context.exchange_parts();
        let parity = (cycle % 2) as usize;
        let outcomes = attempt_exchanges(schedule, permutation, &records, parity, rng, stats);
        let accepted = outcomes.iter().filter(|o| o.accepted).count();

        let last = cycle >= self.config.cycles;
        for index in 0..n {
            let replica = context.replica_mut(index);
            match replica.status() {
                ReplicaStatus::AwaitingExchange | ReplicaStatus::Failed => {
                    replica.transition(if last {
                        ReplicaStatus::Completed
                    } else {
                        ReplicaStatus::Idle
                    })?;
                }
                _ => {}
            }
        }
        context.finish_cycle(cycle)?;

        debug!(
            cycle,
            records = written.len(),
            failed = failures.len(),
            accepted,
            attempted = outcomes.len(),
            "Cycle complete."
        );
        self.reporter.report(Progress::CycleComplete {
            cycle,
            failed_replicas: failures.len(),
            accepted_exchanges: accepted,
            attempted_exchanges: outcomes.len(),
        });
        self.update_monitor(cycle, &written);
        Ok((written.len(), failures))
    }

    /// Moves every idle replica to `Running` in its current state.
    fn dispatch(&self, context: &mut RunContext) -> Result<Vec<Job>, SchedulerError> {
        let permutation = context.permutation().to_vec();
        let states = context.schedule().states().to_vec();
        let mut jobs = Vec::new();
        for (index, &state_index) in permutation.iter().enumerate() {
            let replica = context.replica_mut(index);
            if replica.status() != ReplicaStatus::Idle {
                continue;
            }
            replica.transition(ReplicaStatus::Running { state: state_index })?;
            jobs.push(Job {
                replica: index,
                state_index,
                state: states[state_index],
                configuration: replica.configuration().clone(),
            });
        }
        Ok(jobs)
    }

    fn update_monitor(&mut self, cycle: u64, records: &[SampleRecord]) {
        let interval = self.config.estimate_interval;
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        monitor.extend(records);
        if interval == 0 || cycle % interval != 0 {
            return;
        }
        match monitor.estimate() {
            Ok(estimate) => {
                info!(cycle, ddg = estimate.ddg, std_error = estimate.std_error, "Running estimate.");
                self.reporter.report(Progress::StatusUpdate {
                    text: format!(
                        "Cycle {cycle}: ΔΔG = {:.2} ± {:.2} kcal/mol",
                        estimate.ddg, estimate.std_error
                    ),
                });
            }
            Err(e) => debug!(cycle, error = %e, "Running estimate not yet available."),
        }
    }
}

/// Runs all jobs of one cycle; returns once every job has finished.
fn execute(
    engine: &dyn SimulationEngine,
    config: &ProductionConfig,
    seed: u64,
    cycle: u64,
    jobs: &[Job],
) -> Vec<JobResult> {
    #[cfg(not(feature = "parallel"))]
    let iterator = jobs.iter();

    #[cfg(feature = "parallel")]
    let iterator = jobs.par_iter();

    iterator
        .map(|job| run_with_retries(engine, config, seed, cycle, job))
        .collect()
}

fn run_with_retries(
    engine: &dyn SimulationEngine,
    config: &ProductionConfig,
    seed: u64,
    cycle: u64,
    job: &Job,
) -> JobResult {
    let mut last_error = String::new();
    for attempt in 0..=config.max_retries {
        let configuration = if attempt == 0 {
            job.configuration.clone()
        } else {
            let mut rng = retry_rng(seed, cycle, job.replica, attempt);
            perturb(&job.configuration, config.perturbation_magnitude, &mut rng)
        };
        let request = EngineRequest {
            replica: job.replica,
            cycle,
            state_index: job.state_index,
            state: job.state,
            attempt,
            configuration,
        };
        match engine.run(&request) {
            Ok(output) if output.is_finite() => return Ok((output, attempt + 1)),
            Ok(_) => {
                last_error = "engine reported non-finite energies".to_string();
            }
            Err(SimulationError::Transient(message)) => {
                last_error = message;
            }
            Err(SimulationError::Fatal(message)) => {
                return Err(ReplicaFailure {
                    replica: job.replica,
                    cycle,
                    state_index: job.state_index,
                    attempts: attempt + 1,
                    fatal: true,
                    message,
                });
            }
        }
        debug!(replica = job.replica, cycle, attempt, error = %last_error, "Engine run failed; retrying.");
    }
    Err(ReplicaFailure {
        replica: job.replica,
        cycle,
        state_index: job.state_index,
        attempts: config.max_retries + 1,
        fatal: false,
        message: last_error,
    })
}
