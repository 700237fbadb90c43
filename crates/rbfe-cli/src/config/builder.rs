use super::defaults::DefaultsConfig;
use super::file::{
    FileAnalysisConfig, FileCheckpointConfig, FileConfig, FileEngineConfig, FileMappingConfig,
    FileMappingMethod, FileSoftcoreConfig,
};
use super::models::{
    AnalyzeAppConfig, EngineSettings, ProductionAppConfig, SampleSource, StructprepAppConfig,
};
use crate::cli::{AnalyzeArgs, ProductionArgs, StructprepArgs};
use crate::error::{CliError, Result};
use nalgebra::Vector3;
use rbfe_atm::core::analysis::EstimatorConfig;
use rbfe_atm::core::atm::{AlchemicalSchedule, SoftcoreParams};
use rbfe_atm::core::mapping::McsOptions;
use rbfe_atm::engine::config as core_config;
use std::path::PathBuf;
use std::time::Duration;

pub fn build_structprep_config(args: &StructprepArgs) -> Result<StructprepAppConfig> {
    let defaults = DefaultsConfig::default();
    let file = FileConfig::load(args.config.as_deref(), &args.set_values)?
        .structprep
        .unwrap_or_default();

    let displacement = match &args.displacement {
        Some(raw) => Some(parse_vector(raw)?),
        None => file.displacement.map(Vector3::from),
    };
    let mapping = merge_mapping(&args.mapping_pairs, file.mapping)?;
    let schedule = merge_schedule(args.temperature, file.temperature, file.schedule, &defaults)?;
    let softcore = merge_softcore(file.softcore);
    let align_ligand_b = if args.no_align {
        false
    } else {
        file.align_ligand_b.unwrap_or(defaults.align_ligand_b)
    };

    let mut builder = core_config::StructprepConfigBuilder::new()
        .mapping(mapping)
        .softcore(softcore)
        .schedule(schedule)
        .align_ligand_b(align_ligand_b);
    if let Some(policy) = file.restraints {
        builder = builder.restraints(policy);
    }
    if let Some(displacement) = displacement {
        builder = builder.displacement(displacement);
    }
    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(StructprepAppConfig {
        input_path: args.input.clone(),
        output_path: args.output.clone(),
        core_config,
    })
}

pub fn build_production_config(args: &ProductionArgs) -> Result<ProductionAppConfig> {
    let defaults = DefaultsConfig::default();
    let mut file_config = FileConfig::load(args.config.as_deref(), &args.set_values)?;
    let file = file_config.production.take().unwrap_or_default();

    let wall_clock_limit = merge_time_limit(args.time_limit.or(file.time_limit_minutes))?;
    let checkpoint = merge_checkpoint(args.checkpoint.clone(), file.checkpoint, &defaults)?;
    if args.resume && checkpoint.is_none() {
        return Err(CliError::Argument(
            "--resume needs a checkpoint path (--checkpoint or production.checkpoint.path)"
                .to_string(),
        ));
    }
    let engine = merge_engine(args, file.engine, &defaults)?;
    let estimator = merge_estimator(file_config.analysis.take(), None, None, false)?;

    let mut builder = core_config::ProductionConfigBuilder::new()
        .max_retries(
            args.max_retries
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries),
        )
        .perturbation_magnitude(
            file.perturbation_magnitude
                .unwrap_or(defaults.perturbation_magnitude),
        )
        .seed(args.seed.or(file.seed).unwrap_or(defaults.seed))
        .wall_clock_limit(wall_clock_limit)
        .checkpoint(checkpoint)
        .estimate_interval(file.estimate_interval.unwrap_or(defaults.estimate_interval))
        .estimator(estimator);
    if let Some(cycles) = args.cycles.or(file.cycles) {
        builder = builder.cycles(cycles);
    }
    let core_config = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(ProductionAppConfig {
        system_path: args.system.clone(),
        store_path: args.store.clone(),
        output_path: args.output.clone(),
        resume: args.resume,
        engine,
        core_config,
    })
}

pub fn build_analyze_config(args: &AnalyzeArgs) -> Result<AnalyzeAppConfig> {
    let defaults = DefaultsConfig::default();
    let file = FileConfig::load(args.config.as_deref(), &args.set_values)?;

    let source = match (&args.source.store, &args.source.replica_logs) {
        (Some(store), None) => SampleSource::Store(store.clone()),
        (None, Some(run_dir)) => SampleSource::ReplicaLogs {
            run_dir: run_dir.clone(),
            job_name: args
                .job_name
                .clone()
                .unwrap_or(defaults.replica_log_job_name),
        },
        _ => {
            return Err(CliError::Argument(
                "Exactly one of --store or --replica-logs is required".to_string(),
            ));
        }
    };
    let estimator = merge_estimator(
        file.analysis,
        args.min_cycle,
        args.max_cycle,
        args.no_correlation_correction,
    )?;

    Ok(AnalyzeAppConfig {
        source,
        system_path: args.system.clone(),
        output_path: args.output.clone(),
        estimator,
    })
}

fn parse_vector(raw: &str) -> Result<Vector3<f64>> {
    let components = raw
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| CliError::Argument(format!("Invalid vector '{}'. Expected 'x,y,z'.", raw)))?;
    match components.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(CliError::Argument(format!(
            "Invalid vector '{}'. Expected exactly three components.",
            raw
        ))),
    }
}

fn parse_pair(raw: &str) -> Result<(usize, usize)> {
    let invalid = || CliError::Argument(format!("Invalid atom pair '{}'. Expected 'a:b'.", raw));
    let (a, b) = raw.split_once(':').ok_or_else(invalid)?;
    Ok((
        a.trim().parse().map_err(|_| invalid())?,
        b.trim().parse().map_err(|_| invalid())?,
    ))
}

fn merge_mapping(
    cli_pairs: &[String],
    file_val: Option<FileMappingConfig>,
) -> Result<core_config::MappingMethod> {
    if !cli_pairs.is_empty() {
        let pairs = cli_pairs
            .iter()
            .map(|p| parse_pair(p))
            .collect::<Result<Vec<_>>>()?;
        return Ok(core_config::MappingMethod::Explicit(pairs));
    }

    let file_val = file_val.unwrap_or_default();
    match file_val.method.unwrap_or(FileMappingMethod::Mcs) {
        FileMappingMethod::Explicit => {
            let pairs = file_val.pairs.ok_or_else(|| {
                CliError::Config("`mapping.method = \"explicit\"` requires `pairs`".to_string())
            })?;
            Ok(core_config::MappingMethod::Explicit(
                pairs.into_iter().map(|[a, b]| (a, b)).collect(),
            ))
        }
        FileMappingMethod::Mcs => {
            if file_val.pairs.is_some() {
                return Err(CliError::Config(
                    "`mapping.pairs` is only used with `method = \"explicit\"`".to_string(),
                ));
            }
            let defaults = McsOptions::default();
            Ok(core_config::MappingMethod::Mcs(McsOptions {
                ring_matches_ring_only: file_val
                    .ring_matches_ring_only
                    .unwrap_or(defaults.ring_matches_ring_only),
                heavy_atoms_only: file_val
                    .heavy_atoms_only
                    .unwrap_or(defaults.heavy_atoms_only),
                max_degree_difference: file_val
                    .max_degree_difference
                    .unwrap_or(defaults.max_degree_difference),
                min_mapped_atoms: file_val
                    .min_mapped_atoms
                    .unwrap_or(defaults.min_mapped_atoms),
                max_search_nodes: file_val
                    .max_search_nodes
                    .unwrap_or(defaults.max_search_nodes),
            }))
        }
    }
}

fn merge_schedule(
    cli_temperature: Option<f64>,
    file_temperature: Option<f64>,
    file_schedule: Option<AlchemicalSchedule>,
    defaults: &DefaultsConfig,
) -> Result<AlchemicalSchedule> {
    if let Some(schedule) = file_schedule {
        if cli_temperature.is_some() || file_temperature.is_some() {
            return Err(CliError::Config(
                "`structprep.schedule` and a schedule temperature cannot both be given".to_string(),
            ));
        }
        return Ok(schedule);
    }
    let temperature = cli_temperature
        .or(file_temperature)
        .unwrap_or(defaults.temperature);
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(CliError::Config(format!(
            "Temperature must be positive, got {} K",
            temperature
        )));
    }
    Ok(AlchemicalSchedule::default_rbfe_at(temperature))
}

fn merge_softcore(file_val: Option<FileSoftcoreConfig>) -> SoftcoreParams {
    let file_val = file_val.unwrap_or_default();
    let defaults = SoftcoreParams::default();
    SoftcoreParams {
        umax: file_val.umax.unwrap_or(defaults.umax),
        acore: file_val.acore.unwrap_or(defaults.acore),
        ubcore: file_val.ubcore.unwrap_or(defaults.ubcore),
    }
}

fn merge_time_limit(minutes: Option<f64>) -> Result<Option<Duration>> {
    match minutes {
        None => Ok(None),
        Some(m) if m.is_finite() && m > 0.0 => Ok(Some(Duration::from_secs_f64(m * 60.0))),
        Some(m) => Err(CliError::Config(format!(
            "Time limit must be a positive number of minutes, got {}",
            m
        ))),
    }
}

fn merge_checkpoint(
    cli_path: Option<PathBuf>,
    file_val: Option<FileCheckpointConfig>,
    defaults: &DefaultsConfig,
) -> Result<Option<core_config::CheckpointConfig>> {
    let file_val = file_val.unwrap_or_default();
    let Some(path) = cli_path.or(file_val.path) else {
        if file_val.interval.is_some() {
            return Err(CliError::Config(
                "`production.checkpoint.interval` requires a checkpoint path".to_string(),
            ));
        }
        return Ok(None);
    };
    let interval = file_val.interval.unwrap_or(defaults.checkpoint_interval);
    if interval == 0 {
        return Err(CliError::Config(
            "`production.checkpoint.interval` must be at least 1".to_string(),
        ));
    }
    Ok(Some(core_config::CheckpointConfig { path, interval }))
}

fn merge_engine(
    args: &ProductionArgs,
    file_val: Option<FileEngineConfig>,
    defaults: &DefaultsConfig,
) -> Result<EngineSettings> {
    let file_val = file_val.unwrap_or_default();
    let program = args.engine.clone().or(file_val.command).ok_or_else(|| {
        CliError::Config(
            "An engine program is required, either via --engine or `production.engine.command`."
                .to_string(),
        )
    })?;
    let timeout_seconds = file_val
        .timeout_seconds
        .unwrap_or(defaults.engine_timeout_seconds);
    if timeout_seconds == 0 {
        return Err(CliError::Config(
            "`production.engine.timeout-seconds` must be at least 1".to_string(),
        ));
    }
    Ok(EngineSettings {
        program,
        args: file_val.args.unwrap_or_default(),
        work_dir: args
            .work_dir
            .clone()
            .or(file_val.work_dir)
            .unwrap_or_else(|| defaults.engine_work_dir.clone()),
        timeout: Duration::from_secs(timeout_seconds),
    })
}

fn merge_estimator(
    file_val: Option<FileAnalysisConfig>,
    cli_min_cycle: Option<u64>,
    cli_max_cycle: Option<u64>,
    cli_no_correlation_correction: bool,
) -> Result<EstimatorConfig> {
    let file_val = file_val.unwrap_or_default();
    let defaults = EstimatorConfig::default();
    let config = EstimatorConfig {
        min_cycle: cli_min_cycle.or(file_val.min_cycle),
        max_cycle: cli_max_cycle.or(file_val.max_cycle),
        correlation_correction: !cli_no_correlation_correction
            && file_val
                .correlation_correction
                .unwrap_or(defaults.correlation_correction),
        max_iterations: file_val.max_iterations.unwrap_or(defaults.max_iterations),
        tolerance: file_val.tolerance.unwrap_or(defaults.tolerance),
    };

    if let (Some(min), Some(max)) = (config.min_cycle, config.max_cycle) {
        if min > max {
            return Err(CliError::Config(format!(
                "Cycle window is empty: min-cycle {} > max-cycle {}",
                min, max
            )));
        }
    }
    if config.max_iterations == 0 || !(config.tolerance > 0.0) {
        return Err(CliError::Config(
            "`analysis.max-iterations` and `analysis.tolerance` must be positive".to_string(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("rbfe.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn structprep_args(extra: &[&str]) -> StructprepArgs {
        let mut argv = vec!["rbfe", "structprep", "-i", "complex.toml", "-o", "system.toml"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Structprep(args) => args,
            _ => panic!("Expected 'structprep' subcommand"),
        }
    }

    fn production_args(extra: &[&str]) -> ProductionArgs {
        let mut argv = vec!["rbfe", "production", "-y", "system.toml", "--store", "s.csv"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Production(args) => args,
            _ => panic!("Expected 'production' subcommand"),
        }
    }

    fn analyze_args(extra: &[&str]) -> AnalyzeArgs {
        let mut argv = vec!["rbfe", "analyze"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Analyze(args) => args,
            _ => panic!("Expected 'analyze' subcommand"),
        }
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn structprep_needs_a_displacement() {
        let err = build_structprep_config(&structprep_args(&[])).err().unwrap();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("displacement")));
    }

    #[test]
    fn structprep_defaults_fill_the_rest() {
        let app = build_structprep_config(&structprep_args(&["-d", "-20, 0, 5"])).unwrap();
        let config = app.core_config;
        assert_eq!(config.displacement, Vector3::new(-20.0, 0.0, 5.0));
        assert_eq!(
            config.mapping,
            core_config::MappingMethod::Mcs(McsOptions::default())
        );
        assert_eq!(config.schedule, AlchemicalSchedule::default_rbfe());
        assert_eq!(config.softcore, SoftcoreParams::default());
        assert!(config.align_ligand_b);
        assert_eq!(app.output_path, PathBuf::from("system.toml"));
    }

    #[test]
    fn structprep_reads_file_and_cli_overrides_it() {
        let dir = tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [structprep]
            displacement = [0.0, 25.0, 0.0]
            temperature = 310.0
            align-ligand-b = true

            [structprep.mapping]
            heavy-atoms-only = true
            max-degree-difference = 0

            [structprep.restraints]
            site-radius = 10.0

            [structprep.softcore]
            umax = 300.0
            "#,
        );
        let app = build_structprep_config(&structprep_args(&[
            "-c",
            path_str(&path),
            "--no-align",
            "-d",
            "30,0,0",
        ]))
        .unwrap();
        let config = app.core_config;

        assert_eq!(config.displacement, Vector3::new(30.0, 0.0, 0.0));
        assert!(!config.align_ligand_b);
        assert_eq!(config.schedule, AlchemicalSchedule::default_rbfe_at(310.0));
        assert_eq!(config.restraints.site_radius, 10.0);
        assert_eq!(config.softcore.umax, 300.0);
        assert_eq!(config.softcore.acore, SoftcoreParams::default().acore);
        let core_config::MappingMethod::Mcs(options) = config.mapping else {
            panic!("Expected MCS mapping");
        };
        assert!(options.heavy_atoms_only);
        assert_eq!(options.max_degree_difference, 0);
    }

    #[test]
    fn explicit_pairs_from_cli_or_file() {
        let app =
            build_structprep_config(&structprep_args(&["-d", "20,0,0", "--map", "0:1", "--map", "2:3"]))
                .unwrap();
        assert_eq!(
            app.core_config.mapping,
            core_config::MappingMethod::Explicit(vec![(0, 1), (2, 3)])
        );

        let dir = tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [structprep]
            displacement = [20.0, 0.0, 0.0]
            [structprep.mapping]
            method = "explicit"
            "#,
        );
        let err = build_structprep_config(&structprep_args(&["-c", path_str(&path)]))
            .err()
            .unwrap();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("pairs")));

        let err = build_structprep_config(&structprep_args(&["-d", "1,0,0", "--map", "0-1"]))
            .err()
            .unwrap();
        assert!(matches!(err, CliError::Argument(_)));
    }

    #[test]
    fn invalid_restraint_policy_is_a_config_error() {
        let err = build_structprep_config(&structprep_args(&[
            "-d",
            "20,0,0",
            "-S",
            "structprep.restraints.site-radius=-1.0",
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("restraints")));
    }

    #[test]
    fn production_requires_cycles_and_engine() {
        let err = build_production_config(&production_args(&["--engine", "md"]))
            .err()
            .unwrap();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("cycles")));

        let err = build_production_config(&production_args(&["-n", "10"]))
            .err()
            .unwrap();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("engine")));
    }

    #[test]
    fn production_merges_file_cli_and_defaults() {
        let dir = tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [production]
            cycles = 100
            seed = 11
            perturbation-magnitude = 0.02
            time-limit-minutes = 90.0

            [production.engine]
            command = "openmm-atm"
            args = ["--platform", "CUDA"]
            timeout-seconds = 600

            [production.checkpoint]
            path = "run.ckpt"
            interval = 5

            [analysis]
            min-cycle = 20
            "#,
        );
        let app = build_production_config(&production_args(&[
            "-c",
            path_str(&path),
            "-n",
            "250",
            "--max-retries",
            "1",
        ]))
        .unwrap();
        let config = app.core_config;

        assert_eq!(config.cycles, 250);
        assert_eq!(config.seed, 11);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.perturbation_magnitude, 0.02);
        assert_eq!(config.wall_clock_limit, Some(Duration::from_secs(5400)));
        assert_eq!(
            config.checkpoint,
            Some(core_config::CheckpointConfig {
                path: PathBuf::from("run.ckpt"),
                interval: 5,
            })
        );
        assert_eq!(config.estimator.min_cycle, Some(20));
        assert_eq!(
            config.estimate_interval,
            DefaultsConfig::default().estimate_interval
        );
        assert_eq!(app.engine.program, "openmm-atm");
        assert_eq!(app.engine.args, vec!["--platform", "CUDA"]);
        assert_eq!(app.engine.timeout, Duration::from_secs(600));
        assert_eq!(app.engine.work_dir, DefaultsConfig::default().engine_work_dir);
    }

    #[test]
    fn resume_needs_a_checkpoint_path() {
        let err = build_production_config(&production_args(&[
            "-n", "10", "--engine", "md", "--resume",
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, CliError::Argument(_)));

        let app = build_production_config(&production_args(&[
            "-n",
            "10",
            "--engine",
            "md",
            "--resume",
            "--checkpoint",
            "run.ckpt",
        ]))
        .unwrap();
        assert!(app.resume);
        assert_eq!(
            app.core_config.checkpoint.unwrap().interval,
            DefaultsConfig::default().checkpoint_interval
        );
    }

    #[test]
    fn non_positive_time_limit_is_rejected() {
        let err = build_production_config(&production_args(&[
            "-n",
            "10",
            "--engine",
            "md",
            "--time-limit",
            "0",
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn analyze_merges_window_and_correction() {
        let dir = tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [analysis]
            min-cycle = 10
            max-cycle = 400
            tolerance = 1e-8
            "#,
        );
        let app = build_analyze_config(&analyze_args(&[
            "--store",
            "s.csv",
            "-c",
            path_str(&path),
            "--min-cycle",
            "50",
            "--no-correlation-correction",
        ]))
        .unwrap();

        assert_eq!(app.source, SampleSource::Store(PathBuf::from("s.csv")));
        assert_eq!(app.estimator.min_cycle, Some(50));
        assert_eq!(app.estimator.max_cycle, Some(400));
        assert_eq!(app.estimator.tolerance, 1e-8);
        assert!(!app.estimator.correlation_correction);
    }

    #[test]
    fn analyze_replica_logs_default_job_name() {
        let app = build_analyze_config(&analyze_args(&["--replica-logs", "run"])).unwrap();
        assert_eq!(
            app.source,
            SampleSource::ReplicaLogs {
                run_dir: PathBuf::from("run"),
                job_name: DefaultsConfig::default().replica_log_job_name,
            }
        );
        assert!(app.estimator.correlation_correction);
    }

    #[test]
    fn empty_cycle_window_is_rejected() {
        let err = build_analyze_config(&analyze_args(&[
            "--store",
            "s.csv",
            "--min-cycle",
            "100",
            "--max-cycle",
            "10",
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, CliError::Config(_)));
    }
}
