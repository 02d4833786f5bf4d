//! Destila CLI
//!
//! # Usage
//!
//! ```bash
//! # Check a loss configuration
//! destila validate distill.yaml
//!
//! # Write it back with defaults filled in
//! destila validate distill.yaml --output resolved.yaml
//!
//! # Fit the configured losses on synthetic feature maps
//! destila probe distill.yaml --steps 50 --seed 7
//! ```

use clap::Parser;
use destila::config::{
    apply_overrides, load_config, save_config, Cli, Command, ProbeArgs, ValidateArgs,
};
use destila::optim::{Optimizer, SGD};
use destila::{backward, DistillLoss, LossRegistry, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        log::LevelFilter::Error
    } else if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_target(false)
        .init();

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Probe(args) => run_probe(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| e.to_string())?;
    let registry = LossRegistry::with_builtins();

    for loss in &spec.losses {
        if !registry.contains(&loss.type_name) {
            return Err(format!(
                "Unknown loss type '{}' (registered: {})",
                loss.type_name,
                registry.keys().join(", ")
            ));
        }
        log::info!(
            "  {} [{}]: {} -> {} channels, tau={}, weight={}",
            display_name(&loss.name),
            loss.type_name,
            loss.student_channels,
            loss.teacher_channels,
            loss.tau,
            loss.weight
        );
    }

    log::info!("Configuration is valid");

    if let Some(output) = &args.output {
        save_config(&spec, output).map_err(|e| e.to_string())?;
        log::info!("Resolved configuration written to {}", output.display());
    }
    Ok(())
}

fn run_probe(args: ProbeArgs) -> Result<(), String> {
    let mut spec = load_config(&args.config).map_err(|e| e.to_string())?;
    apply_overrides(&mut spec, &args);

    let mut losses = LossRegistry::with_builtins()
        .build_all(&spec)
        .map_err(|e| e.to_string())?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    for (entry, loss) in spec.losses.iter().zip(losses.iter_mut()) {
        let teacher = random_features(
            &mut rng,
            [args.batch, entry.teacher_channels, args.height, args.width],
        )?;
        let student = random_features(
            &mut rng,
            [args.batch, entry.student_channels, 2 * args.height, 2 * args.width],
        )?;
        probe_loss(loss.as_mut(), &student, &teacher, &args)?;
    }

    Ok(())
}

/// Run SGD on the loss's own parameters and log the loss per step
fn probe_loss(
    loss: &mut dyn DistillLoss,
    student: &Tensor,
    teacher: &Tensor,
    args: &ProbeArgs,
) -> Result<(), String> {
    let name = display_name(loss.name()).to_string();
    let mut optimizer = SGD::new(args.lr, 0.9);

    if loss.parameters().is_empty() {
        let value = loss.forward(student, teacher).map_err(|e| e.to_string())?;
        log::info!("{name}: no learnable parameters, loss={:.6}", value.item());
        return Ok(());
    }

    let mut first = 0.0;
    let mut last = 0.0;
    for step in 0..args.steps {
        optimizer.zero_grad(loss.parameters_mut());
        let mut value = loss.forward(student, teacher).map_err(|e| e.to_string())?;
        last = value.item();
        if step == 0 {
            first = last;
        }
        backward(&mut value, None);
        optimizer.step(loss.parameters_mut());
        log::debug!("{name}: step {step} loss={last:.6}");
    }

    log::info!(
        "{name}: loss {:.6} -> {:.6} over {} step(s)",
        first,
        last,
        args.steps
    );
    Ok(())
}

fn random_features(rng: &mut StdRng, shape: [usize; 4]) -> Result<Tensor, String> {
    let len: usize = shape.iter().product();
    let data: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0..1.0)).collect();
    Tensor::from_shape_vec(&shape, data, false).map_err(|e| e.to_string())
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "<unnamed>"
    } else {
        name
    }
}
