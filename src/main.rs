use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ferrite_steg::train::format_accuracy;
use ferrite_steg::network::latest_step;
use ferrite_steg::{Error, Result, Steganalyzer, TrainConfig};

/// Convolutional steganalyzer: tells clean images from ones carrying a payload.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the classifier on the configured train folder
    Train(TrainArgs),
    /// Score a saved checkpoint on one or more image folders
    Evaluate(EvaluateArgs),
    /// Print the stego probability of individual images
    Classify(ClassifyArgs),
}

#[derive(Parser, Debug)]
struct TrainArgs {
    /// JSON config file
    #[clap(short = 'c', long = "config")]
    config: PathBuf,

    /// Use the `<NAME>_train` / `<NAME>_test` folders
    #[clap(long = "stego-name", value_name = "NAME")]
    stego_name: Option<String>,

    /// Folder of generated samples scored at every accuracy check
    #[clap(long = "gen-dir", value_name = "DIR")]
    gen_dirs: Vec<PathBuf>,

    /// Global step to start from (and resume from with `need_to_load`)
    #[clap(long = "start-step", default_value_t = 1)]
    start_step: usize,

    /// Override the configured number of epochs
    #[clap(long = "epochs")]
    epochs: Option<usize>,

    /// Override the configured batch size
    #[clap(long = "batch-size")]
    batch_size: Option<usize>,

    /// Write the training report to this JSON file
    #[clap(long = "report")]
    report: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct EvaluateArgs {
    /// JSON config file
    #[clap(short = 'c', long = "config")]
    config: PathBuf,

    /// Checkpoint step to load; defaults to the newest one
    #[clap(long = "step")]
    step: Option<usize>,

    /// Folder to score; defaults to the configured test folder
    #[clap(long = "dir", value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Consider at most this many files per folder
    #[clap(long = "max-files")]
    max_files: Option<usize>,
}

#[derive(Parser, Debug)]
struct ClassifyArgs {
    /// JSON config file
    #[clap(short = 'c', long = "config")]
    config: PathBuf,

    /// Checkpoint step to load; defaults to the newest one
    #[clap(long = "step")]
    step: Option<usize>,

    /// Images to classify
    #[clap(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let outcome = match args.command {
        Commands::Train(args) => train(args),
        Commands::Evaluate(args) => evaluate(args),
        Commands::Classify(args) => classify(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = TrainConfig::load_json(&args.config)?;
    if args.stego_name.is_some() {
        config.stego_name = args.stego_name;
    }
    if let Some(epochs) = args.epochs {
        config.epoch = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    let mut model = Steganalyzer::new(config)?;
    let report = model.train(args.start_step, &args.gen_dirs)?;

    if let Some(best) = &report.best {
        log::info!("Best test accuracy {} at step {}", format_accuracy(best.test_accuracy), best.step);
    }
    if let Some(path) = args.report {
        report.save_json(&path)?;
        log::info!("Report written to {}", path.display());
    }
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let config = TrainConfig::load_json(&args.config)?;
    let mut model = Steganalyzer::new(config)?;
    model.load(resolve_step(&model, args.step)?)?;

    let dirs = if args.dirs.is_empty() {
        vec![model.test_dir.clone()]
    } else {
        args.dirs.iter().map(|d| model.config.resolve_dir(d)).collect()
    };

    for dir in dirs {
        let accuracy = model.accuracy(&dir, args.max_files, false)?;
        log::info!("Folder {}, accuracy: {}", dir.display(), format_accuracy(accuracy));
    }
    Ok(())
}

fn classify(args: ClassifyArgs) -> Result<()> {
    let config = TrainConfig::load_json(&args.config)?;
    let mut model = Steganalyzer::new(config)?;
    model.load(resolve_step(&model, args.step)?)?;

    let probabilities = model.classify(&args.images)?;
    for (path, p) in args.images.iter().zip(probabilities) {
        println!("{}\t{:.4}", path.display(), p);
    }
    Ok(())
}

/// `step` if given, otherwise the newest checkpoint in `checkpoint_dir`.
fn resolve_step(model: &Steganalyzer, step: Option<usize>) -> Result<usize> {
    if let Some(step) = step {
        return Ok(step);
    }
    let dir = &model.config.checkpoint_dir;
    latest_step(dir)?.ok_or_else(|| Error::Checkpoint {
        path: dir.clone(),
        reason: "no checkpoint found".into(),
    })
}
