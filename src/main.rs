//! HSSAN Flower Classifier CLI
//!
//! Inspect the network architecture, export an untrained model artifact and
//! classify single images from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use hssan::backend::{backend_name, default_device, DefaultBackend};
use hssan::utils::logging::{init_logging, LogConfig};
use hssan::utils::{format_number, format_shape};
use hssan::{
    save_artifact, ClassRegistry, HssanConfig, HssanVariant, InferenceEngine, LifecycleConfig,
    ModelState, ModelStatus, DEFAULT_MODEL_PATH, DEFAULT_TOP_K, NUM_CLASSES,
};

/// HSSAN Flower Classification
///
/// Multi-branch attention CNN for flower species classification, built with
/// the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "hssan")]
#[command(version)]
#[command(about = "Flower classification with the HSSAN network", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the layer-by-layer architecture and parameter count
    Summary {
        /// Network variant (rgb or spectral)
        #[arg(long, default_value = "rgb")]
        variant: HssanVariant,

        /// Number of output classes
        #[arg(long, default_value_t = NUM_CLASSES)]
        num_classes: usize,
    },

    /// Build an untrained RGB network and save it as a model artifact
    Export {
        /// Output artifact path
        #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
        output: PathBuf,

        /// Number of output classes
        #[arg(long, default_value_t = NUM_CLASSES)]
        num_classes: usize,
    },

    /// Classify a single image
    Predict {
        /// Path to the image file
        #[arg(short, long)]
        image: PathBuf,

        /// Model artifact (an untrained network is used if it cannot be loaded)
        #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Number of predictions to show
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// List the flower classes
    Classes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Summary {
            variant,
            num_classes,
        } => cmd_summary(variant, num_classes)?,

        Commands::Export {
            output,
            num_classes,
        } => cmd_export(&output, num_classes)?,

        Commands::Predict {
            image,
            model,
            top_k,
        } => cmd_predict(&image, &model, top_k)?,

        Commands::Classes => cmd_classes(),
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +------------------------------------------------------+
 |   HSSAN Flower Classifier                            |
 |   Multi-branch attention CNN with Burn + Rust        |
 +------------------------------------------------------+
  "#
        .green()
    );
}

fn cmd_summary(variant: HssanVariant, num_classes: usize) -> Result<()> {
    let config = match variant {
        HssanVariant::Rgb => HssanConfig::rgb(num_classes),
        HssanVariant::Spectral => HssanConfig::spectral(num_classes),
    };

    info!("Building {} network with {} classes", variant, num_classes);
    let network = config.init::<DefaultBackend>(&default_device())?;
    let summary = network.summary()?;

    println!("{} {}", "Model:".cyan().bold(), summary.name);
    println!("  Input:   {}", format_shape(&summary.input_shape));
    println!("  Backend: {}", backend_name());
    println!();

    println!("{}", "Layers:".cyan().bold());
    for layer in &summary.layers {
        println!("  {:20} {}", layer.name, format_shape(&layer.dims));
    }
    println!();
    println!(
        "{} {}",
        "Total params:".green().bold(),
        format_number(summary.total_params)
    );

    Ok(())
}

fn cmd_export(output: &Path, num_classes: usize) -> Result<()> {
    println!("{}", "Export Configuration:".cyan().bold());
    println!("  Output:  {}", output.display());
    println!("  Classes: {}", num_classes);
    println!();

    let network = HssanConfig::rgb(num_classes).init::<DefaultBackend>(&default_device())?;
    save_artifact(&network, output)
        .with_context(|| format!("Failed to export model to {}", output.display()))?;

    println!(
        "{} Saved untrained network ({} parameters)",
        "Done:".green().bold(),
        format_number(network.num_params())
    );

    Ok(())
}

fn cmd_predict(image: &Path, model: &Path, top_k: usize) -> Result<()> {
    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Image:   {}", image.display());
    println!("  Model:   {}", model.display());
    println!("  Backend: {}", backend_name());
    println!();

    let bytes = std::fs::read(image)
        .with_context(|| format!("Failed to read image {}", image.display()))?;

    let state = ModelState::<DefaultBackend>::new(LifecycleConfig::new(model), default_device());
    if state.initialize()? == ModelStatus::FallbackReady {
        println!(
            "{} Model artifact unavailable, predictions come from an untrained network",
            "Warning:".yellow()
        );
        println!();
    }

    let engine = InferenceEngine::new().with_top_k(top_k);
    let predictions = engine.classify(&state, &ClassRegistry::flowers(), &bytes)?;

    println!("{}", format!("Top-{} predictions:", top_k).cyan().bold());
    for (i, prediction) in predictions.iter().enumerate() {
        println!(
            "  {}. {:30} (class {:>3}) {:>6.2}%",
            i + 1,
            prediction.class_name,
            prediction.class_index,
            prediction.confidence * 100.0
        );
    }

    Ok(())
}

fn cmd_classes() {
    let registry = ClassRegistry::flowers();

    println!(
        "{} {}",
        "Flower classes:".cyan().bold(),
        registry.total_classes()
    );
    for (index, name) in registry.names().iter().enumerate() {
        println!("  {:>3}  {}", index, name);
    }
}
