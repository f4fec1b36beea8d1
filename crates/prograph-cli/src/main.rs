//! prograph CLI - pretrain GNN backbones and tune graph prompts.
//!
//! # Usage
//!
//! ```bash
//! # Write a small synthetic graph classification task
//! prograph synth toy.json --num-graphs 40
//!
//! # SimGRACE pretraining; writes toy.SimGRACE.GIN.16hidden_dim.safetensors
//! prograph pretrain toy.json --gnn GIN --hid-dim 16 --out-dir pre_trained_gnn
//!
//! # Prompt tuning from the pretrained backbone
//! prograph tune toy.json --gnn GIN --hid-dim 16 --prompt gpf \
//!     --pretrained pre_trained_gnn/toy.SimGRACE.GIN.16hidden_dim.safetensors
//! ```

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use prograph_core::{GraphTaskData, SyntheticGraphs};
use prograph_nn::GnnType;
use prograph_prompt::PromptKind;
use prograph_train::{GraphTask, PretrainConfig, SimGrace, TaskConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "prograph")]
#[command(about = "Graph prompt learning CLI", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic graph classification task (JSON)
    Synth {
        /// Output file
        output: PathBuf,

        /// Number of graphs
        #[arg(long, default_value = "20")]
        num_graphs: usize,

        /// Number of classes
        #[arg(long, default_value = "2")]
        num_classes: usize,

        /// Node feature width
        #[arg(long, default_value = "4")]
        feature_dim: usize,

        /// Random seed
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Pretrain a backbone with SimGRACE
    Pretrain {
        /// Task file (JSON); every split is used
        input: PathBuf,

        /// Base config (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset name for the checkpoint (default: input file stem)
        #[arg(long)]
        name: Option<String>,

        /// GNN type (GAT, GCN, GraphSAGE, GIN, GCov, GraphTransformer)
        #[arg(long)]
        gnn: Option<GnnType>,

        /// Embedding width
        #[arg(long)]
        hid_dim: Option<usize>,

        /// Number of GNN layers
        #[arg(long)]
        num_layer: Option<usize>,

        /// Graphs per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(long)]
        lr: Option<f64>,

        /// Weight decay
        #[arg(long)]
        decay: Option<f64>,

        /// Number of epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Checkpoint directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Tune a prompt on a graph classification task
    Tune {
        /// Task file (JSON)
        input: PathBuf,

        /// Base config (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset name checked against the checkpoint (default: input file stem)
        #[arg(long)]
        name: Option<String>,

        /// GNN type
        #[arg(long)]
        gnn: Option<GnnType>,

        /// Prompt type (None, ProG, gpf, gpf-plus, Gprompt, gppt)
        #[arg(long)]
        prompt: Option<PromptKind>,

        /// Backbone output width
        #[arg(long)]
        hid_dim: Option<usize>,

        /// Number of GNN layers
        #[arg(long)]
        num_layer: Option<usize>,

        /// Epoch loop upper bound (runs 1..epochs)
        #[arg(long)]
        epochs: Option<usize>,

        /// Training graphs kept per class
        #[arg(long)]
        shot_num: Option<usize>,

        /// Tokens per ProG class graph
        #[arg(long)]
        token_num: Option<usize>,

        /// Pretrained backbone checkpoint
        #[arg(long)]
        pretrained: Option<PathBuf>,

        /// Write the run report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Synth {
            output,
            num_graphs,
            num_classes,
            feature_dim,
            seed,
        } => cmd_synth(&output, num_graphs, num_classes, feature_dim, seed),
        Commands::Pretrain {
            input,
            config,
            name,
            gnn,
            hid_dim,
            num_layer,
            batch_size,
            lr,
            decay,
            epochs,
            out_dir,
        } => {
            let mut cfg = match config {
                Some(path) => PretrainConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?,
                None => PretrainConfig::default(),
            };
            cfg.dataset_name = dataset_name(&input, name)?;
            if let Some(gnn) = gnn {
                cfg = cfg.with_gnn_type(gnn);
            }
            if let Some(hid_dim) = hid_dim {
                cfg = cfg.with_hid_dim(hid_dim);
            }
            if let Some(num_layer) = num_layer {
                cfg = cfg.with_num_layer(num_layer);
            }
            if let Some(batch_size) = batch_size {
                cfg = cfg.with_batch_size(batch_size);
            }
            if let Some(lr) = lr {
                cfg = cfg.with_learning_rate(lr);
            }
            if let Some(decay) = decay {
                cfg = cfg.with_weight_decay(decay);
            }
            if let Some(epochs) = epochs {
                cfg = cfg.with_epochs(epochs);
            }
            if let Some(dir) = out_dir {
                cfg = cfg.with_checkpoint_dir(dir);
            }
            cmd_pretrain(&input, cfg)
        }
        Commands::Tune {
            input,
            config,
            name,
            gnn,
            prompt,
            hid_dim,
            num_layer,
            epochs,
            shot_num,
            token_num,
            pretrained,
            report,
        } => {
            let mut cfg = match config {
                Some(path) => TaskConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?,
                None => TaskConfig::default(),
            };
            cfg.dataset_name = dataset_name(&input, name)?;
            if let Some(gnn) = gnn {
                cfg = cfg.with_gnn_type(gnn);
            }
            if let Some(prompt) = prompt {
                cfg = cfg.with_prompt_type(prompt);
            }
            if let Some(hid_dim) = hid_dim {
                cfg = cfg.with_hid_dim(hid_dim);
            }
            if let Some(num_layer) = num_layer {
                cfg = cfg.with_num_layer(num_layer);
            }
            if let Some(epochs) = epochs {
                cfg = cfg.with_epochs(epochs);
            }
            if shot_num.is_some() {
                cfg = cfg.with_shot_num(shot_num);
            }
            if let Some(tokens) = token_num {
                cfg.prompt = cfg.prompt.with_token_num_per_group(tokens);
            }
            if let Some(path) = pretrained {
                cfg = cfg.with_pre_train_model_path(path);
            }
            cmd_tune(&input, cfg, report.as_deref())
        }
    }
}

/// `--name`, or the input file stem.
fn dataset_name(input: &Path, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("Cannot derive a dataset name from {}", input.display())),
    }
}

fn load_task(path: &Path) -> Result<GraphTaskData> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", path.display()));
    let data = GraphTaskData::load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(data)
}

fn cmd_synth(
    output: &Path,
    num_graphs: usize,
    num_classes: usize,
    feature_dim: usize,
    seed: u64,
) -> Result<()> {
    let data = SyntheticGraphs::default()
        .with_num_graphs(num_graphs)
        .with_num_classes(num_classes)
        .with_feature_dim(feature_dim)
        .with_seed(seed)
        .task_data()?;
    data.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Wrote {} ({} train / {} val / {} test graphs)",
        output.display(),
        data.train.len(),
        data.val.len(),
        data.test.len()
    );
    Ok(())
}

fn cmd_pretrain(input: &Path, config: PretrainConfig) -> Result<()> {
    let data = load_task(input)?;
    let device = Device::cuda_if_available(0)?;

    let mut engine = SimGrace::new(config, data.input_dim, &device)?;
    let report = engine.pretrain(&data.all_graphs())?;

    println!("Best loss:  {:.8}", report.best_loss);
    println!("Saved at:   epochs {:?}", report.saved_epochs);
    println!("Checkpoint: {}", report.checkpoint_path.display());
    Ok(())
}

fn cmd_tune(input: &Path, config: TaskConfig, report_path: Option<&Path>) -> Result<()> {
    let data = load_task(input)?;
    let device = Device::cuda_if_available(0)?;

    let mut task = GraphTask::new(config, data, &device)?;
    let report = task.run()?;

    println!("Final Test: {:.4}", report.final_test_acc);
    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
