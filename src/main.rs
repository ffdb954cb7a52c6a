//! voxclass - speaker-embedding classification pipeline entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxclass::classifier::{self, Classifier};
use voxclass::config::AppConfig;
use voxclass::dataset::{EmbeddingDataset, LabelEncoder};
use voxclass::embed::{self, Device, OnnxSpeakerModel};
use voxclass::manifest::Manifest;
use voxclass::store::{EmbeddingStore, FlatFileStore, Split, UsearchStore};
use voxclass::viz;

/// Speaker-embedding extraction and attribute classification pipeline
#[derive(Parser, Debug)]
#[command(name = "voxclass")]
#[command(about = "Extract speaker embeddings, train and evaluate a classifier on them")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Which storage backend holds the embeddings
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Embedded usearch vector store
    Store,
    /// Flat bincode file
    Flat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract embeddings from the audio files listed in the manifests and
    /// persist them per split
    Extract {
        /// CSV manifest for the train split (audio_path,class)
        #[arg(long)]
        train_manifest: PathBuf,

        /// CSV manifest for the test split (audio_path,class)
        #[arg(long)]
        test_manifest: PathBuf,

        /// Storage backend to write to
        #[arg(long, value_enum, default_value_t = Backend::Store)]
        output: Backend,
    },

    /// Train the classifier on the stored train split and write a checkpoint
    Train {
        /// Storage backend to read from
        #[arg(long, value_enum, default_value_t = Backend::Store)]
        source: Backend,

        /// Path for the trained model checkpoint
        #[arg(long, default_value = "model.safetensors")]
        checkpoint: PathBuf,
    },

    /// Evaluate the trained classifier on the stored test split
    Evaluate {
        /// Storage backend to read from
        #[arg(long, value_enum, default_value_t = Backend::Store)]
        source: Backend,

        /// Path of the trained model checkpoint
        #[arg(long, default_value = "model.safetensors")]
        checkpoint: PathBuf,

        /// Path for the metrics report
        #[arg(long, default_value = "metrics.txt")]
        report: PathBuf,

        /// Optional path for a t-SNE scatter plot of the hidden representation
        #[arg(long)]
        plot: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config from environment: {e}, using defaults");
        AppConfig::default()
    });

    let args = Args::parse();

    match args.command {
        Command::Extract {
            train_manifest,
            test_manifest,
            output,
        } => run_extract(&config, &train_manifest, &test_manifest, output),
        Command::Train { source, checkpoint } => run_train(&config, source, &checkpoint),
        Command::Evaluate {
            source,
            checkpoint,
            report,
            plot,
        } => run_evaluate(&config, source, &checkpoint, &report, plot.as_deref()),
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxclass=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the configured storage backend
fn open_store(config: &AppConfig, backend: Backend) -> anyhow::Result<Box<dyn EmbeddingStore>> {
    let store: Box<dyn EmbeddingStore> = match backend {
        Backend::Store => Box::new(
            UsearchStore::open(
                &config.storage.data_dir,
                &config.storage.collection,
                config.model.embedding_dim,
            )
            .context("Failed to open vector store")?,
        ),
        Backend::Flat => Box::new(
            FlatFileStore::open(
                PathBuf::from(&config.storage.data_dir)
                    .join(format!("{}.bin", config.storage.collection)),
            )
            .context("Failed to open flat-file store")?,
        ),
    };
    Ok(store)
}

fn run_extract(
    config: &AppConfig,
    train_manifest: &std::path::Path,
    test_manifest: &std::path::Path,
    output: Backend,
) -> anyhow::Result<()> {
    let device = Device::detect(config.model.enable_cuda);
    info!(%device, model = %config.model.path, "Starting extraction");

    // Load the model once and reuse it for every file in the run
    let model = OnnxSpeakerModel::load(
        std::path::Path::new(&config.model.path),
        config.model.embedding_dim,
        device,
    )
    .context("Failed to load embedding model")?;

    let mut store = open_store(config, output)?;

    for (split, manifest_path) in [(Split::Train, train_manifest), (Split::Test, test_manifest)] {
        let manifest =
            Manifest::from_csv(manifest_path).context("Failed to load dataset manifest")?;

        let embeddings = embed::extract_all(&model, &manifest)
            .with_context(|| format!("Extraction failed for split {split}"))?;

        store
            .store(split, &embeddings)
            .with_context(|| format!("Failed to persist split {split}"))?;

        info!(%split, count = embeddings.len(), "Split extracted and stored");
    }

    Ok(())
}

/// Fit the label encoder over the union of all splits so integer labels are
/// comparable between train and test.
fn fit_encoder(store: &dyn EmbeddingStore) -> Result<LabelEncoder, voxclass::PipelineError> {
    let mut labels = Vec::new();
    for split in Split::ALL {
        let records = store.retrieve(split)?;
        labels.extend(records.into_iter().map(|r| r.metadata.label));
    }
    Ok(LabelEncoder::fit(labels))
}

fn run_train(
    config: &AppConfig,
    source: Backend,
    checkpoint: &std::path::Path,
) -> anyhow::Result<()> {
    let store = open_store(config, source)?;
    let encoder = fit_encoder(store.as_ref())?;

    let records = store
        .retrieve(Split::Train)
        .context("Failed to retrieve train split")?;
    let dataset =
        EmbeddingDataset::from_records(&records, &encoder).context("Failed to build dataset")?;

    let device =
        classifier::select_device(config.model.enable_cuda).context("Device selection failed")?;
    info!(
        samples = dataset.len(),
        dim = dataset.dim(),
        classes = encoder.num_classes(),
        "Starting training"
    );

    let model = Classifier::new(
        dataset.dim(),
        config.training.hidden_dim,
        encoder.num_classes(),
        config.training.dropout,
        &device,
    )
    .context("Failed to build classifier")?;

    let mut rng = StdRng::seed_from_u64(config.training.seed);
    classifier::train(
        &model,
        &dataset,
        config.training.batch_size,
        config.training.epochs,
        &device,
        &mut rng,
    )
    .context("Training failed")?;

    model.save(checkpoint).context("Failed to save checkpoint")?;
    info!(checkpoint = %checkpoint.display(), "Checkpoint written");

    Ok(())
}

fn run_evaluate(
    config: &AppConfig,
    source: Backend,
    checkpoint: &std::path::Path,
    report: &std::path::Path,
    plot: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let store = open_store(config, source)?;
    let encoder = fit_encoder(store.as_ref())?;

    let records = store
        .retrieve(Split::Test)
        .context("Failed to retrieve test split")?;
    let dataset =
        EmbeddingDataset::from_records(&records, &encoder).context("Failed to build dataset")?;

    let device =
        classifier::select_device(config.model.enable_cuda).context("Device selection failed")?;

    let mut model = Classifier::new(
        dataset.dim(),
        config.training.hidden_dim,
        encoder.num_classes(),
        config.training.dropout,
        &device,
    )
    .context("Failed to build classifier")?;
    model.load(checkpoint).context("Failed to load checkpoint")?;

    let evaluation = classifier::evaluate(&model, &dataset, config.training.batch_size, &device)
        .context("Evaluation failed")?;

    classifier::write_report(report, &evaluation.metrics)
        .context("Failed to write metrics report")?;

    if let Some(plot_path) = plot {
        // Decode integer truths back to their raw labels for the legend
        let labels: Vec<String> = evaluation
            .truths
            .iter()
            .map(|&t| encoder.decode(t).unwrap_or("unknown").to_string())
            .collect();

        viz::scatter_plot(plot_path, &evaluation.hidden, &labels)
            .context("Failed to render scatter plot")?;
    }

    Ok(())
}
