use std::path::{Path, PathBuf};
use std::sync::Arc;

use verity::aggregation::VerdictAggregator;
use verity::backend::{select_embedding, select_inference};
use verity::cli::{Cli, Commands, ConfigAction};
use verity::config::{Config, ConfigValidator};
use verity::embedding::EmbeddingGateway;
use verity::error::{Result, VerityError};
use verity::index::{IndexGeneration, IndexHandle, IndexTuner};
use verity::inference::InferenceScorer;
use verity::pipeline::PipelineOrchestrator;
use verity::retrieval::HybridRetriever;
use verity::store::{EvidenceStore, InMemoryEvidenceStore};
use verity::types::{EvidenceId, VerificationResult};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Verify {
            evidence,
            claims,
            top_k,
            json,
        } => {
            let config = load_config(cli.config.as_deref(), cli.profile.as_deref())?;
            cmd_verify(config, &evidence, claims, top_k, json)?;
        }
        Commands::Tune {
            evidence,
            queries,
            recall_floor,
            json,
        } => {
            let config = load_config(cli.config.as_deref(), cli.profile.as_deref())?;
            cmd_tune(config, &evidence, queries, recall_floor, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "verity=debug" } else { "verity=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| VerityError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

/// Load the corpus and embed whatever arrived without vectors
async fn load_corpus(
    path: &Path,
    gateway: &EmbeddingGateway,
) -> Result<InMemoryEvidenceStore> {
    let mut store = InMemoryEvidenceStore::from_jsonl(path)?;
    let embedded = gateway.embed_missing(&mut store).await?;
    if embedded > 0 {
        tracing::info!("Embedded {} evidence items with {}", embedded, gateway.model_name());
    }
    Ok(store)
}

fn cmd_verify(
    mut config: Config,
    evidence: &Path,
    claims: Vec<String>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if let Some(top_k) = top_k {
        config.retrieval.top_k = top_k;
    }
    ConfigValidator::validate(&config)?;

    let rt = runtime()?;
    let results = rt.block_on(async {
        let embedding = select_embedding(&config.embedding)?;
        let gateway = EmbeddingGateway::new(embedding, config.embedding.batch_size);
        let store = load_corpus(evidence, &gateway).await?;

        let settings = config.index_settings(gateway.dimension());
        let generation = IndexGeneration::build(&store, &settings)?;
        let handle = Arc::new(IndexHandle::new(generation));

        let retriever = HybridRetriever::new(
            gateway,
            handle,
            config.fusion_config()?,
            config.retrieval.candidate_multiplier,
        );
        let scorer = InferenceScorer::new(
            select_inference(&config.inference)?,
            config.inference.batch_size,
            config.inference.max_evidence_chars,
        );
        let aggregator = VerdictAggregator::new(config.aggregation.clone());

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            retriever,
            scorer,
            aggregator,
            config.pipeline_config()?,
        ));

        orchestrator.verify_batch(claims.clone()).await
    })?;

    if json {
        let out = serde_json::to_string_pretty(&results).map_err(|e| VerityError::Json {
            source: e,
            context: "Failed to serialize verification results".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    for (claim, result) in claims.iter().zip(&results) {
        print_result(claim, result);
    }

    Ok(())
}

fn print_result(claim: &str, result: &VerificationResult) {
    println!("Claim: {}", claim);
    println!(
        "  Verdict: {} (confidence {:.3}, {}ms)",
        result.verdict, result.confidence, result.elapsed_ms
    );

    if let Some(degradation) = &result.degradation {
        println!(
            "  ⚠ Degraded in {}: {}",
            degradation.stage, degradation.reason
        );
    }

    for score in &result.per_evidence {
        println!(
            "    {:<24} entail {:.3}  neutral {:.3}  contradict {:.3}",
            score.evidence_id.as_str(),
            score.entailment,
            score.neutral,
            score.contradiction
        );
    }
    println!();
}

fn cmd_tune(
    mut config: Config,
    evidence: &Path,
    queries: Option<usize>,
    recall_floor: Option<f64>,
    json: bool,
) -> Result<()> {
    if let Some(queries) = queries {
        config.index.tuning_queries = queries;
    }
    if let Some(floor) = recall_floor {
        config.index.recall_floor = floor;
    }
    ConfigValidator::validate(&config)?;

    let rt = runtime()?;
    let (dimension, store) = rt.block_on(async {
        let embedding = select_embedding(&config.embedding)?;
        let gateway = EmbeddingGateway::new(embedding, config.embedding.batch_size);
        let store = load_corpus(evidence, &gateway).await?;
        Ok::<_, VerityError>((gateway.dimension(), store))
    })?;

    let (vectors, ids): (Vec<Vec<f32>>, Vec<EvidenceId>) = store
        .all()
        .filter(|item| item.embedding.len() == dimension)
        .map(|item| (item.embedding, item.id))
        .unzip();

    let tuner = IndexTuner::new(config.tuning_config());
    let report = tuner.tune(dimension, &vectors, &ids)?;

    if json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| VerityError::Json {
            source: e,
            context: "Failed to serialize tuning report".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    println!(
        "Tuned over {} vectors with {} queries",
        report.corpus_size, report.query_count
    );
    println!(
        "  {:>10} {:>8} {:>8} {:>12}",
        "partitions", "breadth", "recall", "latency(us)"
    );
    for point in &report.points {
        let marker = if point.params == report.selected.params {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>10} {:>8} {:>8.3} {:>12.1}",
            marker,
            point.params.partition_count,
            point.params.search_breadth,
            point.recall,
            point.mean_latency_us
        );
    }

    if report.floor_met {
        println!(
            "✓ Selected {} partitions, breadth {} (recall {:.3})",
            report.selected.params.partition_count,
            report.selected.params.search_breadth,
            report.selected.recall
        );
    } else {
        println!(
            "⚠ No setting reached recall {:.3}; best was {} partitions, breadth {} (recall {:.3})",
            config.index.recall_floor,
            report.selected.params.partition_count,
            report.selected.params.search_breadth,
            report.selected.recall
        );
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path.as_deref(), profile.as_deref())?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| VerityError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&Path>, profile: Option<&str>) -> Result<Config> {
    if let Some(path) = config_path {
        if !path.exists() {
            return Err(VerityError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    Config::load_or_default(config_path, profile)
}
