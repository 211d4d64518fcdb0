//! openclaw-mem CLI
//!
//! AI-native surface: non-interactive, structured output via `--json`,
//! stable exit codes (0 ok, 1 I/O or credentials, 2 validation, 10 triage
//! attention needed).

mod output;

use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use openclaw_mem_core::{
    build_context_pack, build_index_file, build_index_pack, build_pack,
    capture_git, capture_markdown, defaults, graph::IndexPackOptions, harvest, ingest_reader,
    preflight, search_hybrid, search_lexical, search_vector, triage, writeback, EmbeddingTable,
    EmbeddingsClient, GitCaptureOptions, HarvestOptions, HybridOptions, MdCaptureOptions,
    ObservationInput, PackError, PackOptions, RerankOptions, RerankProvider, ScorerSetting, Store,
    TriageMode, TriageOptions, WritebackError, WritebackOptions, DEFAULT_BUDGET_TOKENS,
    DEFAULT_IMPORTANCE_MIN, DEFAULT_PACK_LIMIT, DEFAULT_RRF_K, DEFAULT_SINCE_MINUTES,
    DEFAULT_TASKS_SINCE_MINUTES,
};

use output::{emit, emit_rows, envelope, fail, fail_validation};

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_ATTENTION: u8 = 10;

/// openclaw-mem - local-first agent memory engine
#[derive(Parser)]
#[command(name = "openclaw-mem")]
#[command(version = openclaw_mem_core::VERSION)]
#[command(about = "Observation ledger, hybrid retrieval, and budgeted context packs")]
#[command(
    after_help = "Examples:\n  \
    openclaw-mem status --json\n  \
    openclaw-mem ingest --file observations.jsonl --json\n  \
    openclaw-mem search \"gateway timeout\" --limit 20 --json\n  \
    openclaw-mem hybrid \"db locked\" --query-en \"database locked\" --json\n  \
    openclaw-mem pack --query \"release steps\" --trace --json\n  \
    openclaw-mem timeline 23 41 --window 4 --json\n  \
    openclaw-mem harvest --source observations.jsonl --archive-dir archive --json"
)]
struct Cli {
    /// SQLite ledger path (default: OPENCLAW_MEM_DB or the state home)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Structured JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct EmbedArgs {
    /// Embedding model
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-style base URL
    #[arg(long)]
    base_url: Option<String>,

    /// API key (falls back to OPENAI_API_KEY, then the config file)
    #[arg(long)]
    api_key: Option<String>,
}

impl EmbedArgs {
    fn model(&self) -> String {
        self.model.clone().unwrap_or_else(defaults::embed_model)
    }

    fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(defaults::openai_base_url)
    }

    fn client(&self) -> Option<EmbeddingsClient> {
        let key = defaults::resolve_api_key(self.api_key.as_deref())?;
        EmbeddingsClient::new(&key, &self.base_url()).ok()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show ledger stats
    Status,

    /// Ingest observations (JSONL via --file or stdin)
    Ingest {
        /// JSONL file path (default: stdin)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Importance scorer: heuristic-v1, or off/none/disable/disabled/0
        #[arg(long)]
        importance_scorer: Option<String>,
    },

    /// Store one observation directly (dual-language aware)
    Store {
        /// Original-language text
        #[arg(long)]
        text: String,

        /// English translation/summary
        #[arg(long)]
        text_en: Option<String>,

        /// Language code of the original text
        #[arg(long)]
        lang: Option<String>,

        /// Category recorded in detail
        #[arg(long)]
        category: Option<String>,

        /// Importance score recorded in detail
        #[arg(long)]
        importance: Option<f64>,

        #[command(flatten)]
        embed: EmbedArgs,
    },

    /// FTS search over observations (with CJK fallback)
    Search {
        /// Search query (FTS5 syntax)
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Vector search over embeddings
    Vsearch {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[command(flatten)]
        embed: EmbedArgs,
    },

    /// Hybrid search: FTS + vector + RRF, optional rerank
    Hybrid {
        query: String,

        /// English query for the bilingual route
        #[arg(long)]
        query_en: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// RRF smoothing constant
        #[arg(long, default_value_t = DEFAULT_RRF_K)]
        k: u32,

        /// Rerank provider: jina or cohere
        #[arg(long)]
        rerank: Option<String>,

        /// Rerank model name
        #[arg(long)]
        rerank_model: Option<String>,

        /// Rerank result count
        #[arg(long)]
        rerank_topn: Option<usize>,

        /// Rerank provider API key
        #[arg(long)]
        rerank_api_key: Option<String>,

        #[command(flatten)]
        embed: EmbedArgs,
    },

    /// Build a budgeted, cited context pack
    Pack {
        #[arg(long)]
        query: String,

        #[arg(long)]
        query_en: Option<String>,

        #[arg(long, default_value_t = DEFAULT_PACK_LIMIT)]
        limit: usize,

        #[arg(long, default_value_t = DEFAULT_BUDGET_TOKENS)]
        budget_tokens: usize,

        /// Emit the pack.trace.v1 decision record
        #[arg(long)]
        trace: bool,

        #[command(flatten)]
        embed: EmbedArgs,
    },

    /// Windowed timeline around observation ids
    Timeline {
        ids: Vec<i64>,

        /// Rows on each side of every id
        #[arg(long, default_value_t = 4)]
        window: i64,
    },

    /// Get full observations by id
    Get { ids: Vec<i64> },

    /// Drain the observation log with crash recovery
    Harvest {
        /// Live log path
        #[arg(long)]
        source: Option<PathBuf>,

        /// Archive directory for processed files (omit to delete them)
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        #[arg(long)]
        importance_scorer: Option<String>,

        /// Skip the embedding top-up
        #[arg(long)]
        no_embed: bool,

        /// Skip the Markdown index refresh
        #[arg(long)]
        no_update_index: bool,

        /// Markdown index artifact path
        #[arg(long)]
        index_path: Option<PathBuf>,

        #[command(flatten)]
        embed: EmbedArgs,
    },

    /// Deterministic attention scan (exit 10 when something needs eyes)
    Triage {
        /// heartbeat, observations, cron-errors, or tasks
        #[arg(long, default_value = "heartbeat")]
        mode: String,

        #[arg(long, default_value_t = DEFAULT_SINCE_MINUTES)]
        since_minutes: i64,

        #[arg(long, default_value_t = DEFAULT_TASKS_SINCE_MINUTES)]
        tasks_since_minutes: i64,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Comma-separated keyword override for observations mode
        #[arg(long)]
        keywords: Option<String>,

        /// Cron job store JSON path
        #[arg(long)]
        cron_jobs_path: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_IMPORTANCE_MIN)]
        importance_min: f64,

        /// Watermark state file path
        #[arg(long)]
        state_path: Option<PathBuf>,
    },

    /// Rebuild the Markdown index artifact
    Index {
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = openclaw_mem_core::DEFAULT_INDEX_LIMIT)]
        limit: usize,
    },

    /// Graph-lite recall and source capture
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },

    /// Push governance metadata into a LanceDB table via the bridge
    WritebackLancedb {
        /// External store directory
        #[arg(long)]
        db_path: PathBuf,

        #[arg(long, default_value = "memories")]
        table: String,

        /// Ledger rows inspected
        #[arg(long, default_value_t = openclaw_mem_core::DEFAULT_INSPECT_LIMIT)]
        limit: usize,

        #[arg(long, default_value_t = openclaw_mem_core::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        #[arg(long)]
        dry_run: bool,

        /// Overwrite non-empty fields
        #[arg(long)]
        force: bool,

        /// Comma-separated overwrite fields (importance, importance_label,
        /// scope, category, trust_tier)
        #[arg(long)]
        force_fields: Option<String>,
    },
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Index-first recall: candidates plus suggested expansions
    Index {
        #[arg(long)]
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long, default_value_t = 600)]
        budget_tokens: usize,

        /// Timeline adjacency half-window
        #[arg(long, default_value_t = openclaw_mem_core::graph::DEFAULT_ADJACENCY_WINDOW)]
        window: i64,
    },

    /// Load record refs into a numbered context pack
    Pack {
        /// Record refs (obs:<id>, obs#<id>, or bare ids)
        refs: Vec<String>,

        #[arg(long, default_value_t = 600)]
        budget_tokens: usize,
    },

    /// Index then pack the first --take unique refs
    Preflight {
        #[arg(long)]
        query: String,

        #[arg(long, default_value_t = 6)]
        take: usize,

        #[arg(long, default_value_t = 600)]
        budget_tokens: usize,
    },

    /// Capture recent commits from configured repositories
    CaptureGit {
        /// Repository paths
        #[arg(long = "repo", required = true)]
        repos: Vec<PathBuf>,

        #[arg(long, default_value_t = openclaw_mem_core::graph::DEFAULT_LOOKBACK_HOURS)]
        lookback_hours: i64,

        #[arg(long, default_value_t = openclaw_mem_core::graph::DEFAULT_MAX_COMMITS)]
        max_commits: usize,

        #[arg(long)]
        state_path: Option<PathBuf>,
    },

    /// Capture new Markdown sections under configured paths
    CaptureMd {
        /// Root paths to walk
        #[arg(long = "path", required = true)]
        paths: Vec<PathBuf>,

        /// Included extensions
        #[arg(long = "include-ext")]
        include_exts: Vec<String>,

        /// Exclude globs
        #[arg(long = "exclude")]
        exclude_globs: Vec<String>,

        #[arg(long, default_value_t = openclaw_mem_core::graph::DEFAULT_MIN_HEADING_LEVEL)]
        min_heading_level: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn open_store(db: Option<&PathBuf>) -> anyhow::Result<Store> {
    Ok(Store::open(db.map(|p| p.as_path()))?)
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let json = cli.json;
    match cli.command {
        Commands::Status => {
            let store = open_store(cli.db.as_ref())?;
            let status = store.status()?;
            let mut value = serde_json::to_value(&status)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert(
                    "db".to_string(),
                    serde_json::json!(store
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| ":memory:".to_string())),
                );
            }
            emit(&value, json);
            Ok(EXIT_OK)
        }

        Commands::Ingest {
            file,
            importance_scorer,
        } => {
            let store = open_store(cli.db.as_ref())?;
            let scorer = ScorerSetting::resolve(importance_scorer.as_deref());
            let summary = match file {
                Some(path) => {
                    let reader = BufReader::new(std::fs::File::open(&path)?);
                    ingest_reader(&store, reader, scorer)?
                }
                None => {
                    let stdin = std::io::stdin();
                    ingest_reader(&store, stdin.lock(), scorer)?
                }
            };
            emit(&envelope("ingest", serde_json::to_value(&summary)?), json);
            Ok(EXIT_OK)
        }

        Commands::Store {
            text,
            text_en,
            lang,
            category,
            importance,
            embed,
        } => {
            if text.trim().is_empty() {
                return fail_validation("empty text", json);
            }
            let store = open_store(cli.db.as_ref())?;

            let mut detail = serde_json::Map::new();
            if let Some(category) = &category {
                detail.insert("category".to_string(), serde_json::json!(category));
            }
            if let Some(importance) = importance {
                detail.insert("importance".to_string(), serde_json::json!(importance));
            }

            let id = store.insert_observation(&ObservationInput {
                ts: None,
                kind: category.clone(),
                summary: Some(text.clone()),
                summary_en: text_en.clone(),
                lang,
                tool_name: Some("memory_store".to_string()),
                detail: Some(serde_json::Value::Object(detail)),
            })?;

            // Embeddings are enrichment: a missing key or a failed call
            // leaves the stored row intact.
            let mut embedded = false;
            if let Some(client) = embed.client() {
                let model = embed.model();
                embedded = embed_stored(&store, &client, &model, id, &text, text_en.as_deref());
            }

            emit(&serde_json::json!({"ok": true, "id": id, "embedded": embedded}), json);
            Ok(EXIT_OK)
        }

        Commands::Search { query, limit } => {
            if query.trim().is_empty() {
                return fail_validation("empty query", json);
            }
            let store = open_store(cli.db.as_ref())?;
            let hits = search_lexical(&store, &query, limit)?;
            let rows: Vec<serde_json::Value> = hits
                .iter()
                .map(|h| {
                    let mut v = serde_json::to_value(&h.observation).unwrap_or_default();
                    if let Some(obj) = v.as_object_mut() {
                        obj.insert("snippet".to_string(), serde_json::json!(h.snippet));
                        obj.insert("score".to_string(), serde_json::json!(h.score));
                    }
                    v
                })
                .collect();
            emit_rows(&rows, json);
            Ok(EXIT_OK)
        }

        Commands::Vsearch {
            query,
            limit,
            embed,
        } => {
            if query.trim().is_empty() {
                return fail_validation("empty query", json);
            }
            let Some(client) = embed.client() else {
                return fail("missing API key for vsearch", json, EXIT_ERROR);
            };
            let store = open_store(cli.db.as_ref())?;
            let model = embed.model();
            let vectors = client.embed(&[query.clone()], &model)?;
            let query_vec = vectors.into_iter().next().unwrap_or_default();
            let scored = search_vector(&store, EmbeddingTable::Original, &model, &query_vec, limit)?;

            let ids: Vec<i64> = scored.iter().map(|(id, _)| *id).collect();
            let rows_by_id: std::collections::HashMap<i64, _> = store
                .get_observations(&ids)?
                .into_iter()
                .map(|o| (o.id, o))
                .collect();
            let rows: Vec<serde_json::Value> = scored
                .iter()
                .filter_map(|(id, score)| {
                    rows_by_id.get(id).map(|o| {
                        let mut v = serde_json::to_value(o).unwrap_or_default();
                        if let Some(obj) = v.as_object_mut() {
                            obj.insert("score".to_string(), serde_json::json!(score));
                        }
                        v
                    })
                })
                .collect();
            emit_rows(&rows, json);
            Ok(EXIT_OK)
        }

        Commands::Hybrid {
            query,
            query_en,
            limit,
            k,
            rerank,
            rerank_model,
            rerank_topn,
            rerank_api_key,
            embed,
        } => {
            if query.trim().is_empty() {
                return fail_validation("empty query", json);
            }
            let Some(client) = embed.client() else {
                return fail("missing API key for hybrid", json, EXIT_ERROR);
            };
            let store = open_store(cli.db.as_ref())?;

            let mut opts = HybridOptions::new(&embed.model());
            opts.limit = limit;
            opts.k = k;
            opts.query_en = query_en;
            if let Some(provider_name) = rerank.as_deref() {
                let Some(provider) = RerankProvider::parse_name(provider_name) else {
                    return fail_validation(
                        &format!("unsupported rerank provider: {provider_name}"),
                        json,
                    );
                };
                let mut rerank_opts = RerankOptions::new(
                    provider,
                    rerank_api_key,
                    rerank_model.unwrap_or_else(defaults::rerank_model),
                );
                if let Some(topn) = rerank_topn {
                    rerank_opts.topn = topn.max(1);
                }
                opts.rerank = Some(rerank_opts);
            }

            let hits = search_hybrid(&store, Some(&client), &query, &opts)?;
            let rows: Vec<serde_json::Value> = hits
                .iter()
                .map(|h| serde_json::to_value(h).unwrap_or_default())
                .collect();
            emit_rows(&rows, json);
            Ok(EXIT_OK)
        }

        Commands::Pack {
            query,
            query_en,
            limit,
            budget_tokens,
            trace,
            embed,
        } => {
            let store = open_store(cli.db.as_ref())?;
            let mut opts = PackOptions::new(&embed.model());
            opts.limit = limit;
            opts.budget_tokens = budget_tokens;
            opts.query_en = query_en;
            opts.trace = trace;

            let client = embed.client();
            match build_pack(&store, client.as_ref(), &query, &opts) {
                Ok(result) => {
                    emit(&serde_json::to_value(&result)?, json);
                    Ok(EXIT_OK)
                }
                Err(PackError::EmptyQuery) => fail_validation("empty query", json),
                Err(err) => Err(err.into()),
            }
        }

        Commands::Timeline { ids, window } => {
            if ids.is_empty() {
                return fail_validation("no ids given", json);
            }
            let store = open_store(cli.db.as_ref())?;
            let rows = store.timeline(&ids, window)?;
            let values: Vec<serde_json::Value> = rows
                .iter()
                .map(|o| serde_json::to_value(o).unwrap_or_default())
                .collect();
            emit_rows(&values, json);
            Ok(EXIT_OK)
        }

        Commands::Get { ids } => {
            if ids.is_empty() {
                return fail_validation("no ids given", json);
            }
            let store = open_store(cli.db.as_ref())?;
            let rows = store.get_observations(&ids)?;
            let values: Vec<serde_json::Value> = rows
                .iter()
                .map(|o| serde_json::to_value(o).unwrap_or_default())
                .collect();
            emit_rows(&values, json);
            Ok(EXIT_OK)
        }

        Commands::Harvest {
            source,
            archive_dir,
            importance_scorer,
            no_embed,
            no_update_index,
            index_path,
            embed,
        } => {
            let store = open_store(cli.db.as_ref())?;
            let opts = HarvestOptions {
                source: source.unwrap_or_else(defaults::harvest_source),
                archive_dir,
                scorer: ScorerSetting::resolve(importance_scorer.as_deref()),
                embed: !no_embed,
                update_index: !no_update_index,
                index_path,
                embed_model: embed.model(),
                base_url: embed.base_url(),
                api_key: defaults::resolve_api_key(embed.api_key.as_deref()),
            };
            let receipt = harvest(&store, &opts)?;
            emit(&envelope("harvest", serde_json::to_value(&receipt)?), json);
            Ok(EXIT_OK)
        }

        Commands::Triage {
            mode,
            since_minutes,
            tasks_since_minutes,
            limit,
            keywords,
            cron_jobs_path,
            importance_min,
            state_path,
        } => {
            let Some(mode) = TriageMode::parse_name(&mode) else {
                return fail_validation(&format!("unknown triage mode: {mode}"), json);
            };
            let store = open_store(cli.db.as_ref())?;
            let opts = TriageOptions {
                mode,
                since_minutes,
                tasks_since_minutes,
                limit,
                keywords: keywords
                    .map(|k| k.split(',').map(|s| s.trim().to_string()).collect()),
                cron_jobs_path,
                importance_min,
                state_path: state_path
                    .unwrap_or_else(|| defaults::state_dir().join("triage-state.json")),
            };
            let report = triage(&store, &opts)?;
            let attention = report.needs_attention;
            emit(&envelope("triage", serde_json::to_value(&report)?), json);
            Ok(if attention { EXIT_ATTENTION } else { EXIT_OK })
        }

        Commands::Index { output, limit } => {
            let store = open_store(cli.db.as_ref())?;
            let path = output.unwrap_or_else(defaults::index_path);
            let lines = build_index_file(&store, &path, limit)?;
            emit(
                &serde_json::json!({"ok": true, "path": path.display().to_string(), "lines": lines}),
                json,
            );
            Ok(EXIT_OK)
        }

        Commands::Graph { command } => run_graph(command, cli.db.as_ref(), json),

        Commands::WritebackLancedb {
            db_path,
            table,
            limit,
            batch_size,
            dry_run,
            force,
            force_fields,
        } => {
            let store = open_store(cli.db.as_ref())?;
            let opts = WritebackOptions {
                db_path,
                table_name: table,
                inspect_limit: limit,
                batch_size,
                dry_run,
                force,
                force_fields: force_fields
                    .map(|f| f.split(',').map(|s| s.trim().to_string()).collect()),
            };
            match writeback(&store, &opts) {
                Ok(receipt) => {
                    let ok = receipt.ok;
                    emit(&envelope("writeback-lancedb", serde_json::to_value(&receipt)?), json);
                    Ok(if ok { EXIT_OK } else { EXIT_ERROR })
                }
                Err(WritebackError::InvalidForceField(field)) => {
                    fail_validation(&format!("invalid force-field: {field}"), json)
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

fn run_graph(command: GraphCommands, db: Option<&PathBuf>, json: bool) -> anyhow::Result<u8> {
    match command {
        GraphCommands::Index {
            query,
            limit,
            budget_tokens,
            window,
        } => {
            if query.trim().is_empty() {
                return fail_validation("empty query", json);
            }
            let store = open_store(db)?;
            let opts = IndexPackOptions {
                limit,
                budget_tokens,
                window,
            };
            let pack = build_index_pack(&store, &query, &opts)?;
            emit(&serde_json::to_value(&pack)?, json);
            Ok(EXIT_OK)
        }

        GraphCommands::Pack {
            refs,
            budget_tokens,
        } => {
            if refs.is_empty() {
                return fail_validation("no refs given", json);
            }
            let store = open_store(db)?;
            let pack = build_context_pack(&store, &refs, budget_tokens)?;
            emit(&serde_json::to_value(&pack)?, json);
            Ok(EXIT_OK)
        }

        GraphCommands::Preflight {
            query,
            take,
            budget_tokens,
        } => {
            if query.trim().is_empty() {
                return fail_validation("empty query", json);
            }
            let store = open_store(db)?;
            let opts = IndexPackOptions {
                budget_tokens,
                ..Default::default()
            };
            let pack = preflight(&store, &query, &opts, take)?;
            emit(&serde_json::to_value(&pack)?, json);
            Ok(EXIT_OK)
        }

        GraphCommands::CaptureGit {
            repos,
            lookback_hours,
            max_commits,
            state_path,
        } => {
            let store = open_store(db)?;
            let opts = GitCaptureOptions {
                repos,
                lookback_hours,
                max_commits,
                state_path: state_path
                    .unwrap_or_else(|| defaults::state_dir().join("graph-capture-git.json")),
            };
            let receipt = capture_git(&store, &opts)?;
            emit(&envelope("graph.capture-git", serde_json::to_value(&receipt)?), json);
            Ok(EXIT_OK)
        }

        GraphCommands::CaptureMd {
            paths,
            include_exts,
            exclude_globs,
            min_heading_level,
        } => {
            let store = open_store(db)?;
            let mut opts = MdCaptureOptions {
                paths,
                min_heading_level,
                ..Default::default()
            };
            if !include_exts.is_empty() {
                opts.include_exts = include_exts;
            }
            if !exclude_globs.is_empty() {
                opts.exclude_globs = exclude_globs;
            }
            let receipt = capture_markdown(&store, &opts)?;
            emit(&envelope("graph.capture-md", serde_json::to_value(&receipt)?), json);
            Ok(EXIT_OK)
        }
    }
}

/// Embed a freshly stored observation into both vector tables, fail-open.
fn embed_stored(
    store: &Store,
    client: &EmbeddingsClient,
    model: &str,
    id: i64,
    text: &str,
    text_en: Option<&str>,
) -> bool {
    let mut texts = vec![text.to_string()];
    if let Some(en) = text_en {
        texts.push(en.to_string());
    }
    match client.embed(&texts, model) {
        Ok(vectors) => {
            let mut ok = true;
            if let Some(v) = vectors.first() {
                ok &= store
                    .insert_embedding(EmbeddingTable::Original, id, model, v)
                    .is_ok();
            }
            if text_en.is_some() {
                if let Some(v) = vectors.get(1) {
                    ok &= store
                        .insert_embedding(EmbeddingTable::English, id, model, v)
                        .is_ok();
                }
            }
            ok
        }
        Err(err) => {
            tracing::warn!(error = %err, "embedding failed; observation stored without vectors");
            false
        }
    }
}
