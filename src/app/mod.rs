use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::audit::{AuditSink, NullAuditSink, init_sink};
use crate::config::EngineConfig;
use crate::dsl::parse;
use crate::service::{RuleService, clean_expression};
use crate::store::AnyRuleStore;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Rules file (overrides the configured store path)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Keep rules in memory only; nothing is read or written
    #[arg(long, global = true, conflicts_with = "store")]
    pub memory: bool,

    /// Evaluation audit log (overrides the configured path)
    #[arg(long, global = true)]
    pub audit_log: Option<PathBuf>,

    /// Do not write evaluation audit records
    #[arg(long, global = true)]
    pub no_audit: bool,

    /// Number of threads for batch evaluation (default: all cores)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate and store a rule, replacing any rule with the same id
    Add { id: String, expression: String },

    /// List stored rules
    List {
        #[arg(long, value_enum, default_value_t = ListFormat::Json)]
        format: ListFormat,
    },

    /// Check an expression and print its canonical form
    Check { expression: String },

    /// Combine stored rules into one expression
    Combine {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Evaluate stored rules against a record (or a file of records)
    #[command(group(
        ArgGroup::new("input")
            .required(true)
            .args(["data", "data_file", "records"])
    ))]
    Evaluate {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Record as a JSON object
        #[arg(long)]
        data: Option<String>,

        /// File holding a JSON object record
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// JSON Lines file, one record per line, evaluated in parallel
        #[arg(long)]
        records: Option<PathBuf>,
    },

    /// Import rules from a YAML file (`rules: [{id, expression}]`)
    Import { path: PathBuf },

    /// Remove every stored rule
    Clean,
}

impl Command {
    fn writes_audit(&self) -> bool {
        matches!(self, Command::Evaluate { .. })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum ListFormat {
    Json,
    Yaml,
}

/// Response envelope printed on stdout.
#[derive(Debug, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a command prints: the JSON envelope, or raw text for YAML listings.
pub enum Output {
    Json(Value),
    Text(String),
}

/// Merge config file, environment and command-line overrides.
pub fn resolve_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config =
        EngineConfig::load(cli.config.as_deref()).context("Config: Failed to load settings")?;

    if cli.memory {
        config.store.path = None;
    } else if let Some(path) = &cli.store {
        config.store.path = Some(path.clone());
    }
    if let Some(path) = &cli.audit_log {
        config.audit.path = path.clone();
    }
    if cli.no_audit {
        config.audit.enabled = false;
    }
    Ok(config)
}

pub type CliService = RuleService<AnyRuleStore, Box<dyn AuditSink>>;

pub fn init_service(config: &EngineConfig, command: &Command) -> Result<CliService> {
    let store = AnyRuleStore::open(config.store.path.as_deref())?;
    match &config.store.path {
        Some(path) => tracing::info!("Store: {:?}", path),
        None => tracing::info!("Store: in-memory"),
    }

    let audit: Box<dyn AuditSink> = if command.writes_audit() {
        init_sink(config.audit.enabled, &config.audit.path)?
    } else {
        Box::new(NullAuditSink)
    };

    Ok(RuleService::new(store, audit, &config.rules))
}

fn read_json_file(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("CLI: Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("CLI: Invalid JSON in {:?}", path))
}

fn read_jsonl_file(path: &Path) -> Result<Vec<Value>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("CLI: Failed to open {:?}", path))?;
    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("CLI: Failed to read {:?}", path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("CLI: Invalid JSON on line {} of {:?}", number + 1, path))?;
        records.push(record);
    }
    Ok(records)
}

/// Run one command against the service.
pub fn execute(
    service: &mut CliService,
    command: &Command,
    config: &EngineConfig,
) -> Result<Output> {
    let output = match command {
        Command::Add { id, expression } => {
            let rule = service.create_rule(id, expression)?;
            Output::Json(serde_json::to_value(rule)?)
        }

        Command::List { format } => {
            let rules = service.list_rules()?;
            match format {
                ListFormat::Json => Output::Json(serde_json::to_value(rules)?),
                ListFormat::Yaml => Output::Text(serde_yaml::to_string(&json!({ "rules": rules }))?),
            }
        }

        Command::Check { expression } => {
            let cleaned = clean_expression(expression, config.rules.lowercase_expressions);
            let ast = parse(&cleaned)?;
            Output::Json(json!({
                "expression": cleaned,
                "canonical": ast.to_string(),
                "fields": ast.fields(),
                "operands": ast.operand_count(),
            }))
        }

        Command::Combine { ids } => {
            let combined = service.combine_rules(ids)?;
            Output::Json(json!({ "combined_expression": combined }))
        }

        Command::Evaluate {
            ids,
            data,
            data_file,
            records,
        } => {
            if let Some(path) = records {
                let records = read_jsonl_file(path)?;
                let (combined, results) = service.evaluate_batch(ids, &records)?;
                Output::Json(json!({
                    "combined_expression": combined,
                    "results": results,
                }))
            } else {
                let query_data = match (data, data_file) {
                    (Some(text), _) => {
                        serde_json::from_str(text).context("CLI: --data is not valid JSON")?
                    }
                    (None, Some(path)) => read_json_file(path)?,
                    (None, None) => anyhow::bail!("CLI: no record given"),
                };
                let evaluation = service.evaluate_rules(ids, &query_data)?;
                Output::Json(serde_json::to_value(evaluation)?)
            }
        }

        Command::Import { path } => {
            let rules = service.import_rules(path)?;
            Output::Json(json!({ "imported": rules.len(), "rules": rules }))
        }

        Command::Clean => {
            let removed = service.clean()?;
            Output::Json(json!({
                "removed": removed,
                "message": "Database cleaned successfully",
            }))
        }
    };

    service.finish()?;
    Ok(output)
}

pub fn success(data: Value) -> Response {
    Response {
        success: true,
        data: Some(data),
        error: None,
    }
}

pub fn failure(error: &anyhow::Error) -> Response {
    Response {
        success: false,
        data: None,
        error: Some(format!("{:#}", error)),
    }
}
