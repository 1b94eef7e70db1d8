//! Rule lifecycle: create, list, combine, evaluate.
//!
//! The service owns a rule store and an audit sink and drives the DSL core.
//! Nothing here is global; callers build one service per process (or per
//! test) and pass it around.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::audit::{AuditSink, EvaluationRecord};
use crate::config::RulesConfig;
use crate::dsl::{
    EvalError, Node, ParseError, Record, Value, combine, evaluate, normalize_record, parse,
    validate_syntax,
};
use crate::store::{Rule, RuleStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Rule id must not be empty")]
    EmptyRuleId,

    #[error("Invalid rule syntax for '{id}': {source}")]
    InvalidSyntax { id: String, source: ParseError },

    #[error("No valid rules found")]
    NoRulesFound,

    #[error("Error parsing combined rules: {0}")]
    CombinedParse(#[source] ParseError),

    #[error("Invalid query data: {0}")]
    InvalidRecord(String),

    #[error("Error evaluating rules: {0}")]
    Evaluation(#[from] EvalError),

    #[error("Failed to import rules: {0:#}")]
    Import(anyhow::Error),

    #[error("{0:#}")]
    Store(anyhow::Error),

    #[error("{0:#}")]
    Audit(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Outcome of evaluating stored rules against one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub combined_expression: String,
    pub result: bool,
}

/// Per-record outcome of a batch run; exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// YAML layout accepted by `import_rules`.
#[derive(Debug, Deserialize)]
struct RuleSetFile {
    rules: Vec<Rule>,
}

/// Trim, collapse whitespace runs and optionally lowercase an expression.
pub fn clean_expression(expression: &str, lowercase: bool) -> String {
    let collapsed = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    if lowercase {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

/// Turn request JSON into a record with lowercase field names.
///
/// Only scalar entries become fields. `null`, arrays and nested objects are
/// left out, so a rule naming one of them fails with a missing field while
/// rules that never read them are unaffected.
pub fn record_from_json(query_data: &serde_json::Value) -> Result<Record> {
    let Some(object) = query_data.as_object() else {
        return Err(ServiceError::InvalidRecord(
            "expected a JSON object".to_string(),
        ));
    };
    let record: Record = object
        .iter()
        .filter_map(|(key, value)| match Value::from_json(value) {
            Some(value) => Some((key.clone(), value)),
            None => {
                tracing::trace!("skipping non-scalar field '{}'", key);
                None
            }
        })
        .collect();
    Ok(normalize_record(record))
}

pub struct RuleService<S, A> {
    store: S,
    audit: A,
    lowercase_expressions: bool,
}

impl<S: RuleStore, A: AuditSink> RuleService<S, A> {
    pub fn new(store: S, audit: A, rules: &RulesConfig) -> Self {
        Self {
            store,
            audit,
            lowercase_expressions: rules.lowercase_expressions,
        }
    }

    fn prepare(&self, id: &str, expression: &str) -> Result<Rule> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ServiceError::EmptyRuleId);
        }

        let expression = clean_expression(expression, self.lowercase_expressions);
        validate_syntax(&expression).map_err(|source| ServiceError::InvalidSyntax {
            id: id.to_string(),
            source,
        })?;

        Ok(Rule {
            id: id.to_string(),
            expression,
        })
    }

    /// Validate and store a rule, replacing any rule with the same id.
    pub fn create_rule(&mut self, id: &str, expression: &str) -> Result<Rule> {
        let rule = self.prepare(id, expression)?;
        self.store
            .upsert(rule.clone())
            .map_err(ServiceError::Store)?;
        tracing::info!("Rule '{}' stored: {}", rule.id, rule.expression);
        Ok(rule)
    }

    /// Load a YAML rule set. Every rule is validated before any is stored.
    pub fn import_rules(&mut self, path: &Path) -> Result<Vec<Rule>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Import(anyhow::anyhow!("{:?}: {}", path, e)))?;
        let file: RuleSetFile = serde_yaml::from_str(&text)
            .map_err(|e| ServiceError::Import(anyhow::anyhow!("{:?}: {}", path, e)))?;

        let prepared = file
            .rules
            .iter()
            .map(|rule| self.prepare(&rule.id, &rule.expression))
            .collect::<Result<Vec<_>>>()?;

        for rule in &prepared {
            self.store
                .upsert(rule.clone())
                .map_err(ServiceError::Store)?;
        }
        tracing::info!("Imported {} rules from {:?}", prepared.len(), path);
        Ok(prepared)
    }

    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        self.store.list().map_err(ServiceError::Store)
    }

    /// Remove every stored rule.
    pub fn clean(&mut self) -> Result<usize> {
        let removed = self.store.clear().map_err(ServiceError::Store)?;
        tracing::info!("Removed {} rules", removed);
        Ok(removed)
    }

    /// Combine the expressions of the given rules into one conjunction.
    pub fn combine_rules(&self, ids: &[String]) -> Result<String> {
        let rules = self.store.find(ids).map_err(ServiceError::Store)?;
        if rules.is_empty() {
            return Err(ServiceError::NoRulesFound);
        }
        if rules.len() < ids.len() {
            tracing::warn!(
                "Resolved {} of {} requested rule ids",
                rules.len(),
                ids.len()
            );
        }

        let expressions: Vec<&str> = rules.iter().map(|r| r.expression.as_str()).collect();
        let combined = combine(&expressions);
        tracing::debug!("Combined {} rules: {}", rules.len(), combined);
        Ok(combined)
    }

    fn compile(&self, ids: &[String]) -> Result<(String, Node)> {
        let combined = self.combine_rules(ids)?;
        let ast = parse(&combined).map_err(ServiceError::CombinedParse)?;
        Ok((combined, ast))
    }

    /// Evaluate the given rules against one record and audit the verdict.
    pub fn evaluate_rules(
        &mut self,
        ids: &[String],
        query_data: &serde_json::Value,
    ) -> Result<Evaluation> {
        let record = record_from_json(query_data)?;
        let (combined, ast) = self.compile(ids)?;
        let result = evaluate(&ast, &record)?;

        EvaluationRecord::new(ids, query_data.clone(), &combined, result)
            .and_then(|entry| self.audit.record(&entry))
            .map_err(ServiceError::Audit)?;

        tracing::info!("Evaluated {:?} -> {}", ids, result);
        Ok(Evaluation {
            combined_expression: combined,
            result,
        })
    }

    /// Evaluate the given rules against many records in parallel.
    ///
    /// The combined expression is parsed once. A failing record does not
    /// stop the batch; its error is reported in place and it is not audited.
    pub fn evaluate_batch(
        &mut self,
        ids: &[String],
        records: &[serde_json::Value],
    ) -> Result<(String, Vec<BatchOutcome>)> {
        let (combined, ast) = self.compile(ids)?;

        let outcomes: Vec<BatchOutcome> = records
            .par_iter()
            .enumerate()
            .map(|(index, data)| {
                let verdict = record_from_json(data)
                    .and_then(|record| evaluate(&ast, &record).map_err(ServiceError::from));
                match verdict {
                    Ok(result) => BatchOutcome {
                        index,
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => BatchOutcome {
                        index,
                        result: None,
                        error: Some(err.to_string()),
                    },
                }
            })
            .collect();

        for (outcome, data) in outcomes.iter().zip(records) {
            if let Some(result) = outcome.result {
                EvaluationRecord::new(ids, data.clone(), &combined, result)
                    .and_then(|entry| self.audit.record(&entry))
                    .map_err(ServiceError::Audit)?;
            }
        }

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        tracing::info!(
            "Batch evaluated {} records ({} failed)",
            outcomes.len(),
            failed
        );
        Ok((combined, outcomes))
    }

    /// Flush the audit sink.
    pub fn finish(&mut self) -> Result<()> {
        self.audit.finish().map_err(ServiceError::Audit)
    }
}
