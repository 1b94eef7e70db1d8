//! Rule persistence.
//!
//! The service only sees the `RuleStore` trait; which backend sits behind it
//! is decided once at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A stored rule. `id` is trimmed and `expression` has passed a syntax check
/// before it reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub expression: String,
}

pub trait RuleStore {
    /// Insert a rule, replacing any rule with the same id.
    fn upsert(&mut self, rule: Rule) -> Result<()>;

    /// Look up rules by id, in request order. Unknown ids are skipped and
    /// repeated ids resolve once.
    fn find(&self, ids: &[String]) -> Result<Vec<Rule>>;

    fn list(&self) -> Result<Vec<Rule>>;

    /// Remove every rule, returning how many were dropped.
    fn clear(&mut self) -> Result<usize>;
}

fn select(rules: &[Rule], ids: &[String]) -> Vec<Rule> {
    let mut found: Vec<Rule> = Vec::new();
    for id in ids {
        if found.iter().any(|r| &r.id == id) {
            continue;
        }
        if let Some(rule) = rules.iter().find(|r| &r.id == id) {
            found.push(rule.clone());
        }
    }
    found
}

fn replace(rules: &mut Vec<Rule>, rule: Rule) {
    rules.retain(|r| r.id != rule.id);
    rules.push(rule);
}

/// In-process store, insertion ordered.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Vec<Rule>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for MemoryRuleStore {
    fn upsert(&mut self, rule: Rule) -> Result<()> {
        replace(&mut self.rules, rule);
        Ok(())
    }

    fn find(&self, ids: &[String]) -> Result<Vec<Rule>> {
        Ok(select(&self.rules, ids))
    }

    fn list(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.clone())
    }

    fn clear(&mut self) -> Result<usize> {
        let count = self.rules.len();
        self.rules.clear();
        Ok(count)
    }
}

/// Rules kept as a JSON array on disk. Every mutation rewrites the file
/// through a temp file in the same directory, so readers never see a
/// half-written array.
#[derive(Debug)]
pub struct JsonFileRuleStore {
    path: PathBuf,
    rules: Vec<Rule>,
}

impl JsonFileRuleStore {
    /// Open the store; a missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Store: Failed to parse rules file {:?}", path))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Store: Failed to read rules file {:?}", path));
            }
        };
        tracing::debug!("Store: loaded {} rules from {:?}", rules.len(), path);
        Ok(Self { path, rules })
    }

    fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Store: Failed to create directory {:?}", dir))?;

        let temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Store: Failed to create temp file in {:?}", dir))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &self.rules)
                .context("Store: Failed to serialize rules")?;
            writer.flush().context("Store: Failed to flush rules")?;
        }
        temp.persist(&self.path)
            .with_context(|| format!("Store: Failed to replace rules file {:?}", self.path))?;
        Ok(())
    }
}

impl RuleStore for JsonFileRuleStore {
    fn upsert(&mut self, rule: Rule) -> Result<()> {
        replace(&mut self.rules, rule);
        self.flush()
    }

    fn find(&self, ids: &[String]) -> Result<Vec<Rule>> {
        Ok(select(&self.rules, ids))
    }

    fn list(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.clone())
    }

    fn clear(&mut self) -> Result<usize> {
        let count = self.rules.len();
        self.rules.clear();
        self.flush()?;
        Ok(count)
    }
}

/// Store chosen at startup from configuration.
pub enum AnyRuleStore {
    Memory(MemoryRuleStore),
    File(JsonFileRuleStore),
}

impl AnyRuleStore {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(AnyRuleStore::File(JsonFileRuleStore::open(path)?)),
            None => Ok(AnyRuleStore::Memory(MemoryRuleStore::new())),
        }
    }
}

impl RuleStore for AnyRuleStore {
    fn upsert(&mut self, rule: Rule) -> Result<()> {
        match self {
            AnyRuleStore::Memory(store) => store.upsert(rule),
            AnyRuleStore::File(store) => store.upsert(rule),
        }
    }

    fn find(&self, ids: &[String]) -> Result<Vec<Rule>> {
        match self {
            AnyRuleStore::Memory(store) => store.find(ids),
            AnyRuleStore::File(store) => store.find(ids),
        }
    }

    fn list(&self) -> Result<Vec<Rule>> {
        match self {
            AnyRuleStore::Memory(store) => store.list(),
            AnyRuleStore::File(store) => store.list(),
        }
    }

    fn clear(&mut self) -> Result<usize> {
        match self {
            AnyRuleStore::Memory(store) => store.clear(),
            AnyRuleStore::File(store) => store.clear(),
        }
    }
}
