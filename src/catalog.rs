//! Grammar catalog loading.
//!
//! A catalog directory holds one file per grammar rule: the file name is the
//! rule name and the contents are the instructional prompt used to rewrite a
//! sentence under that rule. The catalog is read once at startup and is never
//! reloaded, so the set of legal classification values is fixed for the
//! process lifetime.
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Relative path of the rule directory inside a prompts directory.
pub const GRAMMARS_DIR_REL: &str = "grammars";

/// Relative path of the grammar-selector instruction inside a prompts directory.
pub const GRAMMAR_SELECTOR_REL: &str = "grammar_selector";

/// Built-in selector instruction used when the prompts directory has none.
const DEFAULT_GRAMMAR_SELECTOR: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/system_prompts/grammar_selector"
));

/// A named grammar rule and the prompt that applies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarRule {
    pub name: String,
    pub prompt: String,
}

/// Immutable set of grammar rules keyed by name.
#[derive(Debug, Clone)]
pub struct Catalog {
    rules: BTreeMap<String, GrammarRule>,
}

impl Catalog {
    /// Build a catalog from rules; later duplicates replace earlier ones.
    pub fn from_rules(rules: impl IntoIterator<Item = GrammarRule>) -> Result<Self> {
        let rules: BTreeMap<String, GrammarRule> = rules
            .into_iter()
            .map(|rule| (rule.name.clone(), rule))
            .collect();
        if rules.is_empty() {
            return Err(anyhow!("grammar catalog is empty"));
        }
        Ok(Self { rules })
    }

    pub fn get(&self, name: &str) -> Option<&GrammarRule> {
        self.rules.get(name)
    }

    /// Look up a rule, listing the known names when it is missing.
    pub fn require(&self, name: &str) -> Result<&GrammarRule> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "unknown grammar {name:?} (available: {})",
                self.names().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Rule names in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// First rule in catalog order, used when no rule is selected explicitly.
    pub fn first(&self) -> Option<&GrammarRule> {
        self.rules.values().next()
    }
}

/// Load every regular, non-hidden file in `dir` as a grammar rule.
pub fn load_catalog(dir: &Path) -> Result<Catalog> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("read grammar dir {}", dir.display()))?;
    let mut rules = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list grammar dir {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return Err(anyhow!(
                "grammar file name is not valid UTF-8: {}",
                path.display()
            ));
        };
        if name.starts_with('.') {
            continue;
        }
        let prompt = fs::read_to_string(&path)
            .with_context(|| format!("read grammar {}", path.display()))?;
        rules.push(GrammarRule {
            name: name.to_string(),
            prompt,
        });
    }
    let catalog = Catalog::from_rules(rules)
        .with_context(|| format!("load grammar catalog from {}", dir.display()))?;
    tracing::info!(
        rules = catalog.rule_count(),
        dir = %dir.display(),
        "grammar catalog loaded"
    );
    Ok(catalog)
}

/// Load the grammar-selector instruction, falling back to the built-in one.
pub fn load_selector_instruction(path: &Path) -> Result<String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "using built-in grammar selector");
        return Ok(DEFAULT_GRAMMAR_SELECTOR.to_string());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("read grammar selector {}", path.display()))?;
    if text.trim().is_empty() {
        return Err(anyhow!("grammar selector {} is empty", path.display()));
    }
    Ok(text)
}
