//! Import and alias usage search over a Python repository.
//!
//! Used to ground import repairs: when a candidate cannot import a symbol,
//! the places where the repository itself imports that symbol show the
//! correct module path.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Matches shown in full in a report.
pub const RESULT_SHOW_LIMIT: usize = 5;

/// Directories that hold build output, docs, or test fixtures, not sources.
const EXCLUDED_DIRS: &[&str] = &[
    "build",
    "doc",
    "requests/packages",
    "tests/regrtest_data",
    "tests/input",
];

/// One import statement that brings in the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportUsage {
    /// Path relative to the repository root.
    pub file: PathBuf,
    pub module: String,
    pub alias: Option<String>,
    /// First and last line (1-based) of the statement.
    pub lines: (usize, usize),
    pub text: String,
}

/// Rendered search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub output: String,
    pub found: bool,
    pub usages: Vec<ImportUsage>,
}

impl SearchReport {
    /// Renders `usages` for a repair prompt.
    pub fn render(symbol: &str, usages: Vec<ImportUsage>) -> Self {
        if usages.is_empty() {
            return Self {
                output: format!("No imports or aliases for '{}' found.", symbol),
                found: false,
                usages,
            };
        }

        let shown = usages.len().min(RESULT_SHOW_LIMIT);
        let mut output = format!("[Import Search] Found import or alias of '{}':\n", symbol);
        output.push_str(&format!(
            "Found {} usages of '{}' in the codebase:\n\n",
            usages.len(),
            symbol
        ));
        output.push_str(&format!(
            "Detailed import lines for the first {} matches:\n",
            shown
        ));
        for usage in usages.iter().take(shown) {
            output.push_str(&format!(
                "- <file>{}</file> ({}-{})\n",
                usage.file.display(),
                usage.lines.0,
                usage.lines.1
            ));
            output.push_str(&format!("    {}\n", usage.text));
        }

        Self {
            output,
            found: true,
            usages,
        }
    }
}

/// Code search used to enrich repair prompts.
#[async_trait]
pub trait CodeSearch: Send + Sync {
    /// Finds imports of `symbol`, direct or aliased.
    async fn import_usages(&self, symbol: &str) -> Result<SearchReport>;

    /// Returns the name of this search backend.
    fn name(&self) -> &str;
}

#[async_trait]
impl<'a, T: CodeSearch + ?Sized> CodeSearch for &'a T {
    async fn import_usages(&self, symbol: &str) -> Result<SearchReport> {
        (**self).import_usages(symbol).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// First imported name of a `from X import ...` tail: `"(A as B, C)"` -> `"A"`.
pub fn primary_symbol(imported: &str) -> Option<&str> {
    imported
        .trim()
        .trim_start_matches('(')
        .split(',')
        .next()
        .and_then(|name| name.split_whitespace().next())
        .map(|name| name.trim_end_matches(')'))
        .filter(|name| !name.is_empty())
}

fn from_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+(.+)$").expect("from-import pattern is valid")
    })
}

fn plain_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*import\s+(.+)$").expect("import pattern is valid"))
}

/// Splits `name` / `name as alias`.
fn split_alias(item: &str) -> Option<(&str, Option<&str>)> {
    let mut parts = item.split_whitespace();
    let name = parts.next()?;
    match (parts.next(), parts.next()) {
        (Some("as"), Some(alias)) => Some((name, Some(alias))),
        (None, _) => Some((name, None)),
        _ => None,
    }
}

/// Strips a trailing `# comment`.
fn code_part(line: &str) -> &str {
    line.split('#').next().unwrap_or(line)
}

/// Scans one file's content for imports of `symbol`.
fn scan_content(content: &str, symbol: &str, file: &Path) -> Vec<ImportUsage> {
    let lines: Vec<&str> = content.lines().collect();
    let mut usages = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let start = idx;
        let line = code_part(lines[idx]);
        idx += 1;

        if let Some(caps) = from_import_regex().captures(line) {
            let module = caps[1].to_string();
            let mut names = caps[2].to_string();
            // Parenthesized imports can span lines.
            if names.contains('(') && !names.contains(')') {
                while idx < lines.len() {
                    let next = code_part(lines[idx]);
                    idx += 1;
                    names.push(' ');
                    names.push_str(next.trim());
                    if next.contains(')') {
                        break;
                    }
                }
            }

            let names = names.replace(['(', ')', '\\'], " ");
            for item in names.split(',') {
                if let Some((name, alias)) = split_alias(item.trim()) {
                    if name == symbol {
                        usages.push(ImportUsage {
                            file: file.to_path_buf(),
                            module: module.clone(),
                            alias: alias.map(str::to_string),
                            lines: (start + 1, idx),
                            text: lines[start..idx]
                                .iter()
                                .map(|l| l.trim())
                                .collect::<Vec<_>>()
                                .join(" "),
                        });
                    }
                }
            }
        } else if let Some(caps) = plain_import_regex().captures(line) {
            for item in caps[1].split(',') {
                let Some((dotted, alias)) = split_alias(item.trim()) else {
                    continue;
                };
                let Some((module, name)) = dotted.rsplit_once('.') else {
                    continue;
                };
                if name == symbol {
                    usages.push(ImportUsage {
                        file: file.to_path_buf(),
                        module: module.to_string(),
                        alias: alias.map(str::to_string),
                        lines: (start + 1, start + 1),
                        text: lines[start].trim().to_string(),
                    });
                }
            }
        }
    }

    usages
}

fn is_excluded(relative: &Path) -> bool {
    let normalized = format!(
        "/{}/",
        relative
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    );
    EXCLUDED_DIRS
        .iter()
        .any(|dir| normalized.contains(&format!("/{}/", dir)))
}

/// Walks `.py` files under a repository root looking for imports.
#[derive(Debug, Clone)]
pub struct ImportUsageSearch {
    root: PathBuf,
}

impl ImportUsageSearch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Synchronous scan; results are ordered by path.
    pub fn scan(&self, symbol: &str) -> Result<Vec<ImportUsage>> {
        if !self.root.is_dir() {
            return Err(Error::Search(format!(
                "repository root {} is not a directory",
                self.root.display()
            )));
        }

        let mut usages = Vec::new();
        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if is_excluded(relative) {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            usages.extend(scan_content(&content, symbol, relative));
        }

        Ok(usages)
    }
}

#[async_trait]
impl CodeSearch for ImportUsageSearch {
    async fn import_usages(&self, symbol: &str) -> Result<SearchReport> {
        let search = self.clone();
        let owned = symbol.to_string();
        let usages = tokio::task::spawn_blocking(move || search.scan(&owned))
            .await
            .map_err(|e| Error::Search(format!("search task failed: {}", e)))??;

        tracing::info!(symbol, matches = usages.len(), "import usage search finished");
        Ok(SearchReport::render(symbol, usages))
    }

    fn name(&self) -> &str {
        "import-usage"
    }
}
