use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use mdl::doc_tree::dump::dump as dump_doc;
use mdl::parse_tree::dump::dump as dump_parse;
use mdl::{DocumentOptions, ParseError};

/// Optional `<name>.toml` next to a `<name>.mdl` test document.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Directions {
    /// Human-readable test description.
    pub description: Option<String>,

    /// Error code the document must fail with, e.g. `unknown-tag`.
    pub fail_parse: Option<String>,
}

/// Expected dumps stored next to the `.mdl` file, by extension.
const EXPECTATIONS: &[&str] = &["parse", "predoc", "doc"];

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description
            .as_deref()
            .unwrap_or_else(|| self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("?"))
    }
}

fn load_directions(path: &Path) -> Result<Directions, String> {
    let toml_path = path.with_extension("toml");
    if !toml_path.is_file() {
        return Ok(Directions::default());
    }
    let text = std::fs::read_to_string(&toml_path)
        .map_err(|e| format!("cannot read {}: {}", toml_path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("{}: TOML parse error: {}", toml_path.display(), e))
}

/// Dumps produced by the pipeline for one document, keyed by extension.
fn render(text: &str, name: &str) -> Result<BTreeMap<&'static str, String>, ParseError> {
    let mut dumps = BTreeMap::new();
    let tree = mdl::parser::parse_str(text, Some(name))?;
    dumps.insert("parse", dump_parse(&tree));
    for (ext, options) in [
        ("predoc", DocumentOptions { normalize: false }),
        ("doc", DocumentOptions::default()),
    ] {
        let docs = mdl::convert_documents(&tree, options)?;
        dumps.insert(ext, docs.iter().map(|doc| dump_doc(&doc.tree)).collect());
    }
    Ok(dumps)
}

pub fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };
    let directions = match load_directions(path) {
        Ok(d) => d,
        Err(e) => return fail(None, e),
    };
    let description = directions.description.clone();

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
    let result = render(&text, name);

    if let Some(expected) = &directions.fail_parse {
        return match result {
            Err(err) if &err.code == expected => TestResult {
                path: path.to_path_buf(),
                description,
                outcome: TestOutcome::Pass,
            },
            Err(err) => fail(
                description,
                format!("expected error '{}', got: {}", expected, err),
            ),
            Ok(_) => fail(
                description,
                format!("expected error '{}', but parsing succeeded", expected),
            ),
        };
    }

    let dumps = match result {
        Ok(d) => d,
        Err(err) => {
            let reason = format!("unexpected error: {}\n{}", err, err.context(2, 3));
            return fail(description, reason);
        }
    };

    let mut checked = 0;
    for ext in EXPECTATIONS {
        let expected_path = path.with_extension(ext);
        let Ok(expected) = std::fs::read_to_string(&expected_path) else {
            continue;
        };
        checked += 1;
        let actual = dumps.get(ext).map(String::as_str).unwrap_or_default();
        if let Some(reason) = compare(ext, &expected, actual) {
            return fail(description, reason);
        }
    }

    if checked == 0 {
        return fail(
            description,
            "no expectations (.parse, .predoc, .doc or fail-parse) found".into(),
        );
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

/// Report the first differing line, if any.
fn compare(ext: &str, expected: &str, actual: &str) -> Option<String> {
    if expected == actual {
        return None;
    }
    let mut expected_lines = expected.lines();
    let mut actual_lines = actual.lines();
    let mut line = 1;
    loop {
        match (expected_lines.next(), actual_lines.next()) {
            (Some(e), Some(a)) if e == a => line += 1,
            (e, a) => {
                return Some(format!(
                    ".{} mismatch at line {}\n  expected: {}\n  actual:   {}",
                    ext,
                    line,
                    e.unwrap_or("(end of dump)"),
                    a.unwrap_or("(end of dump)")
                ));
            }
        }
    }
}

/// Discover `.mdl` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    if root.is_file() {
        categories.insert(String::new(), vec![root.to_path_buf()]);
        return categories;
    }
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path.extension().is_some_and(|ext| ext == "mdl") {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .mdl files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn paint(s: &str, code: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, s)
    }
}

fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }
    let mut filtered = BTreeMap::new();
    for requested in requested {
        let req = requested.trim_matches('/');
        let mut found = false;
        for (cat, files) in all {
            if cat == req || cat.starts_with(&format!("{}/", req)) {
                filtered.insert(cat.as_str(), files);
                found = true;
            }
        }
        if !found {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all.keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    filtered
}

/// Run every `.mdl` test under `path` (or the single file `path`).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let all_categories = discover_categorized(path);
    if all_categories.is_empty() {
        eprintln!("no .mdl files found in {}", path.display());
        return 1;
    }

    let run_categories = if path.is_file() {
        select(&all_categories, &[])
    } else {
        select(&all_categories, categories)
    };
    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat };
            eprintln!();
            eprintln!("{}", paint(header, "1", no_color));
        }

        for file in *files {
            let result = run_single_test(file);
            log::debug!("ran {}", file.display());
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", paint("PASS", "32", no_color), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", paint("FAIL", "31", no_color), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", paint("ok", "32", no_color), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failed,
            passed + failed
        );
        1
    }
}
