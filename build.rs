use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's own Rust sources. Nothing else is scanned.
const SOURCE_DIRS: [&str; 4] = ["regress", "cli", "tests", "benches"];

// Words that turn a comment into a change log.
const CHANGELOG_WORDS: &str = "FIXED|CORRECTED|FIXES|FIX|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

// Which lines a rule's regex hit actually counts as a violation.
#[derive(Clone, Copy)]
enum LineFilter {
    // Underscore-prefixed names outside comments and string literals.
    Code,
    // Every hit counts.
    Any,
    // Hits outside `///` doc comments.
    NonDocComment,
    // Comments whose alphabetic characters are all uppercase.
    ShoutingComment,
}

struct Rule {
    name: &'static str,
    pattern: String,
    filter: LineFilter,
    advice: &'static str,
}

struct RuleCollector {
    filter: LineFilter,
    violations: Vec<String>,
}

impl RuleCollector {
    fn new(filter: LineFilter) -> Self {
        Self {
            filter,
            violations: Vec::new(),
        }
    }

    fn counts(&self, line: &str) -> bool {
        match self.filter {
            LineFilter::Any => true,
            LineFilter::Code => !is_comment(line) && !underscore_only_in_strings(line),
            LineFilter::NonDocComment => !line.trim_start().starts_with("///"),
            LineFilter::ShoutingComment => comment_text(line).is_some_and(|text| {
                let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
            }),
        }
    }
}

impl Sink for RuleCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.counts(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

// Odd-numbered pieces between double quotes are string contents.
fn underscore_only_in_strings(line: &str) -> bool {
    line.contains('"')
        && line
            .split('"')
            .enumerate()
            .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim_start_matches(['/', '!']).trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
}

fn rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "underscore-prefixed variables",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            filter: LineFilter::Code,
            advice: "Either use the variable (removing the underscore) or remove it completely.",
        },
        Rule {
            name: "change-log comments",
            pattern: format!(r"(//|/\*).*(?:{CHANGELOG_WORDS})"),
            filter: LineFilter::Any,
            advice: "Comments describe the code as it is. Remove them rather than commenting them out.",
        },
        Rule {
            name: "'**' in regular comments",
            pattern: r"(//|/\*).*\*\*".to_string(),
            filter: LineFilter::NonDocComment,
            advice: "Emphasis markers are only allowed in `///` doc comments.",
        },
        Rule {
            name: "all-uppercase comments",
            pattern: r"(//|/\*).*".to_string(),
            filter: LineFilter::ShoutingComment,
            advice: "Strongly consider deleting the comment completely.",
        },
        Rule {
            name: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            filter: LineFilter::Any,
            advice: "Either use the code (removing the attribute) or remove it completely.",
        },
    ]
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check(rule: &Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern)?;
    let mut searcher = Searcher::new();
    for path in files {
        let mut collector = RuleCollector::new(rule.filter);
        searcher.search_path(&matcher, path, &mut collector)?;
        if collector.violations.is_empty() {
            continue;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            collector.violations.len(),
            rule.name,
            path.display()
        );
        for violation in &collector.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str(&format!(
            "\n⚠️ {} are STRICTLY FORBIDDEN in this project.\n   {}\n",
            rule.name, rule.advice
        ));
        return Err(message.into());
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let files = source_files();
    for rule in rules() {
        if let Err(e) = check(&rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
