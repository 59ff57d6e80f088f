use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const SOURCE_DIRS: &[&str] = &["src"];

struct SourceFile {
    rel_path: PathBuf,
    content: String,
}

/// One offending line: `(line number, message)`.
type Finding = (usize, String);

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let sha = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=RANGER_PROVIDER_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let sources = load_sources(&root);

    let mut failures = Vec::new();
    failures.extend(report(
        "FILE LINE LIMIT EXCEEDED",
        "Split these files into smaller modules.",
        &sources,
        check_line_limit,
    ));
    failures.extend(report(
        "#[allow(dead_code)] IS NOT ALLOWED",
        "Delete unused code, or gate test-only helpers with #[cfg(test)].",
        &sources,
        check_dead_code_allows,
    ));
    failures.extend(report(
        "NESTED TOKIO RUNTIMES ARE NOT ALLOWED",
        "Use tokio::spawn or spawn_blocking on the existing runtime.",
        &sources,
        check_nested_runtimes,
    ));
    failures.extend(report(
        "ENV MUTATIONS REQUIRE #[serial]",
        "Tests touching std::env share process state; add #[serial] from serial_test.",
        &sources,
        check_serial_env_mutations,
    ));

    if !failures.is_empty() {
        panic!("Build failed: {}", failures.join("; "));
    }
}

fn load_sources(root: &Path) -> Vec<SourceFile> {
    let mut paths = Vec::new();
    for dir in SOURCE_DIRS {
        walk_directory(&root.join(dir), &mut paths);
    }

    let mut sources = Vec::new();
    for path in paths {
        println!("cargo:rerun-if-changed={}", path.display());
        let rel_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        match std::fs::read_to_string(&path) {
            Ok(content) => sources.push(SourceFile { rel_path, content }),
            Err(e) => println!(
                "cargo:warning=Could not read file {}: {}",
                rel_path.display(),
                e
            ),
        }
    }
    sources
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_directory(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

/// Prints every finding of `check` and returns a summary if there were any.
fn report(
    title: &str,
    advice: &str,
    sources: &[SourceFile],
    check: fn(&str) -> Vec<Finding>,
) -> Option<String> {
    let findings: Vec<(&Path, Finding)> = sources
        .iter()
        .flat_map(|file| {
            check(&file.content)
                .into_iter()
                .map(move |finding| (file.rel_path.as_path(), finding))
        })
        .collect();
    if findings.is_empty() {
        return None;
    }

    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    for (path, (line, message)) in &findings {
        eprintln!("  {}:{}", path.display(), line);
        eprintln!("    {}", message);
    }
    eprintln!("\n{}\n", advice);
    Some(format!("{} ({} occurrence(s))", title, findings.len()))
}

fn check_line_limit(content: &str) -> Vec<Finding> {
    let count = content.lines().filter(|line| !line.trim().is_empty()).count();
    if count > MAX_LINES {
        vec![(
            1,
            format!("{} non-empty lines (max {})", count, MAX_LINES),
        )]
    } else {
        Vec::new()
    }
}

fn check_dead_code_allows(content: &str) -> Vec<Finding> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
        })
        .map(|(i, line)| (i + 1, line.trim().to_string()))
        .collect()
}

/// Flags `thread::spawn` calls that build a runtime within the next 20 lines.
fn check_nested_runtimes(content: &str) -> Vec<Finding> {
    let lines: Vec<&str> = content.lines().collect();
    let mut findings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("//") || !trimmed.contains("thread::spawn(") {
            continue;
        }
        let end = (i + 20).min(lines.len());
        let window = lines.get(i..end).unwrap_or_default().join("\n");
        if window.contains("Runtime::new()") || window.contains("runtime::Builder") {
            findings.push((i + 1, trimmed.to_string()));
        }
    }
    findings
}

/// Flags test functions calling `env::set_var`/`env::remove_var` without `#[serial]`.
fn check_serial_env_mutations(content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut has_serial = false;
    let mut current_test: Option<(usize, String)> = None;
    let mut brace_depth = 0i32;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if current_test.is_none() {
            if trimmed == "#[serial]" || trimmed == "#[serial_test::serial]" {
                has_serial = true;
            }
            if trimmed.contains("fn ") && (has_serial || trimmed.contains("fn test_")) {
                let name = trimmed
                    .split("fn ")
                    .nth(1)
                    .and_then(|rest| rest.split('(').next())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                current_test = Some((i + 1, name));
                brace_depth = 0;
            }
        }

        let Some((start, name)) = current_test.as_ref() else {
            continue;
        };
        if !has_serial
            && !trimmed.starts_with("//")
            && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"))
        {
            findings.push((*start, format!("test `{}` mutates env without #[serial]", name)));
        }

        brace_depth += line.matches('{').count() as i32;
        brace_depth -= line.matches('}').count() as i32;
        if brace_depth <= 0 && line.contains('}') {
            current_test = None;
            has_serial = false;
        }
    }
    findings
}
