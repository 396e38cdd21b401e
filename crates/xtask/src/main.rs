use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Allowed internal dependencies per workspace crate.
const LAYERS: &[(&str, &[&str])] = &[
    ("persona-domain", &[]),
    ("persona-shared", &["persona-domain"]),
    ("persona-client", &["persona-domain", "persona-shared"]),
    ("xtask", &[]),
];

/// Crates the domain layer must not reach for; it stays free of I/O.
const DOMAIN_FORBIDDEN: &[&str] = &["tokio", "reqwest", "tokio_tungstenite", "tracing_subscriber"];

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("arch-check") => arch_check(),
        Some(cmd) => anyhow::bail!("Unknown xtask command: {cmd}"),
        None => anyhow::bail!("Usage: cargo xtask <command>\n\nCommands:\n  arch-check"),
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<MetadataPackage>,
}

#[derive(Debug, Deserialize)]
struct MetadataPackage {
    name: String,
    manifest_path: PathBuf,
    dependencies: Vec<MetadataDependency>,
}

#[derive(Debug, Deserialize)]
struct MetadataDependency {
    name: String,
    kind: Option<String>,
    path: Option<PathBuf>,
}

fn arch_check() -> anyhow::Result<()> {
    let output = std::process::Command::new("cargo")
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .output()
        .context("running cargo metadata")?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed")
    }

    let metadata: Metadata =
        serde_json::from_slice(&output.stdout).context("parsing cargo metadata output")?;

    let mut violations = check_layers(&metadata);

    if let Some(domain) = metadata.packages.iter().find(|p| p.name == "persona-domain") {
        let src = domain
            .manifest_path
            .parent()
            .map(|dir| dir.join("src"))
            .context("domain manifest has no parent directory")?;
        violations.extend(check_domain_imports(&src)?);
    }

    if violations.is_empty() {
        println!("arch-check: ok ({} crates)", metadata.packages.len());
        return Ok(());
    }

    for violation in &violations {
        eprintln!("arch-check: {violation}");
    }
    anyhow::bail!("{} architecture violation(s)", violations.len())
}

fn check_layers(metadata: &Metadata) -> Vec<String> {
    let rules: BTreeMap<&str, BTreeSet<&str>> = LAYERS
        .iter()
        .map(|(name, allowed)| (*name, allowed.iter().copied().collect()))
        .collect();

    let mut violations = Vec::new();
    for package in &metadata.packages {
        let Some(allowed) = rules.get(package.name.as_str()) else {
            violations.push(format!("{} is not assigned to a layer", package.name));
            continue;
        };

        for dep in &package.dependencies {
            // Dev-dependencies may cross layers (test helpers).
            if dep.path.is_none() || dep.kind.as_deref() == Some("dev") {
                continue;
            }
            if !allowed.contains(dep.name.as_str()) {
                violations.push(format!("{} must not depend on {}", package.name, dep.name));
            }
        }
    }
    violations
}

fn check_domain_imports(src: &Path) -> anyhow::Result<Vec<String>> {
    let pattern = format!(r"\b({})::", DOMAIN_FORBIDDEN.join("|"));
    let re = regex_lite::Regex::new(&pattern).context("building import pattern")?;

    let mut violations = Vec::new();
    for file in rust_files(src)? {
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        for (line_no, line) in text.lines().enumerate() {
            if let Some(found) = re.captures(line).and_then(|c| c.get(1)) {
                violations.push(format!(
                    "{}:{}: domain uses {}",
                    file.display(),
                    line_no + 1,
                    found.as_str()
                ));
            }
        }
    }
    Ok(violations)
}

fn rust_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            files.extend(rust_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    Ok(files)
}
