use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use url::Url;

use obr_repo_index::bundle::BundleInfo;
use obr_repo_index::config::Config;
use obr_repo_index::fetch::Fetcher;
use obr_repo_index::model::{Requirement, Resource};
use obr_repo_index::repoxml::{writer, Repository};

#[derive(Parser)]
#[command(name = "obr-repo-index")]
#[command(about = "OSGi Bundle Repository indexing and query tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a repository document from bundle JARs
    Index {
        /// Bundle JAR files to index
        #[arg(required = true)]
        jars: Vec<PathBuf>,

        /// Output repository document
        #[arg(short, long, default_value = "repository.xml")]
        output: PathBuf,

        /// Repository display name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List resources from configured repositories
    List {
        /// Query a single repository URL instead of the configuration
        #[arg(short, long)]
        url: Option<String>,

        /// Configuration file
        #[arg(short, long, default_value = "obr-repos.toml")]
        config: PathBuf,

        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },

    /// Show full details for resources matching a symbolic name
    Info {
        /// Symbolic name to look up
        name: String,

        /// Query a single repository URL instead of the configuration
        #[arg(short, long)]
        url: Option<String>,

        /// Configuration file
        #[arg(short, long, default_value = "obr-repos.toml")]
        config: PathBuf,

        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },

    /// List resources advertising a capability that satisfies a filter
    Check {
        /// Capability namespace (package, bundle, service, fragment, ee)
        #[arg(short, long)]
        namespace: String,

        /// LDAP-style filter expression
        #[arg(short, long)]
        filter: String,

        /// Query a single repository URL instead of the configuration
        #[arg(short, long)]
        url: Option<String>,

        /// Configuration file
        #[arg(short, long, default_value = "obr-repos.toml")]
        config: PathBuf,

        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },

    /// Generate example configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "obr-repos.toml")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index { jars, output, name } => {
            let _span =
                tracing::info_span!("index", output = %output.display(), bundles = jars.len())
                    .entered();
            index(&jars, &output, name.as_deref())?;
        }

        Commands::List { url, config, json } => {
            let _span = tracing::info_span!("list").entered();
            let repositories = load_repositories(url.as_deref(), &config)?;
            let resources: Vec<&Resource> = repositories
                .iter()
                .flat_map(|repository| repository.resources())
                .collect();
            info!(count = resources.len(), "Retrieved resource list");

            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else if resources.is_empty() {
                println!("No resources found.");
            } else {
                println!("{:<55} {}", "Resource", "Name");
                println!("{}", "-".repeat(75));
                for resource in resources {
                    println!(
                        "{:<55} {}",
                        resource.id(),
                        resource.presentation_name().unwrap_or("")
                    );
                }
            }
        }

        Commands::Info {
            name,
            url,
            config,
            json,
        } => {
            let _span = tracing::info_span!("info", name = %name).entered();
            let repositories = load_repositories(url.as_deref(), &config)?;
            let matches: Vec<&Resource> = repositories
                .iter()
                .flat_map(|repository| repository.resources())
                .filter(|resource| resource.symbolic_name() == name)
                .collect();
            info!(count = matches.len(), "Retrieved resource details");

            if json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else if matches.is_empty() {
                println!("No resources named '{}'.", name);
            } else {
                for resource in matches {
                    print_resource(resource);
                }
            }
        }

        Commands::Check {
            namespace,
            filter,
            url,
            config,
            json,
        } => {
            let _span =
                tracing::info_span!("check", namespace = %namespace, filter = %filter).entered();
            let repositories = load_repositories(url.as_deref(), &config)?;
            let mut requirement = Requirement::new(namespace.clone(), filter);
            let mut satisfied: Vec<&Resource> = Vec::new();
            for repository in &repositories {
                for resource in repository.resources() {
                    let matched = resource
                        .capabilities()
                        .iter()
                        .filter(|capability| capability.name() == namespace)
                        .try_fold(false, |found, capability| {
                            requirement
                                .is_satisfied(capability)
                                .map(|matches| found || matches)
                        })
                        .with_context(|| format!("evaluating filter against {}", resource.id()))?;
                    if matched {
                        satisfied.push(resource);
                    }
                }
            }
            info!(count = satisfied.len(), "Capability check completed");

            if json {
                println!("{}", serde_json::to_string_pretty(&satisfied)?);
            } else if satisfied.is_empty() {
                println!("No resources satisfy the requirement.");
            } else {
                for resource in satisfied {
                    println!("{}", resource.id());
                }
            }
        }

        Commands::Init { output } => {
            let _span = tracing::info_span!("init", output = %output.display()).entered();
            info!("Generating example configuration");

            Config::example().to_file(&output)?;

            println!("Created example configuration: {}", output.display());
            println!("\nEdit this file to configure your repositories, then run:");
            println!("  obr-repo-index list --config {}", output.display());
        }
    }

    Ok(())
}

fn index(jars: &[PathBuf], output: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let directory = match output.parent() {
        Some(parent) if parent != Path::new("") => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let directory = directory
        .canonicalize()
        .with_context(|| format!("resolving output directory of {}", output.display()))?;
    let file_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .context("output path has no file name")?;
    let base = Url::from_directory_path(&directory)
        .ok()
        .and_then(|directory_url| directory_url.join(file_name).ok())
        .context("output path is not representable as a URL")?;

    let mut repository = Repository::new(base.clone());
    if let Some(name) = name {
        repository.set_name(name);
    }
    for jar in jars {
        let resource = BundleInfo::from_jar(jar)
            .and_then(BundleInfo::build)
            .with_context(|| format!("indexing {}", jar.display()))?;
        info!(id = %resource.id(), "Indexed bundle");
        if !repository.add_resource(resource) {
            warn!(jar = %jar.display(), "duplicate resource identity, keeping first");
        }
    }

    let xml = writer::write_repository(&repository, Some(&base))?;
    std::fs::write(output, xml).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Wrote {} ({} resources)",
        output.display(),
        repository.resources().len()
    );
    Ok(())
}

/// The repositories a query command runs against: the single `--url` one, or
/// every enabled entry of the configuration file.
fn load_repositories(url: Option<&str>, config_path: &Path) -> anyhow::Result<Vec<Repository>> {
    let fetcher = Fetcher::new()?;
    let mut repositories = Vec::new();
    match url {
        Some(url) => {
            let mut repository = Repository::new(parse_location(url)?);
            if !repository.refresh(&fetcher) {
                let reason = repository
                    .last_error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string());
                anyhow::bail!("failed to load repository {}: {}", url, reason);
            }
            repositories.push(repository);
        }
        None => {
            let config = Config::from_file(config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            for entry in config.enabled() {
                let mut repository = Repository::new(parse_location(&entry.url)?);
                repository.set_name(entry.name.clone());
                if repository.refresh(&fetcher) {
                    repositories.push(repository);
                } else {
                    warn!(repository = %entry.name, "skipping repository that failed to load");
                }
            }
        }
    }
    Ok(repositories)
}

/// A repository location: a URL, or a bare filesystem path.
fn parse_location(text: &str) -> anyhow::Result<Url> {
    if let Ok(url) = Url::parse(text) {
        return Ok(url);
    }
    let path = Path::new(text)
        .canonicalize()
        .with_context(|| format!("resolving path {}", text))?;
    Url::from_file_path(&path)
        .map_err(|_| anyhow::anyhow!("path is not representable as a URL: {}", path.display()))
}

fn print_resource(resource: &Resource) {
    println!("\nResource: {}", resource.id());
    if let Some(name) = resource.presentation_name() {
        println!("  Name: {}", name);
    }
    if let Some(url) = resource.url() {
        println!("  URL: {}", url);
    }
    if let Some(size) = resource.size() {
        println!("  Size: {}", size);
    }
    if !resource.categories().is_empty() {
        println!("  Categories: {}", resource.categories().join(", "));
    }
    for (key, value) in resource.properties() {
        println!("  {}: {}", key, value);
    }
    if !resource.capabilities().is_empty() {
        println!("  Capabilities:");
        for capability in resource.capabilities() {
            println!("    {}", capability.name());
            for (key, values) in capability.properties() {
                for value in values {
                    println!("      {} = {}", key, value);
                }
            }
        }
    }
    if !resource.requirements().is_empty() {
        println!("  Requirements:");
        for requirement in resource.requirements() {
            let mut flags = Vec::new();
            if requirement.is_optional() {
                flags.push("optional");
            }
            if requirement.is_multiple() {
                flags.push("multiple");
            }
            if requirement.is_extend() {
                flags.push("extend");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!(
                "    {}{}: {}",
                requirement.name(),
                flags,
                requirement.filter()
            );
            if let Some(comment) = requirement.comment() {
                println!("      {}", comment);
            }
        }
    }
}
