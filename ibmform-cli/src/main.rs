mod manifest;
mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};

use ibmform_core::differ::{Diff, attribute_change, create_plan};
use ibmform_core::provider::Provider;
use ibmform_core::resource::{Resource, ResourceId, State, Value};
use ibmform_provider_ibm::resources::BARE_METAL_SERVER;
use ibmform_provider_ibm::{IbmProvider, ProviderConfig, config::parse_tag_list};

use manifest::{Manifest, orphan_resource, resource_schemas, with_env_tags};
use state::{DEFAULT_STATE_PATH, ResourceState, StateFile};

#[derive(Parser)]
#[command(name = "ibmform")]
#[command(about = "Declarative management of IBM Cloud VPC bare metal servers and CIS WAF rules", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

/// Provider settings; each flag falls back to its environment variable
#[derive(Args, Debug, Clone)]
struct Settings {
    /// IBM Cloud API key
    #[arg(long, global = true, env = "IC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Region of the VPC endpoint
    #[arg(long, global = true, env = "IC_REGION")]
    region: Option<String>,

    /// Resource group used when a server declares none
    #[arg(long, global = true, env = "IC_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Comma separated tags attached to every bare metal server
    #[arg(long, global = true, env = "IC_ENV_TAGS")]
    env_tags: Option<String>,

    /// Path to the state file
    #[arg(long, global = true, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,
}

impl Settings {
    /// Flags on top of `ProviderConfig::from_env`
    fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::from_env();
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key);
        }
        if let Some(region) = &self.region {
            config = config.with_region(region);
        }
        if let Some(group) = &self.resource_group {
            config = config.with_resource_group(group);
        }
        if let Some(tags) = &self.env_tags {
            config = config.with_env_tags(parse_tag_list(tags));
        }
        config
    }

    fn provider(&self) -> Result<(IbmProvider, Vec<String>), String> {
        let config = self.provider_config();
        let env_tags = config.env_tags.clone();
        let provider = IbmProvider::new(config).map_err(|e| e.to_string())?;
        Ok((provider, env_tags))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the JSON configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy all resources defined in the configuration file
    Destroy {
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Read data sources and print their attributes
    Read {
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Only read the data source with this `type.name` address
        #[arg(long)]
        only: Option<String>,
    },
    /// Stop a bare metal server, forcing a hard stop after its force_recovery_time
    Stop {
        /// Address of the server, e.g. ibm_is_bare_metal_server.web
        address: String,

        #[arg(long, default_value = "main.json")]
        file: PathBuf,
    },
    /// Adopt an existing remote object into the state file
    Import {
        /// Address of the declared resource, e.g. ibm_cis_waf_rule.sqli
        address: String,

        /// Remote identifier; WAF rules use rule_id:package_id:domain_id:cis_id
        identifier: String,

        #[arg(long, default_value = "main.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &settings).await,
        Commands::Apply { file } => run_apply(&file, &settings).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &settings, auto_approve).await
        }
        Commands::Read { file, only } => run_read(&file, &settings, only.as_deref()).await,
        Commands::Stop { address, file } => run_stop(&file, &settings, &address).await,
        Commands::Import {
            address,
            identifier,
            file,
        } => run_import(&file, &settings, &address, &identifier).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_manifest(file: &Path) -> Result<Manifest, String> {
    let manifest = Manifest::load(file)?;
    manifest.validate()?;
    Ok(manifest)
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());
    let manifest = load_manifest(file)?;

    let count = manifest.all().count();
    println!(
        "{}",
        format!("✓ {} declarations validated successfully.", count)
            .green()
            .bold()
    );
    for resource in manifest.all() {
        let kind = if resource.is_data_source() { " (data)" } else { "" };
        println!("  • {}{}", resource.id, kind);
    }
    Ok(())
}

// =============================================================================
// Plan / Apply
// =============================================================================

/// Refresh every state entry against the remote API
///
/// Entries whose remote object is gone are dropped from the state file.
/// Stored attributes the API does not echo back are kept.
async fn refresh_states(
    provider: &IbmProvider,
    state_file: &mut StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    let mut gone = Vec::new();

    for entry in &state_file.resources {
        let id = entry.id();
        let observed = provider
            .read(&id, &entry.identifier)
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;

        if !observed.exists {
            warn!("{} no longer exists remotely", id);
            gone.push(id);
            continue;
        }

        let mut merged = entry.to_state();
        merged.attributes.extend(observed.attributes);
        current.insert(id, merged);
    }

    for id in &gone {
        state_file.remove(id);
    }
    Ok(current)
}

fn format_value(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_json().to_string(),
        None => "(none)".to_string(),
    }
}

fn print_plan(plan: &[Diff]) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let (mut create, mut update, mut replace, mut destroy) = (0, 0, 0, 0);
    for diff in plan {
        match diff {
            Diff::Create(resource) => {
                create += 1;
                println!("  {} {}", "+".green().bold(), resource.id);
            }
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                update += 1;
                println!("  {} {}", "~".yellow().bold(), id);
                for key in changed_attributes {
                    if let Some((old, new)) = attribute_change(from, to, key) {
                        println!(
                            "      {}: {} → {}",
                            key,
                            format_value(old),
                            format_value(new)
                        );
                    }
                }
            }
            Diff::Replace { id, forced_by, .. } => {
                replace += 1;
                println!(
                    "  {} {} (forces replacement: {})",
                    "-/+".magenta().bold(),
                    id,
                    forced_by.join(", ")
                );
            }
            Diff::Delete(state) => {
                destroy += 1;
                println!("  {} {}", "-".red().bold(), state.id);
            }
            Diff::NoChange(_) => {}
        }
    }

    println!();
    println!(
        "Plan: {} to create, {} to update, {} to replace, {} to destroy.",
        create.to_string().green(),
        update.to_string().yellow(),
        replace.to_string().magenta(),
        destroy.to_string().red()
    );
}

/// Refresh the state file and diff it against the declared resources
async fn prepare_plan(
    file: &Path,
    provider: &IbmProvider,
    env_tags: &[String],
    state_file: &mut StateFile,
) -> Result<Vec<Diff>, String> {
    let manifest = load_manifest(file)?;
    let desired = with_env_tags(&manifest.resources, env_tags);
    let current = refresh_states(provider, state_file).await?;
    Ok(create_plan(&desired, &current, &resource_schemas()))
}

async fn run_plan(file: &Path, settings: &Settings) -> Result<(), String> {
    let (provider, env_tags) = settings.provider()?;
    let mut state_file = StateFile::load(&settings.state)?;
    let plan = prepare_plan(file, &provider, &env_tags, &mut state_file).await?;
    print_plan(&plan);
    Ok(())
}

/// Outcome of executing one planned change
enum Applied {
    Recorded(ResourceState),
    Removed(ResourceId),
}

async fn apply_diff(provider: &IbmProvider, diff: &Diff) -> Result<Applied, String> {
    let record = |state: &State, declared: &Resource| {
        ResourceState::from_state(state, &declared.attributes)
            .ok_or_else(|| format!("{} returned no identifier", declared.id))
            .map(Applied::Recorded)
    };

    match diff {
        Diff::Create(resource) => {
            let state = provider.create(resource).await.map_err(|e| e.to_string())?;
            record(&state, resource)
        }
        Diff::Update { from, to, .. } => {
            let identifier = from
                .identifier
                .as_deref()
                .ok_or_else(|| format!("{} has no identifier", to.id))?;
            let state = provider
                .update(identifier, from, to)
                .await
                .map_err(|e| e.to_string())?;
            record(&state, to)
        }
        Diff::Replace { from, to, .. } => {
            let identifier = from
                .identifier
                .as_deref()
                .ok_or_else(|| format!("{} has no identifier", to.id))?;
            provider
                .delete(to, identifier)
                .await
                .map_err(|e| e.to_string())?;
            let state = provider.create(to).await.map_err(|e| e.to_string())?;
            record(&state, to)
        }
        Diff::Delete(state) => {
            let identifier = state
                .identifier
                .as_deref()
                .ok_or_else(|| format!("{} has no identifier", state.id))?;
            let resource = orphan_resource(&state.id, state.attributes.clone());
            provider
                .delete(&resource, identifier)
                .await
                .map_err(|e| e.to_string())?;
            Ok(Applied::Removed(state.id.clone()))
        }
        Diff::NoChange(id) => Err(format!("{} has nothing to apply", id)),
    }
}

fn diff_label(diff: &Diff) -> String {
    match diff {
        Diff::Create(r) => format!("create {}", r.id),
        Diff::Update { id, .. } => format!("update {}", id),
        Diff::Replace { id, .. } => format!("replace {}", id),
        Diff::Delete(s) => format!("destroy {}", s.id),
        Diff::NoChange(id) => format!("keep {}", id),
    }
}

async fn run_apply(file: &Path, settings: &Settings) -> Result<(), String> {
    let (provider, env_tags) = settings.provider()?;
    let mut state_file = StateFile::load(&settings.state)?;
    let plan = prepare_plan(file, &provider, &env_tags, &mut state_file).await?;
    state_file.save(&settings.state)?;

    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    for diff in &plan {
        match apply_diff(&provider, diff).await {
            Ok(applied) => {
                match applied {
                    Applied::Recorded(entry) => state_file.upsert(entry),
                    Applied::Removed(id) => {
                        state_file.remove(&id);
                    }
                }
                state_file.save(&settings.state)?;
                println!("  {} {}", "✓".green(), diff_label(diff));
                success_count += 1;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), diff_label(diff), e);
                failure_count += 1;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

// =============================================================================
// Destroy
// =============================================================================

fn confirm_destroy() -> Result<bool, String> {
    println!(
        "{}",
        "Do you really want to destroy all resources?"
            .yellow()
            .bold()
    );
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_destroy(file: &Path, settings: &Settings, auto_approve: bool) -> Result<(), String> {
    let manifest = load_manifest(file)?;
    let (provider, _) = settings.provider()?;
    let mut state_file = StateFile::load(&settings.state)?;

    // Reverse declaration order: later declarations may depend on earlier ones
    let targets: Vec<(&Resource, String)> = manifest
        .resources
        .iter()
        .rev()
        .filter_map(|r| {
            state_file
                .find(&r.id)
                .map(|entry| (r, entry.identifier.clone()))
        })
        .collect();

    if targets.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for (resource, identifier) in &targets {
        println!("  {} {} ({})", "-".red().bold(), resource.id, identifier);
    }
    println!();
    println!("Plan: {} to destroy.", targets.len().to_string().red());
    println!();

    if !auto_approve && !confirm_destroy()? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;
    for (resource, identifier) in targets {
        match provider.delete(resource, &identifier).await {
            Ok(()) => {
                state_file.remove(&resource.id);
                state_file.save(&settings.state)?;
                println!("  {} destroy {}", "✓".green(), resource.id);
                success_count += 1;
            }
            Err(e) => {
                println!("  {} destroy {} - {}", "✗".red(), resource.id, e);
                failure_count += 1;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

// =============================================================================
// Read / Stop / Import
// =============================================================================

async fn run_read(file: &Path, settings: &Settings, only: Option<&str>) -> Result<(), String> {
    let manifest = load_manifest(file)?;
    let sources: Vec<&Resource> = manifest
        .data
        .iter()
        .filter(|d| only.is_none_or(|address| d.id.to_string() == address))
        .collect();
    if sources.is_empty() {
        return Err(match only {
            Some(address) => format!("No data source {} declared", address),
            None => "No data sources declared".to_string(),
        });
    }

    let (provider, _) = settings.provider()?;
    let mut output = serde_json::Map::new();
    for source in sources {
        let state = provider
            .read_data_source(source)
            .await
            .map_err(|e| e.to_string())?;
        if !state.exists {
            println!("{} {} not found", "!".yellow().bold(), source.id);
            continue;
        }
        let attributes = state
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        output.insert(source.id.to_string(), serde_json::Value::Object(attributes));
    }

    let rendered = serde_json::to_string_pretty(&serde_json::Value::Object(output))
        .map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

async fn run_stop(file: &Path, settings: &Settings, address: &str) -> Result<(), String> {
    let manifest = load_manifest(file)?;
    let resource = manifest
        .find_resource(address)
        .ok_or_else(|| format!("No resource {} declared", address))?;
    if resource.id.resource_type != BARE_METAL_SERVER {
        return Err(format!("{} is not a bare metal server", address));
    }

    let mut state_file = StateFile::load(&settings.state)?;
    let identifier = state_file
        .find(&resource.id)
        .map(|entry| entry.identifier.clone())
        .ok_or_else(|| format!("{} is not in the state file, apply it first", address))?;

    let (provider, _) = settings.provider()?;
    let state = provider
        .stop_bare_metal_server(resource, &identifier)
        .await
        .map_err(|e| e.to_string())?;
    info!("{} is {}", address, format_value(state.get("status")));

    if let Some(entry) = ResourceState::from_state(&state, &resource.attributes) {
        state_file.upsert(entry);
        state_file.save(&settings.state)?;
    }
    println!("  {} stop {}", "✓".green(), address);
    Ok(())
}

async fn run_import(
    file: &Path,
    settings: &Settings,
    address: &str,
    identifier: &str,
) -> Result<(), String> {
    let manifest = load_manifest(file)?;
    let resource = manifest
        .find_resource(address)
        .ok_or_else(|| format!("No resource {} declared", address))?;

    let mut state_file = StateFile::load(&settings.state)?;
    if let Some(entry) = state_file.find(&resource.id) {
        return Err(format!(
            "{} is already managed as {}",
            address, entry.identifier
        ));
    }

    let (provider, _) = settings.provider()?;
    let state = provider
        .read(&resource.id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!("No remote object {} found for {}", identifier, address));
    }

    let state = if state.identifier.is_some() {
        state
    } else {
        state.with_identifier(identifier)
    };
    let entry = ResourceState::from_state(&state, &resource.attributes)
        .ok_or_else(|| format!("{} returned no identifier", address))?;
    state_file.upsert(entry);
    state_file.save(&settings.state)?;
    println!("  {} import {} ({})", "✓".green(), address, identifier);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ibmform",
            "apply",
            "infra.json",
            "--region",
            "eu-de",
            "--env-tags",
            "env:prod, team:web",
        ])
        .unwrap();

        let config = cli.settings.provider_config();
        assert_eq!(config.region, "eu-de");
        assert_eq!(config.env_tags, vec!["env:prod", "team:web"]);
        assert!(matches!(cli.command, Commands::Apply { file } if file == Path::new("infra.json")));
    }

    #[test]
    fn stop_takes_an_address() {
        let cli = Cli::try_parse_from(["ibmform", "stop", "ibm_is_bare_metal_server.web"]).unwrap();
        match cli.command {
            Commands::Stop { address, file } => {
                assert_eq!(address, "ibm_is_bare_metal_server.web");
                assert_eq!(file, PathBuf::from("main.json"));
            }
            _ => panic!("Expected Stop"),
        }
        assert_eq!(cli.settings.state, PathBuf::from(DEFAULT_STATE_PATH));
    }

    #[test]
    fn import_takes_address_and_identifier() {
        let cli = Cli::try_parse_from([
            "ibmform",
            "import",
            "ibm_cis_waf_rule.sqli",
            "100000356:c5048701:zone-1:crn:v1:cis",
        ])
        .unwrap();
        match cli.command {
            Commands::Import {
                address,
                identifier,
                ..
            } => {
                assert_eq!(address, "ibm_cis_waf_rule.sqli");
                assert_eq!(identifier, "100000356:c5048701:zone-1:crn:v1:cis");
            }
            _ => panic!("Expected Import"),
        }
    }

    #[test]
    fn diff_labels() {
        let resource = Resource::new(BARE_METAL_SERVER, "web");
        assert_eq!(
            diff_label(&Diff::Create(resource)),
            "create ibm_is_bare_metal_server.web"
        );
        assert_eq!(format_value(None), "(none)");
        assert_eq!(format_value(Some(&Value::from("a"))), "\"a\"");
    }
}
