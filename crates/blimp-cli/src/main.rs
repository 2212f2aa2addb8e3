//! CLI entry point for Blimp.
//!
//! Wires the SQLite stores, the credential vault, the classifier and the
//! application handlers into a [`BlimpService`] and prints each command's
//! response as pretty JSON.

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use blimp_adapters::{Clients, default_registry};
use blimp_engine::{BlimpService, CoordinatorConfig, Repositories, ServiceConfig};
use blimp_intent::{Classifier, KeywordClassifier, LlmClassifier, LlmClassifierConfig};
use blimp_kernel::{AppCredential, AppId, CapabilityKey, NewWorkflow};
use blimp_store::{ConnectionStore, Database, ExecutionStore, TemplateStore};
use blimp_vault::{MasterKey, Vault, VaultCredentials};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::{BlimpConfig, ClassifierBackend, ClassifierConfig, LoggingConfig};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Commands::Keygen = cli.command {
        let key = MasterKey::generate().context("failed to generate vault key")?;
        println!("{}", key.to_base64());
        return Ok(());
    }

    let config = BlimpConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);
    let service = build_service(&config).await?;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Resolve {
            prompt,
            context,
            personal,
        } => {
            let mut context = parse_json_object("context", context.as_deref())?;
            if personal {
                context["personalize"] = json!(true);
            }
            print(&service.resolve_workflow(user, &prompt.join(" "), &context).await?)
        }
        Commands::Execute {
            workflow_id,
            params,
        } => {
            let params = parse_json_object("params", params.as_deref())?;
            print(&service.execute_workflow(user, &workflow_id, params).await?)
        }
        Commands::Workflows => print(&service.list_workflows(user).await?),
        Commands::Apps => print(&service.list_connected_apps(user).await?),
        Commands::Connect {
            credential,
            metadata,
        } => {
            let credential: AppCredential = serde_json::from_str(&credential)
                .context("credential must be tagged JSON with an `app` field")?;
            let metadata = parse_json_object("metadata", metadata.as_deref())?;
            let connection = service.connect_app(user, credential, metadata).await?;
            print(&json!({ "success": true, "connection": connection }))
        }
        Commands::Disconnect { app } => {
            let app: AppId = app.parse()?;
            let removed = service.disconnect_app(user, app).await?;
            print(&json!({ "success": removed, "app": app }))
        }
        Commands::Execution { execution_id } => match service.get_execution(&execution_id).await? {
            Some(record) => print(&record),
            None => bail!("execution not found: {execution_id}"),
        },
        Commands::History { limit } => print(&service.list_executions(user, limit).await?),
        Commands::Seed { file } => seed(&service, &file).await,
        Commands::Keygen => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Logs go to stderr so stdout stays valid JSON.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn build_service(config: &BlimpConfig) -> Result<BlimpService> {
    let db = Database::open_and_migrate(config.storage.db_path.clone())
        .await
        .context("failed to open database")?;
    info!(path = %config.storage.db_path.display(), "store initialized");

    let key = match config.vault.key.as_deref() {
        Some(encoded) => MasterKey::from_base64(encoded).context("invalid vault key")?,
        None => bail!(
            "no vault key configured: set BLIMP_VAULT_KEY (generate one with `blimp keygen`)"
        ),
    };
    if let Some(parent) = config.vault.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let vault = Vault::open(&config.vault.path, key).context("failed to open vault")?;
    info!(path = %config.vault.path.display(), "vault initialized");

    let repos = Repositories {
        templates: Arc::new(TemplateStore::new(db.clone())),
        credentials: Arc::new(VaultCredentials::new(vault)),
        connections: Arc::new(ConnectionStore::new(db.clone())),
        executions: Arc::new(ExecutionStore::new(db)),
    };

    let clients = Clients::http(Duration::from_secs(config.execution.http_timeout_secs))
        .context("failed to build HTTP clients")?;
    let registry = default_registry(&clients).context("failed to build capability registry")?;

    let service_config = ServiceConfig {
        resolver: config.resolver,
        execution: CoordinatorConfig {
            handler_timeout: Duration::from_secs(config.execution.handler_timeout_secs),
        },
    };
    let classifier = build_classifier(&config.classifier)?;
    BlimpService::new(classifier, Arc::new(registry), repos, service_config)
        .context("failed to start service")
}

fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>> {
    let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty());
    match (config.backend, api_key) {
        (ClassifierBackend::Keyword, _) => Ok(Arc::new(KeywordClassifier::new()?)),
        (ClassifierBackend::Llm, Some(api_key)) => {
            let mut llm =
                LlmClassifierConfig::with_provider(config.provider, api_key, config.model())
                    .with_timeout(config.timeout());
            if let Some(base_url) = &config.base_url {
                llm = llm.with_base_url(base_url);
            }
            info!(provider = ?config.provider, model = config.model(), "llm classifier ready");
            Ok(Arc::new(LlmClassifier::new(llm)?))
        }
        (ClassifierBackend::Llm, None) if config.keyword_fallback => {
            warn!("no classifier API key configured, using the keyword classifier");
            Ok(Arc::new(KeywordClassifier::new()?))
        }
        (ClassifierBackend::Llm, None) => {
            bail!("no classifier API key configured: set BLIMP_CLASSIFIER_API_KEY")
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One entry of a `blimp seed` file.
#[derive(Debug, Deserialize)]
struct SeedTemplate {
    name: String,
    #[serde(default)]
    description: String,
    required_apps: Vec<String>,
    #[serde(default)]
    category: Option<String>,
}

async fn seed(service: &BlimpService, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let entries: Vec<SeedTemplate> = serde_json::from_str(&content)
        .with_context(|| format!("{} must be a JSON array of templates", file.display()))?;

    let templates = &service.repositories().templates;
    let mut created = Vec::with_capacity(entries.len());
    for entry in entries {
        let apps = CapabilityKey::parse_list(&entry.required_apps)
            .with_context(|| format!("template `{}`", entry.name))?;
        let mut template = NewWorkflow::template(entry.name, entry.description, apps);
        if let Some(category) = entry.category {
            template = template.with_category(category.to_lowercase());
        }
        created.push(templates.create(template).await?.id);
    }
    info!(count = created.len(), "templates seeded");
    print(&json!({ "success": true, "created": created, "count": created.len() }))
}

fn parse_json_object(what: &str, raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(json!({}));
    };
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON"))?;
    if !value.is_object() {
        bail!("{what} must be a JSON object");
    }
    Ok(value)
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_arguments_must_be_objects() {
        assert_eq!(parse_json_object("params", None).unwrap(), json!({}));
        assert_eq!(
            parse_json_object("params", Some(r#"{"channel":"C1"}"#)).unwrap(),
            json!({ "channel": "C1" })
        );
        assert!(parse_json_object("params", Some("[1]")).is_err());
        assert!(parse_json_object("params", Some("{oops")).is_err());
    }

    #[test]
    fn keyword_backend_needs_no_key() {
        let config = ClassifierConfig {
            backend: ClassifierBackend::Keyword,
            ..ClassifierConfig::default()
        };
        assert_eq!(build_classifier(&config).unwrap().name(), "keyword");
    }

    #[test]
    fn llm_without_key_falls_back_or_fails() {
        let fallback = ClassifierConfig::default();
        assert_eq!(build_classifier(&fallback).unwrap().name(), "keyword");

        let strict = ClassifierConfig {
            keyword_fallback: false,
            ..ClassifierConfig::default()
        };
        assert!(build_classifier(&strict).is_err());
    }

    #[test]
    fn seed_entries_parse() {
        let entries: Vec<SeedTemplate> = serde_json::from_str(
            r#"[{
                "name": "Notion to Slack",
                "required_apps": ["notion", "slack"],
                "category": "Productivity"
            }]"#,
        )
        .unwrap();
        assert_eq!(entries[0].required_apps, vec!["notion", "slack"]);
        assert_eq!(entries[0].description, "");
    }
}
