//! Command execution: wires configuration into the engine and prints
//! human-readable results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::{meta_keys, EngineError, SourceStatus};
use crate::infrastructure::catalog::GroupManager;
use crate::infrastructure::ingestion::text::truncate_chars;
use crate::infrastructure::ingestion::{DataProcessor, HttpWebpageLoader, ParserRegistry};
use crate::infrastructure::logging;
use crate::infrastructure::services::{
    FileUpload, IngestReceipt, PipelineOptions, PipelineService,
};
use crate::infrastructure::vector_store::VectorStoreFactory;

use super::{Command, GroupCommand};

pub async fn run(command: Command) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init_logging(&config.logging);

    Engine::new(&config)?.dispatch(command).await
}

struct Engine {
    groups: Arc<GroupManager>,
    registry: Arc<ParserRegistry>,
    service: PipelineService,
}

impl Engine {
    fn new(config: &AppConfig) -> Result<Self, EngineError> {
        let groups = Arc::new(GroupManager::new(
            &config.storage.data_path,
            &config.storage.catalog_file,
        ));

        let vector_store = VectorStoreFactory::create(&config.vector_store);
        tracing::info!(backend = vector_store.backend_name(), "vector store ready");

        let registry = Arc::new(ParserRegistry::new(config.parsers.clone()));
        let processor = Arc::new(DataProcessor::new(
            Arc::clone(&registry),
            Arc::new(HttpWebpageLoader::new(config.web.clone())?),
        ));
        let service = PipelineService::new(
            Arc::clone(&groups),
            vector_store,
            processor,
            PipelineOptions {
                file_naming: config.storage.file_naming,
                max_file_size_mb: config.ingestion.max_file_size_mb,
                default_top_k: config.query.top_k,
            },
        );

        Ok(Self {
            groups,
            registry,
            service,
        })
    }

    async fn dispatch(self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Group(command) => self.group_command(command).await,
            Command::Ingest { group, files } => self.ingest(&group, files).await,
            Command::IngestUrl { group, urls } => self.ingest_url(&group, urls).await,
            Command::Remove { group, sources } => self.remove(&group, sources).await,
            Command::Query { text, group, top_k } => self.query(&text, &group, top_k).await,
            Command::Formats => {
                self.formats();
                Ok(())
            }
        }
    }

    async fn group_command(&self, command: GroupCommand) -> anyhow::Result<()> {
        match command {
            GroupCommand::Create { name, description } => {
                let group = self.groups.create_group(&name, &description).await?;
                println!("created group '{}' ({})", group.name, group.id);
            }
            GroupCommand::List => {
                let groups = self.groups.list_groups().await?;
                if groups.is_empty() {
                    println!("no groups");
                    return Ok(());
                }
                for summary in groups {
                    println!(
                        "{}  {}  {} file(s), {} webpage(s)",
                        summary.id, summary.name, summary.file_count, summary.webpage_count
                    );
                }
            }
            GroupCommand::Delete { group } => {
                let group_id = self.resolve_group(&group).await?;
                self.service.delete_group(group_id).await?;
                println!("deleted group {group_id}");
            }
            GroupCommand::Sources { group } => {
                let group_id = self.resolve_group(&group).await?;
                let sources = self.groups.list_sources(group_id).await?;
                if sources.is_empty() {
                    println!("no sources");
                    return Ok(());
                }
                for entry in sources {
                    println!(
                        "{}  {:<7}  {:<10}  {}",
                        entry.id,
                        entry.kind.as_str(),
                        entry.status.as_str(),
                        entry.name
                    );
                }
            }
        }
        Ok(())
    }

    async fn ingest(&self, group: &str, files: Vec<PathBuf>) -> anyhow::Result<()> {
        let group_id = self.resolve_group(group).await?;

        let mut uploads = Vec::with_capacity(files.len());
        for path in files {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{} has no usable file name", path.display()))?
                .to_string();
            uploads.push(FileUpload::new(file_name, bytes));
        }

        let receipt = self.service.ingest_files(group_id, uploads).await?;
        print_receipt(&receipt);
        self.wait_for_indexing(group_id, &receipt).await
    }

    async fn ingest_url(&self, group: &str, urls: Vec<String>) -> anyhow::Result<()> {
        let group_id = self.resolve_group(group).await?;

        let receipt = self.service.ingest_webpages(group_id, urls).await?;
        print_receipt(&receipt);
        self.wait_for_indexing(group_id, &receipt).await
    }

    async fn remove(&self, group: &str, sources: Vec<Uuid>) -> anyhow::Result<()> {
        let group_id = self.resolve_group(group).await?;

        let all_ok = self.service.delete_sources(group_id, &sources).await?;
        if !all_ok {
            anyhow::bail!("some sources could not be removed; see the log for details");
        }
        println!("removed {} source(s)", sources.len());
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        groups: &[String],
        top_k: Option<usize>,
    ) -> anyhow::Result<()> {
        let mut group_ids = Vec::with_capacity(groups.len());
        for reference in groups {
            group_ids.push(self.resolve_group(reference).await?);
        }

        let matches = self.service.query(text, &group_ids, top_k).await?;
        if matches.is_empty() {
            println!("no matches");
            return Ok(());
        }
        for (rank, found) in matches.iter().enumerate() {
            let source = found
                .node
                .metadata
                .get(meta_keys::FILE_NAME)
                .map(String::as_str)
                .unwrap_or("<unknown source>");
            match found.node.metadata.get(meta_keys::PAGE_LABEL) {
                Some(page) => println!("{}. [{:.2}] {source} (page {page})", rank + 1, found.score),
                None => println!("{}. [{:.2}] {source}", rank + 1, found.score),
            }
            println!("   {}", truncate_chars(&found.node.text, 200));
        }
        Ok(())
    }

    fn formats(&self) {
        println!(
            "{:<10}  {:<16}  {:<18}  {}",
            "format", "parser", "extensions", "status"
        );
        for support in self.registry.format_support() {
            let status = if support.available {
                "available".to_string()
            } else {
                support
                    .reason
                    .clone()
                    .unwrap_or_else(|| "unavailable".to_string())
            };
            println!(
                "{:<10}  {:<16}  {:<18}  {}",
                support.format.as_str(),
                support.parser_name.unwrap_or("-"),
                support.extensions.join(", "),
                status
            );
        }
    }

    /// Accepts either a group id or a unique group name.
    async fn resolve_group(&self, reference: &str) -> anyhow::Result<Uuid> {
        if let Ok(id) = reference.parse::<Uuid>() {
            return Ok(id);
        }
        let group = self
            .groups
            .find_by_name(reference)
            .await?
            .with_context(|| format!("no group named '{reference}'"))?;
        Ok(group.id)
    }

    /// Indexing runs on background tasks that would die with the process,
    /// so the command polls until every accepted record has left the
    /// `processing` state.
    async fn wait_for_indexing(
        &self,
        group_id: Uuid,
        receipt: &IngestReceipt,
    ) -> anyhow::Result<()> {
        let ids: Vec<Uuid> = receipt.accepted.iter().map(|a| a.id).collect();
        if ids.is_empty() {
            return Ok(());
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(600);
        loop {
            let sources = self.groups.list_sources(group_id).await?;
            let pending = sources
                .iter()
                .filter(|s| ids.contains(&s.id) && s.status == SourceStatus::Processing)
                .count();
            if pending == 0 {
                for entry in sources.iter().filter(|s| ids.contains(&s.id)) {
                    println!("{}  {}  {}", entry.id, entry.status.as_str(), entry.name);
                }
                return Ok(());
            }
            if std::time::Instant::now() > deadline {
                anyhow::bail!("indexing did not finish within 10 minutes");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

fn print_receipt(receipt: &IngestReceipt) {
    for accepted in &receipt.accepted {
        println!("accepted {}  {}", accepted.id, accepted.name);
    }
    for skipped in &receipt.skipped {
        println!("skipped  {}  ({})", skipped.name, skipped.reason);
    }
}
