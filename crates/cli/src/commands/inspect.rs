// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `harbor inspect` - show the write-ahead log persisted in a store

use crate::output::{self, OutputFormat};
use anyhow::Result;
use clap::Args;
use harbor_core::clock::format_ms;
use harbor_core::config::HarborConfig;
use harbor_core::wal::{BlobStore, Priority, Stored, WalStats, WalStatus};
use harbor_storage::FileBlobStore;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectArgs {
    /// Directory of the blob store
    #[arg(long)]
    pub store: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct EntryRow {
    pub id: String,
    pub operation: String,
    pub priority: Priority,
    pub status: WalStatus,
    pub attempts: u32,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub namespace: String,
    pub documents: Vec<String>,
    pub stats: WalStats,
    pub entries: Vec<EntryRow>,
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "namespace {} ({} documents)",
            self.namespace,
            self.documents.len()
        )?;
        writeln!(
            f,
            "{} entries: {} pending, {} processing, {} committed, {} retrying, {} rejected; {} results; next sequence {}",
            self.stats.total(),
            self.stats.pending,
            self.stats.processing,
            self.stats.committed,
            self.stats.retrying,
            self.stats.rejected,
            self.stats.results,
            self.stats.next_sequence
        )?;
        if self.entries.is_empty() {
            return writeln!(f, "No entries");
        }
        writeln!(
            f,
            "{:<16} {:<10} {:<9} {:<11} {:>8}  CREATED",
            "ID", "OPERATION", "PRIORITY", "STATUS", "ATTEMPTS"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "{:<16} {:<10} {:<9} {:<11} {:>8}  {}",
                clip(&e.id, 16),
                clip(&e.operation, 10),
                e.priority.to_string(),
                e.status.to_string(),
                e.attempts,
                e.created_at
            )?;
            if let Some(error) = &e.error {
                writeln!(f, "  error: {}", error)?;
            }
        }
        Ok(())
    }
}

fn clip(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

pub async fn inspect(args: InspectArgs, config: &HarborConfig, format: OutputFormat) -> Result<()> {
    if !args.store.is_dir() {
        anyhow::bail!("no blob store at {}", args.store.display());
    }
    let store = FileBlobStore::open(&args.store)?;
    let namespace = config.wal.namespace.clone();

    let entries = store.get(&format!("{}:entries", namespace)).await?;
    let results = store.get(&format!("{}:results", namespace)).await?;
    let sequence = store.get(&format!("{}:sequence", namespace)).await?;
    let stored = Stored::parse(entries, results, sequence);

    let rows = stored
        .entries
        .iter()
        .map(|e| EntryRow {
            id: e.id.clone(),
            operation: e.operation.name().to_string(),
            priority: e.priority,
            status: e.status,
            attempts: e.attempts,
            created_at: format_ms(e.created_at_ms),
            error: e.error.clone(),
        })
        .collect();
    let report = InspectReport {
        documents: store.keys()?,
        stats: stored.stats(config.wal.max_attempts),
        entries: rows,
        namespace,
    };

    output::print(&report, format);
    Ok(())
}
