//! CLI module for docbase
//!
//! Subcommands for managing groups, ingesting files and webpages, removing
//! sources, and querying the index.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// docbase - multi-tenant document ingestion and retrieval
#[derive(Parser)]
#[command(name = "docbase")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Ingest files into a group
    Ingest {
        /// Group name or id
        group: String,

        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ingest webpages into a group
    IngestUrl {
        /// Group name or id
        group: String,

        /// Webpage URLs to ingest
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Remove sources from a group
    Remove {
        /// Group name or id
        group: String,

        /// Source record ids (see `group sources`)
        #[arg(required = true)]
        sources: Vec<Uuid>,
    },

    /// Query one or more groups
    Query {
        /// Query text
        text: String,

        /// Group to search (name or id); repeatable
        #[arg(short, long, required = true)]
        group: Vec<String>,

        /// How many matches to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show the format support table
    Formats,
}

#[derive(Subcommand)]
pub enum GroupCommand {
    /// Create a group
    Create {
        name: String,

        /// Free-form description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List all groups
    List,

    /// Delete a group and everything ingested into it
    Delete {
        /// Group name or id
        group: String,
    },

    /// List a group's sources with their indexing status
    Sources {
        /// Group name or id
        group: String,
    },
}
