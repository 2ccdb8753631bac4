//! Command-line interface for wildlog.
//!
//! This module provides the CLI structure for the `wildlog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, ChartCommand, ConfigCommand, EditCommand, ExportCommand, GalleryCommand,
    ImportCommand, ListCommand, OutputFormat, ShowCommand, SortDirectionArg, SortFieldArg,
    SpeciesCommand, StatusCommand,
};

use crate::logging::Verbosity;

/// wildlog - Keep a local log of wildlife sightings
///
/// Record what you saw, where and when, browse and filter the log, chart
/// sightings by month, and move the log between machines as JSON.
#[derive(Debug, Parser)]
#[command(name = "wildlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List observations, newest first
    List(ListCommand),

    /// Show one observation in full
    Show(ShowCommand),

    /// Record a new observation
    Add(AddCommand),

    /// Change an existing observation
    Edit(EditCommand),

    /// Delete an observation (can be undone)
    Delete {
        /// Observation id
        id: String,
    },

    /// Restore the most recently deleted observation
    Undo,

    /// List the distinct species in the log
    Species(SpeciesCommand),

    /// List observations that have a photo
    Gallery(GalleryCommand),

    /// Show sightings per month
    Chart(ChartCommand),

    /// Write the log to a JSON file
    Export(ExportCommand),

    /// Merge observations from a JSON file into the log
    Import(ImportCommand),

    /// Show storage status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
