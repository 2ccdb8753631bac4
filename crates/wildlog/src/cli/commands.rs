//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::observation::parse_date;
use crate::views::{SortDirection, SortField};

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Case-insensitive text matched against species, location and notes
    pub query: Option<String>,

    /// Only show this species (exact match)
    #[arg(short, long)]
    pub species: Option<String>,

    /// Sort by this column
    #[arg(long, value_enum)]
    pub sort: Option<SortFieldArg>,

    /// Sort direction (defaults to descending)
    #[arg(short, long, value_enum, requires = "sort")]
    pub direction: Option<SortDirectionArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Observation id
    pub id: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Species name
    #[arg(short, long)]
    pub species: String,

    /// Place name, optionally followed by "lat, lon"
    #[arg(short, long)]
    pub location: String,

    /// Observation date (YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_date_arg)]
    pub date: Option<NaiveDate>,

    /// Free-text notes
    #[arg(short, long)]
    pub notes: Option<String>,

    /// Photo as an image data URI
    #[arg(short, long)]
    pub photo: Option<String>,
}

/// Edit command arguments. Omitted fields keep their current value.
#[derive(Debug, Args)]
pub struct EditCommand {
    /// Observation id
    pub id: String,

    /// New species name
    #[arg(short, long)]
    pub species: Option<String>,

    /// New location
    #[arg(short, long)]
    pub location: Option<String>,

    /// New observation date (YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_date_arg)]
    pub date: Option<NaiveDate>,

    /// New notes
    #[arg(short, long)]
    pub notes: Option<String>,

    /// New photo as an image data URI; an empty value removes the photo
    #[arg(short, long)]
    pub photo: Option<String>,
}

/// Species command arguments.
#[derive(Debug, Args)]
pub struct SpeciesCommand {
    /// List species alphabetically instead of in first-seen order
    #[arg(long)]
    pub sorted: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Gallery command arguments.
#[derive(Debug, Args)]
pub struct GalleryCommand {
    /// Case-insensitive text matched against species, location and notes
    pub query: Option<String>,

    /// Only show this species (exact match)
    #[arg(short, long)]
    pub species: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Chart command arguments.
#[derive(Debug, Args)]
pub struct ChartCommand {
    /// Show one total per month instead of per-species counts
    #[arg(short, long)]
    pub total: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Destination file (defaults to the configured export file name)
    pub file: Option<PathBuf>,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// JSON file holding an array of observations
    pub file: PathBuf,

    /// Drop records with unreadable dates instead of rejecting the file
    #[arg(long)]
    pub skip_invalid_dates: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortFieldArg {
    /// Species name
    Species,
    /// Location text
    Location,
    /// Observation date
    Date,
    /// Notes text
    Notes,
}

impl From<SortFieldArg> for SortField {
    fn from(arg: SortFieldArg) -> Self {
        match arg {
            SortFieldArg::Species => Self::Species,
            SortFieldArg::Location => Self::Location,
            SortFieldArg::Date => Self::Date,
            SortFieldArg::Notes => Self::Notes,
        }
    }
}

/// Sort direction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortDirectionArg {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl From<SortDirectionArg> for SortDirection {
    fn from(arg: SortDirectionArg) -> Self {
        match arg {
            SortDirectionArg::Asc => Self::Ascending,
            SortDirectionArg::Desc => Self::Descending,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One card per observation
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).ok_or_else(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_arg_conversion() {
        assert_eq!(SortField::from(SortFieldArg::Species), SortField::Species);
        assert_eq!(SortField::from(SortFieldArg::Location), SortField::Location);
        assert_eq!(SortField::from(SortFieldArg::Date), SortField::Date);
        assert_eq!(SortField::from(SortFieldArg::Notes), SortField::Notes);
    }

    #[test]
    fn test_sort_direction_arg_conversion() {
        assert_eq!(
            SortDirection::from(SortDirectionArg::Asc),
            SortDirection::Ascending
        );
        assert_eq!(
            SortDirection::from(SortDirectionArg::Desc),
            SortDirection::Descending
        );
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_parse_date_arg() {
        assert_eq!(
            parse_date_arg("2023-03-01"),
            Ok(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap())
        );
        assert!(parse_date_arg("March 1st").unwrap_err().contains("March 1st"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
