//! `wildlog` - CLI for the wildlife sighting logbook
//!
//! Each invocation loads the logbook, performs one command and exits.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use wildlog::cli::{
    AddCommand, ChartCommand, Cli, Command, ConfigCommand, EditCommand, GalleryCommand,
    ImportCommand, ListCommand, OutputFormat, SpeciesCommand,
};
use wildlog::codec::{self, InvalidDatePolicy};
use wildlog::storage::SqliteSlot;
use wildlog::views::{
    distinct_species, monthly_aggregate, ListQuery, SortDirection, SpeciesOrder,
};
use wildlog::{
    init_logging, Config, Observation, ObservationDraft, ObservationStore, Storage, StoreOptions,
};

type Store<'a> = ObservationStore<SqliteSlot<'a>>;

/// Widest notes column in table output.
const NOTES_WIDTH: usize = 40;

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // Validation reports a broken file instead of failing to start.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        handle_validate(file.clone().or_else(|| cli.config.clone()));
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, &config_cmd),
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        command => {
            let storage = Storage::open(config.database_path())?;
            let mut store = open_store(&config, &storage)?;
            dispatch(&config, &mut store, command)
        }
    }
}

fn open_store<'a>(config: &Config, storage: &'a Storage) -> Result<Store<'a>> {
    let slot = storage.slot(config.storage.slot_key.as_str());
    let store = ObservationStore::load(slot, StoreOptions::from(config))
        .context("failed to load the observation log")?;

    if config.storage.persist_undo {
        Ok(store.with_undo_slot(storage.slot(config.undo_slot_key()))?)
    } else {
        Ok(store)
    }
}

fn dispatch(config: &Config, store: &mut Store<'_>, command: Command) -> Result<()> {
    match command {
        Command::List(cmd) => handle_list(store, &cmd),
        Command::Show(cmd) => handle_show(store, &cmd.id, cmd.json),
        Command::Add(cmd) => handle_add(store, cmd),
        Command::Edit(cmd) => handle_edit(store, cmd),
        Command::Delete { id } => handle_delete(store, &id),
        Command::Undo => handle_undo(store),
        Command::Species(cmd) => handle_species(store, &cmd),
        Command::Gallery(cmd) => handle_gallery(store, &cmd),
        Command::Chart(cmd) => handle_chart(store, &cmd),
        Command::Export(cmd) => handle_export(config, store, cmd.file),
        Command::Import(cmd) => handle_import(config, store, &cmd),
        // Handled before the store is opened.
        Command::Status(_) | Command::Config(_) => Ok(()),
    }
}

fn handle_list(store: &Store<'_>, cmd: &ListCommand) -> Result<()> {
    let query = ListQuery {
        species: cmd.species.clone(),
        text: cmd.query.clone().unwrap_or_default(),
        sort: cmd.sort.map(|field| {
            let direction = cmd.direction.map_or(SortDirection::default(), Into::into);
            (field.into(), direction)
        }),
        photos_only: false,
    };
    print_observations(&query.apply(store.observations()), cmd.format)
}

fn handle_show(store: &Store<'_>, id: &str, json: bool) -> Result<()> {
    let Some(obs) = store.get(id) else {
        bail!("no observation with id {id}");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(obs)?);
        return Ok(());
    }

    println!("{}", obs.species);
    println!("{}", "-".repeat(obs.species.chars().count()));
    println!("Id:        {}", obs.id);
    println!("Date:      {}", obs.date.format("%B %-d, %Y"));
    println!("Location:  {}", obs.location);
    if let Some((lat, lon)) = obs.coordinates() {
        println!("Map:       https://www.openstreetmap.org/?mlat={lat}&mlon={lon}");
    }
    println!(
        "Notes:     {}",
        if obs.notes.is_empty() {
            "(none)"
        } else {
            obs.notes.as_str()
        }
    );
    match &obs.photo {
        Some(photo) => println!("Photo:     attached ({} bytes)", photo.len()),
        None => println!("Photo:     (none)"),
    }
    println!("Recorded:  {}", obs.timestamp);
    Ok(())
}

fn handle_add(store: &mut Store<'_>, cmd: AddCommand) -> Result<()> {
    let draft = ObservationDraft {
        species: cmd.species,
        location: cmd.location,
        date: cmd.date,
        notes: cmd.notes,
        photo: cmd.photo,
    };
    let observation = draft.into_observation()?;
    let (id, species) = (observation.id.clone(), observation.species.clone());

    store.add(observation)?;
    println!("Observation added: {species} sighting has been recorded ({id}).");
    Ok(())
}

fn handle_edit(store: &mut Store<'_>, cmd: EditCommand) -> Result<()> {
    let Some(existing) = store.get(&cmd.id).cloned() else {
        bail!("no observation with id {}", cmd.id);
    };

    let mut draft = ObservationDraft::from_observation(&existing);
    if let Some(species) = cmd.species {
        draft.species = species;
    }
    if let Some(location) = cmd.location {
        draft.location = location;
    }
    if cmd.date.is_some() {
        draft.date = cmd.date;
    }
    if cmd.notes.is_some() {
        draft.notes = cmd.notes;
    }
    if cmd.photo.is_some() {
        draft.photo = cmd.photo;
    }

    let updated = draft.apply_to(&existing)?;
    let species = updated.species.clone();
    store.update(updated)?;
    println!("Observation updated: {species} sighting has been updated.");
    Ok(())
}

fn handle_delete(store: &mut Store<'_>, id: &str) -> Result<()> {
    let Some(species) = store.get(id).map(|o| o.species.clone()) else {
        println!("No observation with id {id}; nothing deleted.");
        return Ok(());
    };

    store.delete(id)?;
    println!("Observation deleted: {species} sighting has been removed.");
    println!("Run `wildlog undo` to restore it.");
    Ok(())
}

fn handle_undo(store: &mut Store<'_>) -> Result<()> {
    let Some(species) = store.undo_candidate().map(|o| o.species.clone()) else {
        println!("Nothing to undo.");
        return Ok(());
    };

    store.undo_last_delete()?;
    println!("Observation recovered: {species} sighting has been restored.");
    Ok(())
}

fn handle_species(store: &Store<'_>, cmd: &SpeciesCommand) -> Result<()> {
    let order = if cmd.sorted {
        SpeciesOrder::Sorted
    } else {
        SpeciesOrder::FirstSeen
    };
    let species = distinct_species(store.observations(), order);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&species)?);
    } else {
        for name in &species {
            println!("{name}");
        }
    }
    Ok(())
}

fn handle_gallery(store: &Store<'_>, cmd: &GalleryCommand) -> Result<()> {
    let query = ListQuery {
        species: cmd.species.clone(),
        text: cmd.query.clone().unwrap_or_default(),
        sort: None,
        photos_only: true,
    };
    let matches = query.apply(store.observations());
    if matches.is_empty() && cmd.format != OutputFormat::Json {
        println!("No photos yet. Add a photo when recording an observation.");
        return Ok(());
    }
    print_observations(&matches, cmd.format)
}

fn handle_chart(store: &Store<'_>, cmd: &ChartCommand) -> Result<()> {
    let aggregate = monthly_aggregate(store.observations());

    if cmd.json {
        if cmd.total {
            let totals: Vec<serde_json::Value> = aggregate
                .months
                .iter()
                .map(|bucket| serde_json::json!({ "name": bucket.name, "total": bucket.total }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&totals)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&aggregate)?);
        }
        return Ok(());
    }

    let columns: Vec<&str> = if cmd.total {
        Vec::new()
    } else {
        aggregate.species.iter().map(String::as_str).collect()
    };
    let widths: Vec<usize> = columns.iter().map(|c| c.chars().count().max(3)).collect();

    let mut header = format!("{:<5}", "Month");
    for (name, width) in columns.iter().zip(widths.iter().copied()) {
        header.push_str(&format!("  {name:>width$}"));
    }
    header.push_str(&format!("  {:>5}", "Total"));
    println!("{header}");
    println!("{}", "-".repeat(header.chars().count()));

    for bucket in &aggregate.months {
        let mut row = format!("{:<5}", bucket.name);
        for (name, width) in columns.iter().zip(widths.iter().copied()) {
            row.push_str(&format!("  {:>width$}", bucket.count(name)));
        }
        row.push_str(&format!("  {:>5}", bucket.total));
        println!("{row}");
    }
    println!("{}", "-".repeat(header.chars().count()));
    println!("Total sightings: {}", aggregate.grand_total());
    Ok(())
}

fn handle_export(config: &Config, store: &Store<'_>, file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| PathBuf::from(&config.export.default_filename));
    codec::export_to_file(store.observations(), &path)?;
    println!(
        "Exported {} observations to {}",
        store.len(),
        path.display()
    );
    Ok(())
}

fn handle_import(config: &Config, store: &mut Store<'_>, cmd: &ImportCommand) -> Result<()> {
    let policy = if cmd.skip_invalid_dates {
        InvalidDatePolicy::Skip
    } else {
        config.import.invalid_dates
    };

    let batch = codec::import_from_file(&cmd.file, policy)
        .with_context(|| format!("Import failed for {}", cmd.file.display()))?;
    let imported = batch.len();
    store.merge(batch)?;
    println!(
        "Import successful: imported {imported} observations ({} total).",
        store.len()
    );
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let storage = Storage::open(config.database_path())?;
    let stats = storage.stats()?;
    let observations = match storage.get(&config.storage.slot_key)? {
        Some(blob) if !blob.trim().is_empty() => {
            serde_json::from_str::<Vec<serde_json::Value>>(&blob).map_or(0, |list| list.len())
        }
        _ => 0,
    };
    let undo_pending = storage.get(&config.undo_slot_key())?.is_some();

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "slot_key": config.storage.slot_key,
            "observations": observations,
            "undo_pending": undo_pending,
            "slot_count": stats.slot_count,
            "stored_bytes": stats.stored_bytes,
            "last_write": stats.last_write,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("wildlog status");
        println!("--------------");
        println!("Database:      {}", storage.path().display());
        println!("Slot:          {}", config.storage.slot_key);
        println!("Observations:  {observations}");
        println!("Undo pending:  {}", if undo_pending { "yes" } else { "no" });
        println!("Stored bytes:  {}", stats.stored_bytes);
        println!("Database size: {} bytes", stats.db_size_bytes);
        match stats.last_write {
            Some(at) => println!("Last write:    {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("Last write:    never"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Slot key:           {}", config.storage.slot_key);
                println!("  Persist undo:       {}", config.storage.persist_undo);
                println!();
                println!("[Import]");
                println!("  Invalid dates:      {}", config.import.invalid_dates);
                println!();
                println!("[Export]");
                println!("  Default filename:   {}", config.export.default_filename);
                println!();
                println!("[Sample]");
                println!("  Seed when empty:    {}", config.sample.seed_when_empty);
                println!("  Year:               {}", config.sample.year);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { .. } => {}
    }
    Ok(())
}

fn handle_validate(file: Option<PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}

fn print_observations(observations: &[&Observation], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(observations)?);
        return Ok(());
    }

    if observations.is_empty() {
        println!("No observations found. Try adjusting your search or filters.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(observations),
        _ => print_cards(observations),
    }
    Ok(())
}

fn print_cards(observations: &[&Observation]) {
    for (i, obs) in observations.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let photo = if obs.has_photo() { "  [photo]" } else { "" };
        println!("{}  {}{photo}", obs.species, obs.date.format("%b %-d, %Y"));
        println!("  {}", obs.location);
        if !obs.notes.is_empty() {
            println!("  {}", obs.notes);
        }
        println!("  id: {}", obs.id);
    }
}

fn print_table(observations: &[&Observation]) {
    let species_w = column_width(observations.iter().map(|o| o.species.as_str()), "Species");
    let location_w = column_width(observations.iter().map(|o| o.location.as_str()), "Location");

    let header = format!(
        "{:<10}  {:<species_w$}  {:<location_w$}  {}",
        "Date", "Species", "Location", "Notes"
    );
    println!("{header}");
    println!("{}", "-".repeat(header.chars().count() + NOTES_WIDTH - "Notes".len()));

    for obs in observations {
        println!(
            "{:<10}  {:<species_w$}  {:<location_w$}  {}",
            obs.date.format("%Y-%m-%d").to_string(),
            obs.species,
            obs.location,
            truncate(&obs.notes, NOTES_WIDTH)
        );
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, title: &str) -> usize {
    values
        .map(|v| v.chars().count())
        .max()
        .unwrap_or(0)
        .max(title.len())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
