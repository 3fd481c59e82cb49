// UI layer: the interactive administration menu, built with `dialoguer`.
// Every flow gathers its confirmations up front, delegates the real work to
// `api`/`sync`, and reports what happened. Destructive actions require a
// typed confirmation phrase, not just a yes/no.

use crate::api::{ApiClient, Project};
use crate::index;
use crate::sync::{
    batch_size, synchronize, FailedUnit, Record, RemoteError, SyncMode, SyncOutcome, TaskStore,
};
use anyhow::Result;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main interactive menu. Receives an `ApiClient` and runs a select loop
/// until the user chooses "Exit".
pub fn main_menu(api: ApiClient) -> Result<()> {
    loop {
        let items = vec![
            "Provision projects from index",
            "Import or update tasks",
            "Delete projects",
            "Delete tasks",
            "Exit",
        ];
        let selection = Select::new().items(&items).default(0).interact()?;
        match selection {
            0 => handle_provision(&api)?,
            1 => handle_sync(&api)?,
            2 => handle_delete_projects(&api)?,
            3 => handle_delete_tasks(&api)?,
            4 => break,
            _ => {}
        }
    }
    Ok(())
}

/// Create every project from the index that does not exist yet, then import
/// its task file. Projects already on the platform are skipped, so the flow
/// can be re-run after fixing a bad schema or data file.
fn handle_provision(api: &ApiClient) -> Result<()> {
    let (index_path, data_dir) = prompt_paths()?;
    let project_index = match index::load_project_index(&index_path) {
        Ok(i) => i,
        Err(e) => {
            println!("{:#}", e);
            return Ok(());
        }
    };
    if project_index.is_empty() {
        println!("No projects defined in the index.");
        return Ok(());
    }
    // Schema files live next to the index file.
    let schema_dir = index_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let existing = match fetch_projects(api) {
        Ok(p) => p,
        Err(e) => {
            println!("Error listing projects: {}", e);
            return Ok(());
        }
    };
    let mut existing_titles: HashSet<String> =
        existing.into_iter().map(|p| p.title).collect();

    println!(
        "{} project(s) in the index, {} on the platform.",
        project_index.len(),
        existing_titles.len()
    );

    for (title, entry) in &project_index.entries {
        if existing_titles.contains(title) {
            println!("'{}' already exists. Skipping.", title);
            continue;
        }

        let label_config = match index::load_label_config(&schema_dir, &entry.schema) {
            Ok(s) => s,
            Err(e) => {
                println!("{:#}", e);
                continue;
            }
        };
        let project = match api.create_project(title, &label_config) {
            Ok(p) => {
                println!("Created project '{}' (ID: {}).", p.title, p.id);
                p
            }
            Err(e) => {
                println!("Error creating project '{}': {}", title, e);
                continue;
            }
        };
        existing_titles.insert(title.clone());

        let Some(data_source) = &entry.data_source else {
            println!("'{}' has no data source; nothing to import.", title);
            continue;
        };
        let data_path = data_dir.join(data_source);
        let records = match index::load_records(&data_path) {
            Ok(r) => r,
            Err(e) => {
                println!("{:#}", e);
                continue;
            }
        };
        if records.is_empty() {
            println!("{} is empty; nothing to import.", data_path.display());
            continue;
        }
        println!("Importing {} task(s) into '{}'...", records.len(), title);
        run_sync(api, project.id, &records, SyncMode::Create);
    }

    println!("Done.");
    Ok(())
}

/// Pick a project from the index and push its task file, either as new
/// tasks or as positional updates to the existing ones.
fn handle_sync(api: &ApiClient) -> Result<()> {
    let (index_path, data_dir) = prompt_paths()?;
    let project_index = match index::load_project_index(&index_path) {
        Ok(i) => i,
        Err(e) => {
            println!("{:#}", e);
            return Ok(());
        }
    };
    if project_index.is_empty() {
        println!("No projects defined in the index.");
        return Ok(());
    }

    let existing = match fetch_projects(api) {
        Ok(p) => p,
        Err(e) => {
            println!("Error listing projects: {}", e);
            return Ok(());
        }
    };
    let by_title: HashMap<&str, &Project> =
        existing.iter().map(|p| (p.title.as_str(), p)).collect();

    let items: Vec<String> = project_index
        .entries
        .iter()
        .map(|(title, _)| {
            let status = if by_title.contains_key(title.as_str()) {
                "exists"
            } else {
                "missing"
            };
            format!("{} ({})", title, status)
        })
        .chain(std::iter::once("Cancel".to_string()))
        .collect();
    let selection = Select::new()
        .with_prompt("Project")
        .items(&items)
        .default(0)
        .interact()?;
    if selection == project_index.entries.len() {
        return Ok(());
    }
    let (title, entry) = &project_index.entries[selection];

    let Some(project) = by_title.get(title.as_str()) else {
        println!(
            "Project '{}' does not exist on the platform yet. Run provisioning first.",
            title
        );
        return Ok(());
    };
    let Some(data_source) = &entry.data_source else {
        println!("'{}' has no data source configured.", title);
        return Ok(());
    };

    let data_path = data_dir.join(data_source);
    let records = match index::load_records(&data_path) {
        Ok(r) => r,
        Err(e) => {
            println!("{:#}", e);
            return Ok(());
        }
    };
    if records.is_empty() {
        println!("{} is empty; nothing to do.", data_path.display());
        return Ok(());
    }

    // What is already there decides which modes make sense. The check is
    // best-effort: if it fails, creating is still possible.
    let pb = spinner("Checking existing tasks...");
    let existing_tasks = api.list_tasks(project.id);
    pb.finish_and_clear();
    let existing_tasks = match existing_tasks {
        Ok(t) => t,
        Err(e) => {
            println!("Warning: could not check existing tasks: {}", e);
            Vec::new()
        }
    };

    let mode = if existing_tasks.is_empty() {
        SyncMode::Create
    } else {
        println!(
            "This project already has {} task(s).",
            existing_tasks.len()
        );
        let items = vec![
            "Create new tasks (may duplicate data)",
            "Update existing tasks",
            "Cancel",
        ];
        match Select::new().items(&items).default(0).interact()? {
            0 => SyncMode::Create,
            1 => SyncMode::Update,
            _ => {
                println!("Operation cancelled.");
                return Ok(());
            }
        }
    };

    if mode == SyncMode::Update && existing_tasks.len() != records.len() {
        println!(
            "Warning: {} record(s) in the file but {} task(s) on the platform.",
            records.len(),
            existing_tasks.len()
        );
        println!("Updates pair records with tasks by position; a mismatch can write data to the wrong tasks.");
        if !Confirm::new()
            .with_prompt("Continue anyway?")
            .default(false)
            .interact()?
        {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    println!(
        "Processing {} task(s) in batches of {}.",
        records.len(),
        batch_size(records.len())
    );
    run_sync(api, project.id, &records, mode);
    Ok(())
}

/// Delete all projects or a single one, behind typed confirmation phrases.
fn handle_delete_projects(api: &ApiClient) -> Result<()> {
    let projects = match fetch_projects(api) {
        Ok(p) => p,
        Err(e) => {
            println!("Error listing projects: {}", e);
            return Ok(());
        }
    };
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    println!("{} project(s) on the platform.", projects.len());

    let items = vec!["Delete ALL projects", "Delete one project", "Cancel"];
    match Select::new().items(&items).default(2).interact()? {
        0 => {
            println!(
                "This will delete all {} project(s) with their tasks and annotations.",
                projects.len()
            );
            println!("This cannot be undone.");
            if !typed_confirmation("DELETE-ALL")? {
                println!("Operation cancelled.");
                return Ok(());
            }
            let mut deleted = 0;
            let mut errors = 0;
            for project in &projects {
                match api.delete_project(project.id) {
                    Ok(()) => {
                        deleted += 1;
                        println!("Deleted '{}'.", project.title);
                    }
                    Err(e) => {
                        errors += 1;
                        println!("Error deleting '{}': {}", project.title, e);
                    }
                }
            }
            println!("Deleted {} project(s), {} error(s).", deleted, errors);
        }
        1 => {
            let Some(project) = select_project(&projects)? else {
                println!("Operation cancelled.");
                return Ok(());
            };
            println!(
                "This will delete '{}' (ID: {}) and all of its data.",
                project.title, project.id
            );
            println!("This cannot be undone.");
            if !typed_confirmation("DELETE")? {
                println!("Operation cancelled.");
                return Ok(());
            }
            match api.delete_project(project.id) {
                Ok(()) => println!("Project '{}' deleted.", project.title),
                Err(e) => println!("Error deleting project: {}", e),
            }
        }
        _ => {}
    }
    Ok(())
}

/// Delete every task in a project, or a hand-picked list of task ids.
fn handle_delete_tasks(api: &ApiClient) -> Result<()> {
    let projects = match fetch_projects(api) {
        Ok(p) => p,
        Err(e) => {
            println!("Error listing projects: {}", e);
            return Ok(());
        }
    };
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    let Some(project) = select_project(&projects)? else {
        println!("Operation cancelled.");
        return Ok(());
    };

    let items = vec![
        "Delete ALL tasks in this project",
        "Delete specific tasks by ID",
        "Cancel",
    ];
    match Select::new().items(&items).default(2).interact()? {
        0 => {
            println!("This will delete every task in '{}'.", project.title);
            println!("This cannot be undone.");
            if !typed_confirmation("DELETE")? {
                println!("Operation cancelled.");
                return Ok(());
            }
            match api.delete_all_tasks(project.id) {
                Ok(()) => println!("All tasks deleted from '{}'.", project.title),
                Err(e) => println!("Error deleting tasks: {}", e),
            }
        }
        1 => {
            let input: String = Input::new()
                .with_prompt("Task IDs (comma-separated)")
                .allow_empty(true)
                .interact_text()?;
            let input = input.trim();
            if input.is_empty() {
                println!("No IDs given.");
                return Ok(());
            }
            let ids: Vec<i64> = match input
                .split(',')
                .map(|s| s.trim().parse::<i64>())
                .collect::<Result<_, _>>()
            {
                Ok(ids) => ids,
                Err(e) => {
                    println!("Invalid task ID: {}", e);
                    return Ok(());
                }
            };
            if !Confirm::new()
                .with_prompt(format!("Delete {} task(s)?", ids.len()))
                .default(false)
                .interact()?
            {
                println!("Operation cancelled.");
                return Ok(());
            }
            let mut deleted = 0;
            let mut errors = 0;
            for id in ids {
                match api.delete_task(id) {
                    Ok(()) => {
                        deleted += 1;
                        println!("Task {} deleted.", id);
                    }
                    Err(e) => {
                        errors += 1;
                        println!("Error deleting task {}: {}", id, e);
                    }
                }
            }
            println!("Deleted {} task(s), {} error(s).", deleted, errors);
        }
        _ => {}
    }
    Ok(())
}

/// Run the synchronizer with a progress bar as the progress sink and print
/// the outcome.
fn run_sync(api: &ApiClient, project_id: i64, records: &[Record], mode: SyncMode) {
    let bar = ProgressBar::new(records.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} ({percent}%)").unwrap());
    let result = synchronize(api, project_id, records, mode, |p| {
        bar.set_position(p.processed as u64);
    });
    bar.finish_and_clear();
    match result {
        Ok(outcome) => render_outcome(&outcome),
        Err(e) => println!("Synchronization failed: {}", e),
    }
}

fn render_outcome(outcome: &SyncOutcome) {
    println!(
        "Processed {} task(s), {} failed, {} skipped.",
        outcome.processed, outcome.failed, outcome.skipped
    );
    if let Some(m) = outcome.cardinality_mismatch {
        println!(
            "Note: {} record(s) were paired against {} remote task(s).",
            m.records, m.remote
        );
    }
    for failure in &outcome.failures {
        match failure.unit {
            FailedUnit::Batch(i) => println!("  Batch {}: {}", i + 1, failure.message),
            FailedUnit::Task(id) => println!("  Task {}: {}", id, failure.message),
            FailedUnit::Unmatched(i) => println!("  Record {}: {}", i + 1, failure.message),
        }
    }
}

/// Ask for the index file and data directory, with the conventional layout
/// as defaults.
fn prompt_paths() -> Result<(PathBuf, PathBuf)> {
    let index_path: String = Input::new()
        .with_prompt("Project index file")
        .default("projects/projects_index.json".into())
        .interact_text()?;
    let data_dir: String = Input::new()
        .with_prompt("Task data directory")
        .default("data".into())
        .interact_text()?;
    Ok((PathBuf::from(index_path), PathBuf::from(data_dir)))
}

/// List projects behind a spinner.
fn fetch_projects(api: &ApiClient) -> Result<Vec<Project>, RemoteError> {
    let pb = spinner("Fetching projects...");
    let projects = api.list_projects();
    pb.finish_and_clear();
    projects
}

/// Numbered project picker with a trailing Cancel item. Returns `None` on
/// cancel.
fn select_project(projects: &[Project]) -> Result<Option<&Project>> {
    let items: Vec<String> = projects
        .iter()
        .map(|p| format!("{} (ID: {})", p.title, p.id))
        .chain(std::iter::once("Cancel".to_string()))
        .collect();
    let selection = Select::new()
        .with_prompt("Project")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(projects.get(selection))
}

/// Require the operator to type an exact phrase. Anything else cancels.
fn typed_confirmation(phrase: &str) -> Result<bool> {
    let input: String = Input::new()
        .with_prompt(format!("Type {} to confirm", phrase))
        .allow_empty(true)
        .interact_text()?;
    Ok(input.trim() == phrase)
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
