use std::fs;
use std::path::{Path, PathBuf};

use bimsync_core::config::{parse_synchronization_config, SynchronizationConfig};
use bimsync_core::context::LinkKind;
use bimsync_core::db::Database;
use bimsync_core::sync::{EntityReport, ObjectType, SyncReport};
use bimsync_core::{BimElement, Context, DynamicField, Item, Objective, Project, User};
use serde::Serialize;

use crate::error::CliError;

/// Row counts of the local store
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: usize,
    pub projects: usize,
    pub user_projects: usize,
    pub objectives: usize,
    pub items: usize,
    pub objective_items: usize,
    pub bim_elements: usize,
    pub bim_element_objectives: usize,
    pub dynamic_fields: usize,
}

impl StoreCounts {
    pub fn of(context: &Context) -> Self {
        Self {
            users: context.count::<User>(),
            projects: context.count::<Project>(),
            user_projects: context.links(LinkKind::UserProject).len(),
            objectives: context.count::<Objective>(),
            items: context.count::<Item>(),
            objective_items: context.links(LinkKind::ObjectiveItem).len(),
            bim_elements: context.count::<BimElement>(),
            bim_element_objectives: context.links(LinkKind::BimElementObjective).len(),
            dynamic_fields: context.count::<DynamicField>(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        [
            ("users", self.users),
            ("projects", self.projects),
            ("user_projects", self.user_projects),
            ("objectives", self.objectives),
            ("items", self.items),
            ("objective_items", self.objective_items),
            ("bim_elements", self.bim_elements),
            ("bim_element_objectives", self.bim_element_objectives),
            ("dynamic_fields", self.dynamic_fields),
        ]
        .into_iter()
        .map(|(table, count)| format!("{table:<24}{count}"))
        .collect()
    }
}

pub fn resolve_db_path(db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match db_path {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("bimsync").join("bimsync.db"))
        .ok_or(CliError::NoDataDir)
}

pub async fn open_database(db_path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(Database::open(db_path).await?)
}

pub fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Config from `--config` (defaults when omitted) with `--user-id` applied.
pub fn load_config(
    config_path: Option<&Path>,
    user_id: Option<i64>,
) -> Result<SynchronizationConfig, CliError> {
    let mut config = match config_path {
        Some(path) => parse_synchronization_config(&read_file(path)?)?,
        None => SynchronizationConfig::default(),
    };
    if user_id.is_some() {
        config.user_id = user_id;
    }
    Ok(config)
}

const fn side_name(side: ObjectType) -> &'static str {
    match side {
        ObjectType::Local => "local",
        ObjectType::Synchronized => "synchronized",
        ObjectType::Remote => "remote",
    }
}

fn entity_lines(title: &str, report: &EntityReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{title}: {} added locally, {} added remotely, {} merged, {} removed locally, {} removed remotely, {} unchanged",
        report.added_locally,
        report.added_remotely,
        report.merged,
        report.removed_locally,
        report.removed_remotely,
        report.unchanged,
    )];
    for failure in &report.failures {
        let external_id = failure.external_id.as_deref().unwrap_or("-");
        lines.push(format!(
            "  failed [{}] {} ({external_id}): {}",
            side_name(failure.side),
            failure.label,
            failure.message
        ));
    }
    lines
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = entity_lines("Projects", &report.projects);
    lines.extend(entity_lines("Objectives", &report.objectives));
    if report.aborted {
        lines.push("Run aborted after the first failure".to_string());
    }
    lines
}
