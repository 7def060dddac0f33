use std::env;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use memo_core::config::MemoConfig;
use memo_core::db::SqliteLocalStore;
use memo_core::models::{category_label, Categories};
use memo_core::remote::SqliteRemoteStore;
use memo_core::sync::VolumeMismatch;
use memo_core::{MemoService, Note, NoteId, SyncOutcome, VolumeChoice};
use serde::Serialize;

use crate::cli::VolumeArgs;
use crate::error::CliError;

pub type CliService = MemoService<SqliteRemoteStore, SqliteLocalStore>;

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "memo";

/// Resolved file locations plus the loaded configuration.
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub remote_path: PathBuf,
    pub config_path: PathBuf,
    pub config: MemoConfig,
}

impl Context {
    pub fn resolve(
        cli_db_path: Option<PathBuf>,
        cli_remote_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = default_config_path()?;
        let config = MemoConfig::load_from_path(&config_path)?;
        let db_path = resolve_db_path(cli_db_path)?;
        let remote_path = resolve_remote_path(cli_remote_path, &config)?;
        Ok(Self {
            db_path,
            remote_path,
            config_path,
            config,
        })
    }

    pub fn open_service(&self) -> Result<CliService, CliError> {
        let local = SqliteLocalStore::open(&self.db_path)?;
        let remote = SqliteRemoteStore::open(&self.remote_path)?;
        tracing::debug!(
            "Opened local store {} and remote store {}",
            self.db_path.display(),
            self.remote_path.display()
        );
        Ok(MemoService::open(remote, local)?.with_volume_tolerance(self.config.volume_tolerance))
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub preview: String,
    pub text: String,
    pub category: String,
    pub category_name: String,
    pub completed: bool,
    pub timestamp: String,
    pub updated_at: Option<String>,
    pub relative_time: String,
}

pub fn resolve_note_id(service: &CliService, query: &str) -> Result<NoteId, CliError> {
    let query = normalize_note_identifier(query)?;
    if let Ok(id) = query.parse::<NoteId>() {
        if service.note(id).is_some() {
            return Ok(id);
        }
    }

    let matching: Vec<NoteId> = service
        .notes()
        .iter()
        .map(|note| note.id)
        .filter(|id| id.to_string().starts_with(&query))
        .collect();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(query)),
        [id] => Ok(*id),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_note_lines(notes: &[&Note], categories: &Categories) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let check = if note.completed { "[x]" } else { "[ ]" };
            let category = category_label(categories, &note.category);
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note_millis(note), now_ms);
            format!(
                "{id:<13}  {check} {} {preview:<40}  {relative_time}",
                category.icon
            )
        })
        .collect()
}

pub fn note_to_list_item(note: &Note, categories: &Categories) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.to_string(),
        preview: note_preview(note, 80),
        text: note.text.clone(),
        category: note.category.clone(),
        category_name: category_label(categories, &note.category).name,
        completed: note.completed,
        timestamp: note.timestamp.clone(),
        updated_at: note.updated_at.map(|updated_at| updated_at.to_rfc3339()),
        relative_time: format_relative_time(note_millis(note), now_ms),
    }
}

fn note_millis(note: &Note) -> i64 {
    note.recency()
        .map_or_else(|| note.id.value(), |recency| recency.timestamp_millis())
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let first_line = note.text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub const fn volume_choice(args: VolumeArgs) -> VolumeChoice {
    if args.overwrite_remote {
        VolumeChoice::OverwriteRemote
    } else if args.merge {
        VolumeChoice::Merge
    } else {
        VolumeChoice::Ask
    }
}

/// Ask on the terminal how to handle a large local set.
///
/// Returns `None` when the user cancels.
pub fn prompt_volume_decision(mismatch: VolumeMismatch) -> Result<Option<VolumeChoice>, CliError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(CliError::VolumeDecisionRequired {
            local: mismatch.local,
            remote: mismatch.remote,
            tolerance: mismatch.tolerance,
        });
    }

    eprint!(
        "You have {} local notes but only {} in the cloud. [m]erge, [o]verwrite cloud, or [c]ancel? ",
        mismatch.local, mismatch.remote
    );
    io::stderr().flush()?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(parse_volume_answer(&answer))
}

pub fn parse_volume_answer(answer: &str) -> Option<VolumeChoice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "m" | "merge" => Some(VolumeChoice::Merge),
        "o" | "overwrite" => Some(VolumeChoice::OverwriteRemote),
        _ => None,
    }
}

pub fn describe_sync_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Reconciled(reconciled) => {
            let report = &reconciled.report;
            format!(
                "Synced {} note(s) ({} local, {} remote, {} removed by deletes)",
                report.merged_count, report.local_count, report.remote_count,
                report.excluded_tombstones
            )
        }
        SyncOutcome::NeedsDecision(mismatch) => format!(
            "Sync skipped: {} local vs {} remote notes",
            mismatch.local, mismatch.remote
        ),
        SyncOutcome::Resynced { notes } => format!("Reloaded {notes} note(s) from the cloud"),
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("memo-note-{}-{now}.md", std::process::id()))
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("MEMO_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    Ok(default_data_dir()?.join("memo.db"))
}

pub fn resolve_remote_path(
    cli_remote_path: Option<PathBuf>,
    config: &MemoConfig,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_remote_path
        .or_else(|| env::var_os("MEMO_REMOTE_PATH").map(PathBuf::from))
        .or_else(|| config.remote_path.clone())
    {
        return Ok(path);
    }
    Ok(default_data_dir()?.join("remote.db"))
}
