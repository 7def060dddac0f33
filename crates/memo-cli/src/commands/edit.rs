use crate::commands::common::{
    capture_editor_input_with_initial, normalize_content, resolve_note_id, Context,
};
use crate::error::CliError;

pub async fn run_edit(id: &str, text_parts: &[String], ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    let note_id = resolve_note_id(&service, id)?;
    let current = service
        .note(note_id)
        .map(|note| note.text.clone())
        .unwrap_or_default();

    let edited = match normalize_content(&text_parts.join(" ")) {
        Some(text) => text,
        None => capture_editor_input_with_initial(&current)?.ok_or(CliError::EmptyEditedContent)?,
    };

    if edited == current {
        println!("{note_id}");
        return Ok(());
    }

    let updated = service.edit_note(note_id, &edited).await?;
    println!("{}", updated.id);
    Ok(())
}

pub async fn run_done(id: &str, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    let note_id = resolve_note_id(&service, id)?;
    let note = service.toggle_completed(note_id).await?;

    let state = if note.completed { "completed" } else { "reopened" };
    println!("{} {state}", note.id);
    Ok(())
}
