use crate::commands::common::{resolve_note_id, Context};
use crate::error::CliError;

pub async fn run_move(id: &str, category: &str, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    let note_id = resolve_note_id(&service, id)?;
    let note = service.move_to_category(note_id, category).await?;
    println!("{} -> {}", note.id, note.category);
    Ok(())
}

pub async fn run_copy(id: &str, category: &str, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    let note_id = resolve_note_id(&service, id)?;
    let copy = service.copy_to_category(note_id, category).await?;
    println!("{}", copy.id);
    Ok(())
}

pub async fn run_reorder(id: &str, position: usize, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    let note_id = resolve_note_id(&service, id)?;
    service.move_note(note_id, position).await?;
    println!("{note_id}");
    Ok(())
}
