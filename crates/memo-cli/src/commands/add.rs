use crate::commands::common::{resolve_note_content, Context};
use crate::error::CliError;

pub async fn run_add(content_parts: &[String], category: &str, ctx: &Context) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let mut service = ctx.open_service()?;
    let note = service.add_note(&content, category).await?;

    println!("{}", note.id);
    Ok(())
}
