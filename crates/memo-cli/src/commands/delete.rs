use memo_core::services::DeleteOutcome;

use crate::commands::common::{resolve_note_id, Context};
use crate::error::CliError;

pub async fn run_delete(id: &str, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    let note_id = resolve_note_id(&service, id)?;

    match service.delete_note(note_id).await? {
        DeleteOutcome::LocalOnly | DeleteOutcome::Tombstoned => println!("{note_id}"),
        DeleteOutcome::Resynced => {
            println!("{note_id}");
            eprintln!("Cloud delete failed; notes were reloaded from the cloud.");
        }
    }
    Ok(())
}
