use memo_core::SyncOutcome;

use crate::cli::{SyncCommands, VolumeArgs};
use crate::commands::common::{
    describe_sync_outcome, prompt_volume_decision, volume_choice, CliService, Context,
};
use crate::error::CliError;

pub async fn run_sync(
    command: Option<SyncCommands>,
    volume: VolumeArgs,
    ctx: &Context,
) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    if service.current_user().is_none() {
        return Err(CliError::NotSignedIn);
    }

    let outcome = match command.unwrap_or(SyncCommands::Save) {
        SyncCommands::Save => {
            let outcome = service.cloud_save(volume_choice(volume)).await?;
            settle_volume_decision(&mut service, outcome).await?
        }
        SyncCommands::Reload => service.full_resync().await?,
    };

    println!("{}", describe_sync_outcome(&outcome));
    Ok(())
}

/// Ask how to proceed when the volume guard tripped, then retry once.
pub async fn settle_volume_decision(
    service: &mut CliService,
    outcome: SyncOutcome,
) -> Result<SyncOutcome, CliError> {
    let mismatch = match outcome {
        SyncOutcome::NeedsDecision(mismatch) => mismatch,
        other => return Ok(other),
    };

    match prompt_volume_decision(mismatch)? {
        Some(choice) => Ok(service.cloud_save(choice).await?),
        None => Ok(SyncOutcome::NeedsDecision(mismatch)),
    }
}
