use memo_core::Identity;

use crate::cli::AuthCommands;
use crate::commands::common::{describe_sync_outcome, volume_choice, Context};
use crate::commands::sync::settle_volume_decision;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    match command {
        AuthCommands::Login {
            user,
            email,
            volume,
        } => {
            let identity = Identity::new(user, email)?;
            let outcome = service
                .sign_in(identity.clone(), volume_choice(volume))
                .await?;
            let outcome = settle_volume_decision(&mut service, outcome).await?;
            println!("Signed in as {identity}");
            println!("{}", describe_sync_outcome(&outcome));
        }
        AuthCommands::Status => {
            if let Some(identity) = service.current_user() {
                let email_label = identity.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Signed in as {} {} ({})",
                    identity.user_id,
                    email_label,
                    service.sync_state()
                );
            } else {
                println!("Not signed in ({} local note(s)).", service.notes().len());
            }
            if service.has_staged_changes()? {
                println!("Local changes are waiting for `memo sync`.");
            }
        }
        AuthCommands::Logout => match service.sign_out()? {
            Some(identity) => println!("Signed out {identity}"),
            None => println!("Not signed in."),
        },
    }
    Ok(())
}
