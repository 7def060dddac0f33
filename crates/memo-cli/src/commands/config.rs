use crate::cli::ConfigCommands;
use crate::commands::common::Context;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, ctx: &Context) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            println!("# {}", ctx.config_path.display());
            println!("{}", serde_json::to_string_pretty(&ctx.config)?);
            println!("# local database:  {}", ctx.db_path.display());
            println!("# remote database: {}", ctx.remote_path.display());
        }
        ConfigCommands::Set { key, value } => {
            let mut config = ctx.config.clone();
            config.set_value(&key, &value)?;
            config.save_to_path(&ctx.config_path)?;
            println!("{key} updated in {}", ctx.config_path.display());
        }
    }
    Ok(())
}
