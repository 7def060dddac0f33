use std::path::Path;

use memo_core::export::suggested_export_file_name;
use memo_core::util::unix_millis_now;

use crate::cli::ExportFormat;
use crate::commands::common::Context;
use crate::error::CliError;

pub fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    ctx: &Context,
) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let rendered = service.export(format.into())?;

    if let Some(path) = output_path {
        let path = if path.is_dir() {
            path.join(suggested_export_file_name(format.into(), unix_millis_now()))
        } else {
            path.to_path_buf()
        };
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

pub async fn run_import(path: &Path, ctx: &Context) -> Result<(), CliError> {
    let payload = std::fs::read_to_string(path)?;
    let mut service = ctx.open_service()?;
    let count = service.import(&payload).await?;
    println!("Imported {count} note(s) ({})", service.sync_state());
    Ok(())
}
