use serde::Serialize;

use crate::cli::CategoryCommands;
use crate::commands::common::Context;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CategoryListItem {
    pub key: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub notes: usize,
}

pub async fn run_category(command: CategoryCommands, ctx: &Context) -> Result<(), CliError> {
    let mut service = ctx.open_service()?;
    match command {
        CategoryCommands::List { json } => {
            let state = service.state();
            let items = state
                .category_order
                .iter()
                .filter_map(|key| {
                    let category = state.categories.get(key)?;
                    Some(CategoryListItem {
                        key: key.clone(),
                        name: category.name.clone(),
                        icon: category.icon.clone(),
                        color: category.color.clone(),
                        notes: state.notes.iter().filter(|note| &note.category == key).count(),
                    })
                })
                .collect::<Vec<_>>();

            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in items {
                    println!(
                        "{:<20}  {} {:<16}  {:<8}  {} note(s)",
                        item.key, item.icon, item.name, item.color, item.notes
                    );
                }
            }
        }
        CategoryCommands::Add { name, icon, color } => {
            let key = service.add_category(&name, &icon, &color).await?;
            println!("{key}");
        }
        CategoryCommands::Update {
            key,
            name,
            icon,
            color,
        } => {
            let category = service
                .update_category(&key, name.as_deref(), icon.as_deref(), color.as_deref())
                .await?;
            println!("{key}  {} {}", category.icon, category.name);
        }
        CategoryCommands::Remove { key } => {
            service.delete_category(&key).await?;
            println!("{key}");
        }
    }
    Ok(())
}
