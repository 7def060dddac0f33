use memo_core::view::{NoteFilter, SortMode};

use crate::commands::common::{format_note_lines, note_to_list_item, Context, NoteListItem};
use crate::error::CliError;

pub struct ListOptions {
    pub sort: Option<SortMode>,
    pub category: Option<String>,
    pub hide_completed: bool,
    pub show_completed: bool,
    pub as_json: bool,
}

pub fn run_list(options: ListOptions, ctx: &Context) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let filter = NoteFilter {
        category: options.category,
        hide_completed: options.hide_completed
            || (ctx.config.hide_completed && !options.show_completed),
    };
    let sort = options.sort.unwrap_or(ctx.config.default_sort);
    let notes = service.visible_notes(&filter, sort);
    let categories = &service.state().categories;

    if options.as_json {
        let json_items = notes
            .iter()
            .map(|note| note_to_list_item(note, categories))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes.");
    } else {
        for line in format_note_lines(&notes, categories) {
            println!("{line}");
        }
    }

    Ok(())
}
