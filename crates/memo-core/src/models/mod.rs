//! Data models for Quick Memo

mod category;
mod note;

pub use category::{
    category_label, custom_category_key, default_categories, normalize_category_order,
    Categories, Category, CUSTOM_CATEGORY_PREFIX,
};
pub use note::{Note, NoteId};
