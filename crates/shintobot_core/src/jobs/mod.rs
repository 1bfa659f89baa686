//! Concrete bot jobs. Each is a `Transform` plus the worklist it runs over
//! when no explicit titles are given.

pub mod category_tags;
pub mod delete_pages;
pub mod legacy_templates;
pub mod normalize_categories;
pub mod status_page;
pub mod talk_pages;

pub use category_tags::{MergeCategory, RemoveCategory};
pub use delete_pages::DeletePages;
pub use legacy_templates::StripLegacyTemplates;
pub use normalize_categories::NormalizeCategories;
pub use status_page::UpdateStatus;
pub use talk_pages::MigrateTalk;

/// Every job name, which is also the stem of its ledger file.
pub const JOB_NAMES: &[&str] = &[
    normalize_categories::JOB_NAME,
    legacy_templates::JOB_NAME,
    category_tags::REMOVE_JOB_NAME,
    category_tags::MERGE_JOB_NAME,
    talk_pages::JOB_NAME,
    delete_pages::JOB_NAME,
    status_page::JOB_NAME,
];
