//! Template directory handling

pub mod store;

pub use store::TemplateStore;
