pub mod summary;
pub mod template_store;

pub use summary::RunSummary;
pub use template_store::TemplateStore;
