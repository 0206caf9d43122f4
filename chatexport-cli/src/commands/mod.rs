pub mod delete;
pub mod export;

pub use delete::run_delete;
pub use export::run_export;
