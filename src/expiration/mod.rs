pub mod cleaner;

pub use cleaner::start_expiration_cleaner;
