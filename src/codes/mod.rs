pub mod generator;
pub mod lifecycle;

pub use generator::generate_code;
pub use lifecycle::{start_code_rotation, CodeLifecycleManager, LifecycleError, Rotation};

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
