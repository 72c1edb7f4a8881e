mod code;
mod health;
mod ws;

pub use code::reveal_code;
pub use health::{health, HealthResponse};
pub use ws::ws_upgrade;
