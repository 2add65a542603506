pub mod auth;
pub mod market;
pub mod player;
pub mod portfolio;
pub mod trade;
pub mod ws;

pub use auth::*;
pub use market::*;
pub use player::*;
pub use portfolio::*;
pub use trade::*;
pub use ws::*;

/// Round a monetary value to cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
