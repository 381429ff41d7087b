pub mod auth;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod push;
pub mod receiving;
pub mod router;
pub mod sending;
pub mod state;
pub mod telemetry;
pub mod tokens;

#[cfg(test)]
mod tests;
