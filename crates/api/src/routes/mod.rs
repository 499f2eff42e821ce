pub mod analytics;
pub mod health;
