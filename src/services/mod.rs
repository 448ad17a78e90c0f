pub mod alerts;
pub mod collector;
