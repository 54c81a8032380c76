pub mod catalog;
pub mod configuration;
pub mod quote;
pub mod step;
