pub mod data;
pub mod rand;
pub mod settings;
