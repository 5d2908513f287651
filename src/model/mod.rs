pub mod agent;
pub mod chat;
pub mod generation;
pub mod panel;
pub mod project;
pub mod settings;
