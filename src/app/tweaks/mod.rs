pub mod action;
pub mod category;
pub mod orchestrator;
pub mod scripts;
pub mod service;
pub mod status;
pub mod system;
