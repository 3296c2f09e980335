// ABOUTME: Command implementations for each deployment phase
// ABOUTME: Exports services, init, deploy, and import commands

pub mod deploy;
pub mod import_db;
pub mod import_images;
pub mod init;
pub mod oauth;
pub mod services;

pub use deploy::{deploy, DeployProfile};
pub use import_db::import_db;
pub use import_images::import_images;
pub use init::init;
pub use oauth::install_oauth;
pub use services::{services_status, services_up};
