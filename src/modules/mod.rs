pub mod cleaner;
pub mod common;
pub mod executor;
pub mod guard;
pub mod profiles;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod saves;
pub mod scanner;
pub mod session;
pub mod updater;
