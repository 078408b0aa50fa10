pub mod commands;
pub mod modules;

pub use modules::common::error::KeepError;
pub use modules::common::response::OperationResponse;
pub use modules::common::utils;
pub use modules::cleaner;
pub use modules::guard;
pub use modules::profiles;
pub use modules::registry;
pub use modules::reporter;
pub use modules::runner;
pub use modules::saves;
pub use modules::scanner;
pub use modules::session;
pub use modules::updater;
