pub mod activity;
pub mod alert;
pub mod config;
pub mod error;

pub use activity::*;
pub use alert::*;
pub use config::Config;
pub use error::*;
