#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod css;
pub mod error;
pub mod paths;
pub mod pkg;
pub mod version;

pub use config::{Config, InstallOptions};
pub use error::Error;
pub use paths::ProjectLayout;
pub use version::VERSION;
