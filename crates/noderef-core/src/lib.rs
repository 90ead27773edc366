#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod paths;
pub mod pkg;
pub mod refresh;
pub mod resolve;
pub mod slim;
pub mod version;
pub mod writer;

pub use config::{Config, InstallSource, PluginPackage, RefreshConfig};
pub use error::Error;
pub use refresh::{run as run_refresh, RefreshSummary};
pub use resolve::{Resolver, Strategy, VersionOverrides};
pub use version::VERSION;
