pub mod refresh;
pub mod version;
