pub mod fixtures;
pub mod hooks;
pub mod prepare_env;
