pub mod ask;
pub mod pipeline;
pub mod config_cmd;
pub mod vars;
