pub mod chat;
pub mod config_cmd;
