pub mod logging;
pub mod sql_format;
