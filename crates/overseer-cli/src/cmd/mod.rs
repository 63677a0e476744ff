pub mod approve;
pub mod config;
pub mod feedback;
pub mod init;
pub mod log;
pub mod restructure;
pub mod run;
pub mod scan;
pub mod snapshot;
