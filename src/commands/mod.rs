pub mod export;
pub mod recheck;
pub mod run;
pub mod status;
