pub mod login;
pub mod run;
pub mod sync;
