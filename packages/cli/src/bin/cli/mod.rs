pub mod image;
pub mod run;
pub mod utils;
