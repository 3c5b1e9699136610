pub mod build;
pub mod check;
pub mod detect;
pub mod generate;
pub mod info;
pub mod shared;
pub mod track;
