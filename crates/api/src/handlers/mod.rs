pub mod generate;
pub mod images;
pub mod models;
