pub mod pick;
pub mod series;
