pub mod goal;
pub mod roadmap;
pub mod step;
