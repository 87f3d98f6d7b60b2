pub mod admins;
pub mod images;
pub mod instances;
pub mod reaper;
