pub mod countries;
pub mod importer;
