//! Data model: paths, differences, patches, tables, and roots.

pub mod conflict;
pub mod diff;
pub mod ordering;
pub mod patch;
pub mod path;
pub mod root;
pub mod table;
