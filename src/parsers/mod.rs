pub mod fields;
pub mod xml;

pub use xml::RawRecord;
