/// Delimited text (XYZ) reader and writer module.
pub mod xyz;
