// Clip library module
// Resolves clip names to files and catalogs what is on storage

pub mod clips;
pub mod scanner;

pub use clips::{ClipLibrary, OpenClip};
pub use scanner::DirectoryScanner;
