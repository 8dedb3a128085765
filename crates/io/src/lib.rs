// File I/O operations

pub mod csv;
pub mod geojson;
pub mod load;
pub mod report;
pub mod xlsx;

pub use load::{check_inputs, load_inputs, write_outputs};
pub use report::{InputFingerprint, OutputRecord, RunReport};
