pub mod decode;
pub mod find;
pub mod plot;
pub mod results;
pub mod spectrum;
