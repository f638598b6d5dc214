pub mod detection;
pub mod errors;
pub mod media;
pub mod model;
pub mod stream;
