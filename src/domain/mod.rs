pub mod alert;
pub mod camera;
pub mod detection;
pub mod errors;
pub mod model;
pub mod stream;
pub mod verification;
