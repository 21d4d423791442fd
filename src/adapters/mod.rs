pub mod backend;
pub mod gemini;
pub mod http;
pub mod onnx;
pub mod storage;
pub mod video;
#[cfg(feature = "v4l2")]
pub mod v4l2;
