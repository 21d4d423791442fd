pub mod annotate;
pub mod detection_service;
pub mod dispatch_service;
pub mod dto;
pub mod ports;
pub mod scheduler;
pub mod services;
pub mod stream_service;
pub mod throttle;
pub mod verification_service;
