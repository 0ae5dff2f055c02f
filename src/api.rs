pub mod edistribucion;
pub mod heartbeat;
