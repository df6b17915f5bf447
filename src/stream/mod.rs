mod manager;
mod mjpeg;
mod monitor;
mod probe;

pub use manager::{
    ConnectionHealth, ConnectionStatus, LoadRequest, StreamCommand, StreamConnectionManager,
};
pub use mjpeg::MjpegFrameExtractor;
pub use monitor::{ConnectionSnapshot, StreamMonitor, StreamMonitorHandle, StreamSignal};
pub use probe::{HttpStreamProbe, ProbeReporter, StreamFrame, StreamProbe};
