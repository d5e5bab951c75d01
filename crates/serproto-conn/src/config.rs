use std::time::Duration;

use serproto_frame::FrameConfig;

/// Timing and buffering for the communication loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Pause after the link opens before any traffic is processed.
    ///
    /// Many boards reset when a serial port is opened and need this long to
    /// boot. Default: 1 s.
    pub settle_delay: Duration,
    /// Sleep between loop iterations. Default: 50 ms.
    pub poll_interval: Duration,
    /// Frame reader settings.
    pub frame: FrameConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
            frame: FrameConfig::default(),
        }
    }
}
