//! Short-range and low-power radio channels.
//!
//! These transports only implement the on/off and reachability contract;
//! framing and link management belong to the radio firmware.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use station_shared::ChannelType;

use crate::error::ChannelError;

pub struct RadioChannel {
    channel_type: ChannelType,
    enabled: AtomicBool,
}

impl RadioChannel {
    pub fn new(channel_type: ChannelType) -> Self {
        Self {
            channel_type,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn enable(&self) -> Result<(), ChannelError> {
        self.enabled.store(true, Ordering::SeqCst);
        info!(channel = %self.channel_type, "Radio channel enabled");
        Ok(())
    }

    pub fn disable(&self) -> Result<(), ChannelError> {
        self.enabled.store(false, Ordering::SeqCst);
        info!(channel = %self.channel_type, "Radio channel disabled");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }
}
