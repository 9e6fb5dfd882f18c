use crate::constants::surface::{LOW_END_CORE_COUNT, LOW_END_VIEWPORT_WIDTH};

/// Coarse device class used to pick default grid sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTier {
    Standard,
    LowEnd,
}

/// What the host knows about the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHints {
    pub hardware_concurrency: Option<usize>,
    pub viewport_width: u32,
    pub user_agent: Option<String>,
}

impl DeviceHints {
    /// Hints for a native process; the core count comes from `num_cpus`.
    pub fn detect_native(viewport_width: u32) -> Self {
        Self {
            hardware_concurrency: Some(num_cpus::get()),
            viewport_width,
            user_agent: None,
        }
    }

    pub fn is_mobile_agent(&self) -> bool {
        self.user_agent
            .as_deref()
            .map_or(false, |agent| agent.contains("Mobi") || agent.contains("Android"))
    }

    pub fn tier(&self) -> DeviceTier {
        let few_cores = self
            .hardware_concurrency
            .map_or(false, |cores| cores <= LOW_END_CORE_COUNT);
        let narrow = self.viewport_width < LOW_END_VIEWPORT_WIDTH;

        if few_cores || narrow || self.is_mobile_agent() {
            DeviceTier::LowEnd
        } else {
            DeviceTier::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> DeviceHints {
        DeviceHints {
            hardware_concurrency: Some(8),
            viewport_width: 1440,
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
        }
    }

    #[test]
    fn test_desktop_is_standard() {
        assert_eq!(desktop().tier(), DeviceTier::Standard);
    }

    #[test]
    fn test_each_signal_demotes() {
        let cores = DeviceHints {
            hardware_concurrency: Some(4),
            ..desktop()
        };
        let narrow = DeviceHints {
            viewport_width: 767,
            ..desktop()
        };
        let phone = DeviceHints {
            user_agent: Some("Mozilla/5.0 (Linux; Android 14) Mobile".to_string()),
            ..desktop()
        };
        for hints in [cores, narrow, phone] {
            assert_eq!(hints.tier(), DeviceTier::LowEnd, "{:?}", hints);
        }
    }

    #[test]
    fn test_unknown_core_count_is_not_low_end() {
        let hints = DeviceHints {
            hardware_concurrency: None,
            ..desktop()
        };
        assert_eq!(hints.tier(), DeviceTier::Standard);
    }
}
