//! Maps `Box<dyn Error>` from trait boundaries to typed `PumpError`.
//!
//! `pump_traits` uses `Box<dyn Error + Send + Sync>` so backends stay free to
//! pick their own error types; with the `hardware-errors` feature the known
//! `pump_hardware::HwError` variants are mapped precisely.

use crate::error::PumpError;

/// Map a trait-boundary error to a typed `PumpError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> PumpError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<pump_hardware::error::HwError>() {
            return match hw {
                pump_hardware::error::HwError::Timeout => PumpError::Timeout,
                other => PumpError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        PumpError::Timeout
    } else {
        PumpError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(&'static str);
    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }
    impl std::error::Error for Plain {}

    #[test]
    fn string_fallback() {
        assert_eq!(map_hw_error(&Plain("read Timeout")), PumpError::Timeout);
        assert_eq!(
            map_hw_error(&Plain("bus stuck")),
            PumpError::Hardware("bus stuck".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_error() {
        let e = pump_hardware::error::HwError::Gpio("pin 25 busy".into());
        assert!(matches!(map_hw_error(&e), PumpError::HardwareFault(m) if m.contains("pin 25")));
        assert_eq!(
            map_hw_error(&pump_hardware::error::HwError::Timeout),
            PumpError::Timeout
        );
    }
}
