use std::time::Duration;

use uuid::Uuid;

use crate::models::{BindingStatus, NfcBinding};
use crate::simulate::task::Task;

pub trait TagReader {
    fn scan(&self) -> Task<NfcBinding>;
}

/// Pretends to read a tag after a fixed delay. Always succeeds.
pub struct SimulatedTagReader {
    delay: Duration,
}

impl SimulatedTagReader {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl TagReader for SimulatedTagReader {
    fn scan(&self) -> Task<NfcBinding> {
        Task::spawn("nfc scan", self.delay, || {
            Ok(NfcBinding {
                nfc_uid: simulated_uid(),
                is_bound: true,
                binding_status: BindingStatus::Success,
            })
        })
    }
}

/// 7-byte UID in the NXP layout (manufacturer byte 0x04 first).
pub fn simulated_uid() -> String {
    let random = Uuid::new_v4();
    std::iter::once(0x04u8)
        .chain(random.as_bytes().iter().copied().take(6))
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::task::TaskStatus;

    #[test]
    fn uid_is_seven_hex_bytes() {
        let uid = simulated_uid();
        let parts: Vec<&str> = uid.split(':').collect();
        assert_eq!(parts.len(), 7);
        assert_eq!(parts[0], "04");
        assert!(parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())));
    }

    #[test]
    fn scan_always_binds() {
        let reader = SimulatedTagReader::new(Duration::from_millis(5));
        match reader.scan().wait() {
            TaskStatus::Succeeded(binding) => {
                assert!(binding.is_bound);
                assert_eq!(binding.binding_status, BindingStatus::Success);
            }
            other => panic!("expected binding, got {other:?}"),
        }
    }
}
