//! Command readiness.
//!
//! While the firmware launcher restarts (for example after a firmware update)
//! the frame accepts radio writes but does not execute them.

use crate::protocol::status::DeviceStatus;

/// Whether a device currently executes commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// `launcherCmdReady` is set.
    Ready,
    /// `launcherCmdReady` is clear.
    NotReady,
}

impl Readiness {
    /// Derive readiness from a decoded status.
    pub fn of(status: &DeviceStatus) -> Self {
        if is_ready(status) {
            Self::Ready
        } else {
            Self::NotReady
        }
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Check whether the device will execute commands.
pub fn is_ready(status: &DeviceStatus) -> bool {
    status.flags.launcher_cmd_ready()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::{BeaconBuilder, StatusFlags};

    fn status_with(flags: u32) -> DeviceStatus {
        DeviceStatus::decode(&BeaconBuilder::new().flags(flags).build()).unwrap()
    }

    #[test]
    fn test_ready_flag() {
        assert!(is_ready(&status_with(StatusFlags::LAUNCHER_CMD_READY)));
        assert_eq!(
            Readiness::of(&status_with(StatusFlags::LAUNCHER_CMD_READY | StatusFlags::SECURE_MODE)),
            Readiness::Ready
        );
    }

    #[test]
    fn test_other_flags_do_not_imply_ready() {
        let status = status_with(!StatusFlags::LAUNCHER_CMD_READY);
        assert!(!is_ready(&status));
        assert!(!Readiness::of(&status).is_ready());
    }
}
