//! Session lifecycle state machine.
//!
//! A session moves `Created -> Mounted -> Unmounted -> Released`, with
//! remount allowed from `Unmounted`. The transition rules deliberately
//! preserve one asymmetry of the reference behavior: `release` fails with
//! already-mounted while the session is mounted, but succeeds from either
//! `Created` or `Unmounted`.

use crate::error::{ClientError, Result};

/// Lifecycle states of a mount session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MountState {
    /// Constructed, configuration-only.
    Created,
    /// Mounted; I/O-bearing operations permitted.
    Mounted,
    /// Unmounted after a mount; may mount again.
    Unmounted,
    /// Terminal; nothing is permitted.
    Released,
}

impl MountState {
    /// True while I/O-bearing operations are permitted.
    pub fn is_mounted(&self) -> bool {
        *self == MountState::Mounted
    }

    /// Checks a `mount` request from this state.
    pub fn check_mount(&self) -> Result<()> {
        match self {
            MountState::Created | MountState::Unmounted => Ok(()),
            MountState::Mounted => Err(ClientError::AlreadyMounted),
            MountState::Released => Err(ClientError::NotConnected),
        }
    }

    /// Checks an `unmount` request from this state.
    pub fn check_unmount(&self) -> Result<()> {
        match self {
            MountState::Mounted => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Checks a `release` request from this state.
    pub fn check_release(&self) -> Result<()> {
        match self {
            MountState::Created | MountState::Unmounted => Ok(()),
            MountState::Mounted => Err(ClientError::AlreadyMounted),
            MountState::Released => Err(ClientError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_may_mount_and_release_but_not_unmount() {
        let s = MountState::Created;
        assert!(s.check_mount().is_ok());
        assert!(s.check_release().is_ok());
        assert!(matches!(s.check_unmount(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn mounted_rejects_mount_and_release() {
        let s = MountState::Mounted;
        assert!(matches!(s.check_mount(), Err(ClientError::AlreadyMounted)));
        assert!(matches!(
            s.check_release(),
            Err(ClientError::AlreadyMounted)
        ));
        assert!(s.check_unmount().is_ok());
    }

    #[test]
    fn unmounted_may_remount_or_release() {
        let s = MountState::Unmounted;
        assert!(s.check_mount().is_ok());
        assert!(s.check_release().is_ok());
        assert!(matches!(s.check_unmount(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn released_is_terminal() {
        let s = MountState::Released;
        assert!(s.check_mount().is_err());
        assert!(s.check_unmount().is_err());
        assert!(s.check_release().is_err());
    }

    #[test]
    fn only_mounted_is_mounted() {
        assert!(MountState::Mounted.is_mounted());
        assert!(!MountState::Created.is_mounted());
        assert!(!MountState::Unmounted.is_mounted());
        assert!(!MountState::Released.is_mounted());
    }
}
