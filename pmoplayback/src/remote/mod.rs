//! Remote receivers: wire messages, session state machine, recovery.

pub mod protocol;
pub mod recovery;
pub mod session;

pub use protocol::{DeviceMessage, RemoteCommand, RemoteMessage, RemoteStatus};
pub use recovery::{RecoveryRecord, RecoveryWindow};
pub use session::{DeviceChannel, RemoteDeviceSessionManager, SessionNotice};
