/// Firmware-update capability, polled once per reporting cycle.
///
/// Deployments that do not take over-the-air updates wire in [`NoUpdates`]
/// instead of compiling the capability out.
pub trait UpdateService {
    fn poll(&mut self) {}
}

/// Default no-op capability.
#[derive(Debug, Default)]
pub struct NoUpdates;

impl UpdateService for NoUpdates {}
