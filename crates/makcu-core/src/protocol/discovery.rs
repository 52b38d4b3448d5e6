//! Port discovery
//!
//! The session only needs "give me candidate port names". The default
//! implementation filters the serial port list by the bridge chip's USB ids.

use super::serial::{list_ports, PortInfo};

/// Source of candidate port identifiers, best candidate first
pub trait PortDiscovery: Send + Sync {
    /// Port names to try, in order
    fn candidate_ports(&self) -> Vec<String>;
}

impl<F> PortDiscovery for F
where
    F: Fn() -> Vec<String> + Send + Sync,
{
    fn candidate_ports(&self) -> Vec<String> {
        self()
    }
}

/// Discovery over the host's serial ports, keeping MAKCU USB ids only
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortDiscovery;

impl PortDiscovery for SerialPortDiscovery {
    fn candidate_ports(&self) -> Vec<String> {
        makcu_ports(list_ports())
    }
}

fn makcu_ports(ports: Vec<PortInfo>) -> Vec<String> {
    ports
        .into_iter()
        .filter(PortInfo::is_makcu)
        .map(|p| p.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MAKCU_PID, MAKCU_VID};

    #[test]
    fn test_filters_by_usb_identity() {
        let mut makcu = PortInfo::named("/dev/ttyACM3");
        makcu.vid = Some(MAKCU_VID);
        makcu.pid = Some(MAKCU_PID);
        let mut other = PortInfo::named("/dev/ttyACM0");
        other.vid = Some(0x2341);
        other.pid = Some(0x0043);

        let found = makcu_ports(vec![other, PortInfo::named("/dev/ttyS0"), makcu]);
        assert_eq!(found, vec!["/dev/ttyACM3".to_string()]);
    }

    #[test]
    fn test_closure_discovery() {
        let discovery = || vec!["COM7".to_string()];
        assert_eq!(discovery.candidate_ports(), vec!["COM7".to_string()]);
    }
}
