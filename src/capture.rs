use anyhow::{Context, Result};
use pcap::{Active, Capture, Device};
use tracing::{error, info};

/// Open a promiscuous live capture on the named interface.
///
/// No capture filter is installed; frame filtering happens in-process at
/// decode time. Open failure is the one fatal error in the pipeline, handled
/// by the caller.
pub fn open(interface: &str) -> Result<Capture<Active>> {
    let capture = Capture::from_device(interface)
        .with_context(|| format!("unknown capture device {}", interface))?
        .promisc(true)
        .snaplen(65_536)
        .immediate_mode(true)
        .open()
        .with_context(|| format!("failed to open capture on {}", interface))?;

    Ok(capture)
}

/// Log every capture device the system knows about. Used as a startup
/// diagnostic and again when opening a capture fails, so the operator can
/// see what the interface name should have been.
pub fn list_interfaces() {
    match Device::list() {
        Ok(devices) => {
            info!("available capture interfaces:");
            for device in devices {
                match &device.desc {
                    Some(desc) => info!("  {} ({})", device.name, desc),
                    None => info!("  {}", device.name),
                }
            }
        }
        Err(e) => error!("failed to list capture interfaces: {}", e),
    }
}
