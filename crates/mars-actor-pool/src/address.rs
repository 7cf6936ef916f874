//! Addressing helpers. Intra-host traffic prefers a unix-domain socket path per process index;
//! cross-host traffic uses the external `host:port` address instead.

pub type ExternalAddress = String;
pub type InternalAddress = String;
pub type ProcessIndex = usize;

/// Derives the internal (intra-host) address for a subpool process. Unix-domain sockets are
/// used when the OS supports them (everywhere but Windows); otherwise the external address is
/// the only option, so callers fall back to that themselves.
pub fn derive_internal_address(base_dir: &std::path::Path, process_index: ProcessIndex) -> InternalAddress {
    if cfg!(unix) {
        format!("unix://{}", base_dir.join(format!("pool-{process_index}.sock")).display())
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_address_embeds_process_index() {
        let addr = derive_internal_address(std::path::Path::new("/tmp/mars"), 3);
        if cfg!(unix) {
            assert_eq!(addr, "unix:///tmp/mars/pool-3.sock");
        }
    }
}
