use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Shared mapping from a server-side endpoint to the console-side client
/// that last sent traffic to it. Responses are reverse-routed through this
/// table, so both capture loops hold a handle to the same instance.
///
/// Entries are never evicted; a later client packet to the same server
/// endpoint overwrites the previous return path.
pub struct ConnectionTable {
    entries: Mutex<HashMap<SocketAddr, SocketAddr>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record `client` as the return path for traffic coming back from
    /// `server`. Last write wins.
    pub fn upsert(&self, server: SocketAddr, client: SocketAddr) {
        self.entries.lock().insert(server, client);
    }

    /// Return path for responses from `server`, if one was ever learned.
    pub fn lookup(&self, server: SocketAddr) -> Option<SocketAddr> {
        self.entries.lock().get(&server).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}
