use crate::http::timing_connector::{Connection, Route};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Idle keep-alive connections, keyed by route.
pub struct Pool {
    idle: Mutex<HashMap<Route, Vec<Connection>>>,
    max_idle: usize,
}

impl Pool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Route, Vec<Connection>>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Parks a connection whose last response was fully read.
    pub fn checkin(&self, route: Route, connection: Connection) {
        if connection.sender.is_closed() {
            return;
        }
        let mut idle = self.lock();
        let total: usize = idle.values().map(Vec::len).sum();
        if total >= self.max_idle {
            trace!("Idle list full, closing connection to {}", route.dial_address());
            return;
        }
        trace!("Parking connection to {}", route.dial_address());
        idle.entry(route).or_default().push(connection);
    }

    /// Takes the most recently parked live connection for `route`.
    pub async fn checkout(&self, route: &Route) -> Option<Connection> {
        loop {
            let mut connection = {
                let mut idle = self.lock();
                let parked = idle.get_mut(route)?;
                let connection = parked.pop();
                if parked.is_empty() {
                    idle.remove(route);
                }
                connection?
            };
            if connection.sender.is_closed() {
                continue;
            }
            if connection.sender.ready().await.is_ok() {
                debug!("Reusing connection to {}", route.dial_address());
                return Some(connection);
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }
}
