//! In-memory SNMP agent for unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Oid, SnmpConnector, SnmpError, SnmpSession, SnmpValue};

/// Answers `get` and `walk` from a sorted table. Requests under a failing
/// prefix return [`SnmpError::Timeout`], under a rejected prefix
/// [`SnmpError::Status`]. Clones share the request counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSession {
    table: BTreeMap<Oid, SnmpValue>,
    failing: Vec<Oid>,
    rejected: Vec<Oid>,
    requests: Arc<AtomicUsize>,
}

impl FakeSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, oid: &str, value: SnmpValue) -> Self {
        self.table.insert(oid.parse().unwrap(), value);
        self
    }

    pub(crate) fn fail(mut self, prefix: &str) -> Self {
        self.failing.push(prefix.parse().unwrap());
        self
    }

    pub(crate) fn reject(mut self, prefix: &str) -> Self {
        self.rejected.push(prefix.parse().unwrap());
        self
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn check(&self, oid: &Oid) -> Result<(), SnmpError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|prefix| oid.starts_with(prefix)) {
            return Err(SnmpError::Timeout { attempts: 3 });
        }
        if self.rejected.iter().any(|prefix| oid.starts_with(prefix)) {
            return Err(SnmpError::Status { status: 5, index: 1 });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SnmpSession for FakeSession {
    async fn get(&self, oid: &Oid) -> Result<SnmpValue, SnmpError> {
        self.check(oid)?;
        Ok(self
            .table
            .get(oid)
            .cloned()
            .unwrap_or(SnmpValue::NoSuchInstance))
    }

    async fn walk(&self, base: &Oid) -> Result<Vec<(Oid, SnmpValue)>, SnmpError> {
        self.check(base)?;
        Ok(self
            .table
            .range(base.clone()..)
            .take_while(|(oid, _)| oid.starts_with(base))
            .map(|(oid, value)| (oid.clone(), value.clone()))
            .collect())
    }
}

/// Hands out clones of one [`FakeSession`] and counts connections.
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    session: FakeSession,
    refuse: bool,
    pub(crate) connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub(crate) fn new(session: FakeSession) -> Self {
        Self {
            session,
            refuse: false,
            connects: Arc::default(),
        }
    }

    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SnmpConnector for FakeConnector {
    async fn connect(
        &self,
        _address: &str,
        _community: &str,
    ) -> Result<Box<dyn SnmpSession>, SnmpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(SnmpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        Ok(Box::new(self.session.clone()))
    }
}
