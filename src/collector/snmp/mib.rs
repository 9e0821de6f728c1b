//! MIB-II and HOST-RESOURCES-MIB readers.
//!
//! Every reader is independent: a failure in one leaves its fields at zero
//! and is logged, the others still run.

use super::{Oid, SnmpError, SnmpSession, SnmpValue};
use crate::model::{InterfaceStat, InterfaceStatus};

/// sysUpTime.0 (TimeTicks, hundredths of a second).
pub const SYS_UPTIME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 3, 0];

/// ifTable columns.
pub const IF_DESCR: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];
pub const IF_OPER_STATUS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 8];
pub const IF_IN_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 10];
pub const IF_IN_ERRORS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 14];
pub const IF_OUT_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 16];
pub const IF_OUT_ERRORS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 20];

/// HOST-RESOURCES-MIB columns.
pub const HR_PROCESSOR_LOAD: &[u32] = &[1, 3, 6, 1, 2, 1, 25, 3, 3, 1, 2];
pub const HR_STORAGE_SIZE: &[u32] = &[1, 3, 6, 1, 2, 1, 25, 2, 3, 1, 5];
pub const HR_STORAGE_USED: &[u32] = &[1, 3, 6, 1, 2, 1, 25, 2, 3, 1, 6];

/// SNMP-derived part of a metrics record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnmpMetrics {
    pub cpu_usage_pct: f64,
    pub memory_usage_pct: f64,
    pub uptime_seconds: u64,
    pub interfaces: Vec<InterfaceStat>,
}

/// Run every reader against one session.
pub async fn collect(session: &dyn SnmpSession, device_id: &str) -> SnmpMetrics {
    let mut metrics = SnmpMetrics::default();

    match read_uptime(session).await {
        Ok(uptime) => metrics.uptime_seconds = uptime,
        Err(e) => tracing::warn!(device_id, error = %e, "Failed to read sysUpTime"),
    }

    match read_cpu_usage(session).await {
        Ok(cpu) => metrics.cpu_usage_pct = cpu,
        Err(e) => tracing::warn!(device_id, error = %e, "Failed to walk hrProcessorLoad"),
    }

    match read_memory_usage(session).await {
        Ok(memory) => metrics.memory_usage_pct = memory,
        Err(e) => tracing::warn!(device_id, error = %e, "Failed to walk hrStorage"),
    }

    match read_interfaces(session, device_id).await {
        Ok(interfaces) => metrics.interfaces = interfaces,
        Err(e) => tracing::warn!(device_id, error = %e, "Failed to walk ifDescr"),
    }

    metrics
}

fn unavailable(oid: &Oid, value: &SnmpValue) -> SnmpError {
    SnmpError::Decode(format!("{oid} has no usable value ({value:?})"))
}

/// Uptime in whole seconds.
pub async fn read_uptime(session: &dyn SnmpSession) -> Result<u64, SnmpError> {
    let oid = Oid::from_slice(SYS_UPTIME);
    let value = session.get(&oid).await?;
    value
        .as_u64()
        .map(|ticks| ticks / 100)
        .ok_or_else(|| unavailable(&oid, &value))
}

/// Mean processor load over all `hrProcessorLoad` rows. No rows gives 0.
pub async fn read_cpu_usage(session: &dyn SnmpSession) -> Result<f64, SnmpError> {
    let rows = session.walk(&Oid::from_slice(HR_PROCESSOR_LOAD)).await?;
    let loads: Vec<f64> = rows
        .iter()
        .filter_map(|(_, value)| value.as_i64())
        .map(|v| v as f64)
        .collect();

    if loads.is_empty() {
        return Ok(0.0);
    }
    Ok(loads.iter().sum::<f64>() / loads.len() as f64)
}

/// Used/size ratio of the first storage entry, as a percentage.
pub async fn read_memory_usage(session: &dyn SnmpSession) -> Result<f64, SnmpError> {
    let used = session.walk(&Oid::from_slice(HR_STORAGE_USED)).await?;
    let size = session.walk(&Oid::from_slice(HR_STORAGE_SIZE)).await?;

    let (Some((_, used)), Some((_, size))) = (used.first(), size.first()) else {
        return Ok(0.0);
    };
    match (used.as_i64(), size.as_i64()) {
        (Some(used), Some(size)) if size > 0 => Ok(used as f64 / size as f64 * 100.0),
        _ => Ok(0.0),
    }
}

/// One [`InterfaceStat`] per `ifDescr` row, in walk order.
///
/// Counters are read at positional indices `1..=N`, so agents with sparse
/// `ifIndex` values get counters from the wrong rows. After the first
/// timed-out read the remaining per-index reads are skipped and those
/// fields stay at zero / unknown.
pub async fn read_interfaces(
    session: &dyn SnmpSession,
    device_id: &str,
) -> Result<Vec<InterfaceStat>, SnmpError> {
    let descr = session.walk(&Oid::from_slice(IF_DESCR)).await?;
    let mut interfaces = Vec::with_capacity(descr.len());
    let mut reader = ColumnReader {
        session,
        device_id,
        stalled: false,
    };

    for (position, (_, value)) in descr.iter().enumerate() {
        let index = position as u32 + 1;
        let mut stat = InterfaceStat::named(value.as_text().unwrap_or_default());

        stat.in_bytes = reader.counter(IF_IN_OCTETS, index).await;
        stat.out_bytes = reader.counter(IF_OUT_OCTETS, index).await;
        stat.in_errors = reader.counter(IF_IN_ERRORS, index).await;
        stat.out_errors = reader.counter(IF_OUT_ERRORS, index).await;
        stat.status = reader
            .read(IF_OPER_STATUS, index)
            .await
            .and_then(|value| value.as_i64())
            .map(InterfaceStatus::from_oper_status)
            .unwrap_or_default();

        interfaces.push(stat);
    }

    Ok(interfaces)
}

/// Per-index scalar reads that give up once the agent stops answering.
struct ColumnReader<'a> {
    session: &'a dyn SnmpSession,
    device_id: &'a str,
    stalled: bool,
}

impl ColumnReader<'_> {
    async fn read(&mut self, column: &[u32], index: u32) -> Option<SnmpValue> {
        if self.stalled {
            return None;
        }
        let oid = Oid::from_slice(column).child(index);
        match self.session.get(&oid).await {
            Ok(value) => Some(value),
            Err(e @ SnmpError::Timeout { .. }) => {
                tracing::warn!(
                    device_id = self.device_id,
                    %oid,
                    error = %e,
                    "Agent stopped answering, skipping remaining interface reads"
                );
                self.stalled = true;
                None
            }
            Err(e) => {
                tracing::debug!(
                    device_id = self.device_id,
                    %oid,
                    error = %e,
                    "Interface read failed"
                );
                None
            }
        }
    }

    async fn counter(&mut self, column: &[u32], index: u32) -> u64 {
        self.read(column, index)
            .await
            .and_then(|value| value.as_u64())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::snmp::fake::FakeSession;

    fn agent() -> FakeSession {
        FakeSession::new()
            .set("1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(8_640_050))
            .set("1.3.6.1.2.1.25.3.3.1.2.196608", SnmpValue::Integer(10))
            .set("1.3.6.1.2.1.25.3.3.1.2.196609", SnmpValue::Integer(30))
            .set("1.3.6.1.2.1.25.2.3.1.5.1", SnmpValue::Integer(2000))
            .set("1.3.6.1.2.1.25.2.3.1.5.2", SnmpValue::Integer(100))
            .set("1.3.6.1.2.1.25.2.3.1.6.1", SnmpValue::Integer(500))
            .set("1.3.6.1.2.1.25.2.3.1.6.2", SnmpValue::Integer(100))
            .set("1.3.6.1.2.1.2.2.1.2.1", SnmpValue::OctetString(b"lo".to_vec()))
            .set("1.3.6.1.2.1.2.2.1.2.2", SnmpValue::OctetString(b"eth0".to_vec()))
            .set("1.3.6.1.2.1.2.2.1.8.1", SnmpValue::Integer(1))
            .set("1.3.6.1.2.1.2.2.1.8.2", SnmpValue::Integer(2))
            .set("1.3.6.1.2.1.2.2.1.10.1", SnmpValue::Counter32(100))
            .set("1.3.6.1.2.1.2.2.1.10.2", SnmpValue::Counter32(5000))
            .set("1.3.6.1.2.1.2.2.1.16.2", SnmpValue::Counter32(7000))
            .set("1.3.6.1.2.1.2.2.1.14.2", SnmpValue::Counter32(3))
    }

    #[tokio::test]
    async fn test_collect_full_agent() {
        let metrics = collect(&agent(), "dev-1").await;

        assert_eq!(metrics.uptime_seconds, 86_400);
        assert!((metrics.cpu_usage_pct - 20.0).abs() < 1e-9);
        assert!((metrics.memory_usage_pct - 25.0).abs() < 1e-9);
        assert_eq!(metrics.interfaces.len(), 2);

        let lo = &metrics.interfaces[0];
        assert_eq!(lo.name, "lo");
        assert_eq!(lo.in_bytes, 100);
        assert_eq!(lo.out_bytes, 0);
        assert_eq!(lo.status, InterfaceStatus::Up);

        let eth0 = &metrics.interfaces[1];
        assert_eq!(eth0.name, "eth0");
        assert_eq!(eth0.in_bytes, 5000);
        assert_eq!(eth0.out_bytes, 7000);
        assert_eq!(eth0.in_errors, 3);
        assert_eq!(eth0.status, InterfaceStatus::Down);
    }

    #[tokio::test]
    async fn test_cpu_empty_walk_is_zero() {
        let cpu = read_cpu_usage(&FakeSession::new()).await.unwrap();
        assert_eq!(cpu, 0.0);
    }

    #[tokio::test]
    async fn test_memory_zero_size() {
        let session = FakeSession::new()
            .set("1.3.6.1.2.1.25.2.3.1.5.1", SnmpValue::Integer(0))
            .set("1.3.6.1.2.1.25.2.3.1.6.1", SnmpValue::Integer(10));
        assert_eq!(read_memory_usage(&session).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_uptime_missing_is_error() {
        assert!(read_uptime(&FakeSession::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_status_read_failure_is_unknown() {
        let session = agent().reject("1.3.6.1.2.1.2.2.1.8");
        let interfaces = read_interfaces(&session, "dev-1").await.unwrap();
        assert!(
            interfaces
                .iter()
                .all(|i| i.status == InterfaceStatus::Unknown)
        );
        assert_eq!(interfaces[1].in_bytes, 5000);
    }

    #[tokio::test]
    async fn test_failed_part_leaves_others() {
        let session = agent().fail("1.3.6.1.2.1.25");
        let metrics = collect(&session, "dev-1").await;
        assert_eq!(metrics.cpu_usage_pct, 0.0);
        assert_eq!(metrics.memory_usage_pct, 0.0);
        assert_eq!(metrics.uptime_seconds, 86_400);
        assert_eq!(metrics.interfaces.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_stops_interface_reads() {
        let session = agent().fail("1.3.6.1.2.1.2.2.1.16");
        let interfaces = read_interfaces(&session, "dev-1").await.unwrap();

        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].in_bytes, 100);
        assert_eq!(interfaces[0].status, InterfaceStatus::Unknown);
        assert_eq!(interfaces[1].name, "eth0");
        assert_eq!(interfaces[1].in_bytes, 0);
        assert_eq!(interfaces[1].status, InterfaceStatus::Unknown);
        // ifDescr walk, ifInOctets.1, then the timed-out ifOutOctets.1.
        assert_eq!(session.request_count(), 3);
    }
}
