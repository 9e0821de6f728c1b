//! LLDP-MIB neighbor extraction.
//!
//! Remote-table columns are joined on their `timeMark.localPortNum.remIndex`
//! instance suffix, so the result does not depend on the order in which an
//! agent returns each column.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use super::{Oid, SnmpSession, SnmpValue};
use crate::model::Neighbor;

/// lldpRemChassisId column.
pub const LLDP_REM_CHASSIS_ID: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 5];
/// lldpRemPortId column.
pub const LLDP_REM_PORT_ID: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 7];
/// lldpRemSysName column.
pub const LLDP_REM_SYS_NAME: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 9];
/// lldpRemManAddrIfSubtype column; the address itself lives in the index.
pub const LLDP_REM_MAN_ADDR_IF_SUBTYPE: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 2, 1, 3];
/// lldpLocPortId column, indexed by localPortNum.
pub const LLDP_LOC_PORT_ID: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 3, 7, 1, 3];

pub const LINK_TYPE_ETHERNET: &str = "ethernet";

/// IANA address family number for IPv4.
const ADDRESS_FAMILY_IPV4: u32 = 1;

/// `(timeMark, localPortNum, remIndex)`.
type RemoteKey = (u32, u32, u32);

/// Raw walks of the LLDP columns used for correlation.
#[derive(Debug, Clone, Default)]
pub struct LldpTables {
    pub chassis_ids: Vec<(Oid, SnmpValue)>,
    pub port_ids: Vec<(Oid, SnmpValue)>,
    pub sys_names: Vec<(Oid, SnmpValue)>,
    pub local_ports: Vec<(Oid, SnmpValue)>,
    pub management: Vec<(Oid, SnmpValue)>,
}

/// Walk the LLDP tables and correlate them into neighbors.
///
/// A failed chassis walk means LLDP is unsupported and yields no neighbors.
/// Failures on the other columns leave the matching fields empty.
pub async fn read_neighbors(session: &dyn SnmpSession, device_id: &str) -> Vec<Neighbor> {
    let chassis_ids = match session.walk(&Oid::from_slice(LLDP_REM_CHASSIS_ID)).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!(device_id, error = %e, "LLDP not available");
            return Vec::new();
        }
    };
    if chassis_ids.is_empty() {
        return Vec::new();
    }

    let tables = LldpTables {
        chassis_ids,
        port_ids: walk_optional(session, LLDP_REM_PORT_ID, device_id).await,
        sys_names: walk_optional(session, LLDP_REM_SYS_NAME, device_id).await,
        local_ports: walk_optional(session, LLDP_LOC_PORT_ID, device_id).await,
        management: walk_optional(session, LLDP_REM_MAN_ADDR_IF_SUBTYPE, device_id).await,
    };
    correlate(&tables)
}

async fn walk_optional(
    session: &dyn SnmpSession,
    column: &[u32],
    device_id: &str,
) -> Vec<(Oid, SnmpValue)> {
    let base = Oid::from_slice(column);
    match session.walk(&base).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!(device_id, column = %base, error = %e, "LLDP column walk failed");
            Vec::new()
        }
    }
}

fn remote_key(oid: &Oid, column: &[u32]) -> Option<RemoteKey> {
    let suffix = oid.suffix(&Oid::from_slice(column))?;
    match suffix {
        [.., time_mark, local_port, rem_index] => Some((*time_mark, *local_port, *rem_index)),
        _ => None,
    }
}

fn keyed_text(
    rows: &[(Oid, SnmpValue)],
    column: &[u32],
    render: fn(&SnmpValue) -> Option<String>,
) -> HashMap<RemoteKey, String> {
    rows.iter()
        .filter_map(|(oid, value)| Some((remote_key(oid, column)?, render(value)?)))
        .collect()
}

fn management_addresses(rows: &[(Oid, SnmpValue)]) -> HashMap<RemoteKey, String> {
    let base = Oid::from_slice(LLDP_REM_MAN_ADDR_IF_SUBTYPE);
    let mut addresses = HashMap::new();
    for (oid, _) in rows {
        let Some(suffix) = oid.suffix(&base) else {
            continue;
        };
        // timeMark.localPortNum.remIndex.addrSubtype.addrLen.addr...
        if let [tm, lp, ri, family, 4, a, b, c, d, ..] = suffix {
            if *family != ADDRESS_FAMILY_IPV4 {
                continue;
            }
            let octets = [*a, *b, *c, *d].map(|arc| u8::try_from(arc).ok());
            if let [Some(a), Some(b), Some(c), Some(d)] = octets {
                addresses
                    .entry((*tm, *lp, *ri))
                    .or_insert_with(|| Ipv4Addr::new(a, b, c, d).to_string());
            }
        }
    }
    addresses
}

/// Join the walked columns into one [`Neighbor`] per chassis-id row.
pub fn correlate(tables: &LldpTables) -> Vec<Neighbor> {
    let port_ids = keyed_text(&tables.port_ids, LLDP_REM_PORT_ID, SnmpValue::as_identifier);
    let sys_names = keyed_text(&tables.sys_names, LLDP_REM_SYS_NAME, SnmpValue::as_text);
    let addresses = management_addresses(&tables.management);

    let local_base = Oid::from_slice(LLDP_LOC_PORT_ID);
    let local_ports: HashMap<u32, String> = tables
        .local_ports
        .iter()
        .filter_map(|(oid, value)| match oid.suffix(&local_base)? {
            [port_num] => Some((*port_num, value.as_identifier()?)),
            _ => None,
        })
        .collect();

    tables
        .chassis_ids
        .iter()
        .filter_map(|(oid, value)| {
            let key = remote_key(oid, LLDP_REM_CHASSIS_ID)?;
            let (_, local_port_num, _) = key;
            Some(Neighbor {
                local_port: local_ports
                    .get(&local_port_num)
                    .cloned()
                    .unwrap_or_else(|| local_port_num.to_string()),
                remote_port: port_ids.get(&key).cloned().unwrap_or_default(),
                remote_chassis_id: value.as_identifier().unwrap_or_default(),
                remote_system_name: sys_names.get(&key).cloned().unwrap_or_default(),
                remote_address: addresses.get(&key).cloned(),
                link_type: LINK_TYPE_ETHERNET.to_string(),
            })
        })
        .collect()
}
