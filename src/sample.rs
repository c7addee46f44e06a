use serde::{Deserialize, Serialize};

/// Machine resource usage at one instant.
///
/// Field names and units are what the collector expects on the wire:
/// milliseconds since epoch, integer percent, byte deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: i64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub cpu_percent: u8,
    pub mem_percent: u8,
    pub disk_percent: u8,
    pub disk_read: u64,
    pub disk_write: u64,
    pub net_recv: u64,
    pub net_send: u64,
}

/// Raw values read from a platform in one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub timestamp: i64,
    pub load: [f64; 3],
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub net_recv_bytes: u64,
    pub net_send_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_collector_field_names() {
        let sample = Sample {
            timestamp: 1_735_984_800_000,
            load1: 0.5,
            load5: 0.6,
            load15: 0.7,
            cpu_percent: 13,
            mem_percent: 58,
            disk_percent: 76,
            disk_read: 100,
            disk_write: 200,
            net_recv: 3,
            net_send: 4,
        };
        let json = serde_json::to_string(&sample).expect("serialize");
        assert_eq!(
            json,
            r#"{"timestamp":1735984800000,"load1":0.5,"load5":0.6,"load15":0.7,"cpuPercent":13,"memPercent":58,"diskPercent":76,"diskRead":100,"diskWrite":200,"netRecv":3,"netSend":4}"#
        );
    }
}
