//! Machine inventory records
//!
//! These are serialized as JSON under the machine key prefix, so the field
//! names below are part of the stored format.

use serde::{Deserialize, Serialize};

/// Hardware shape of a physical host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineSpec {
    /// Number of CPU cores
    pub core: i32,
    /// DRAM in MB
    pub memory: i64,
    /// Local disk in GB
    pub disk: i64,
}

/// A physical host in the cluster.
///
/// `mac` is the identity used for the store key. `name` and `ipv4_addr` are
/// not unique, but the upsert path treats a match on any of the three as the
/// same machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Machine {
    /// MAC address of the boot interface
    pub mac: String,
    /// Human-friendly label
    pub name: String,
    /// Dotted-decimal IPv4 address
    pub ipv4_addr: String,
    /// Unix time (seconds) the host was deployed
    pub deployed_date: i64,
    pub spec: MachineSpec,
}

impl Machine {
    pub fn new(
        mac: impl Into<String>,
        name: impl Into<String>,
        ipv4_addr: impl Into<String>,
    ) -> Self {
        Self {
            mac: mac.into(),
            name: name.into(),
            ipv4_addr: ipv4_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_spec(mut self, spec: MachineSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_deployed_date(mut self, deployed_date: i64) -> Self {
        self.deployed_date = deployed_date;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine1() -> Machine {
        Machine::new("mac1", "machine1", "19.168.0.2")
            .with_deployed_date(1_601_510_400)
            .with_spec(MachineSpec {
                core: 4,
                memory: 2048,
                disk: 128,
            })
    }

    #[test]
    fn test_machine_serialize_field_names() {
        let value = serde_json::to_value(machine1()).unwrap();
        assert_eq!(value["mac"], "mac1");
        assert_eq!(value["name"], "machine1");
        assert_eq!(value["ipv4_addr"], "19.168.0.2");
        assert_eq!(value["deployed_date"], 1_601_510_400);
        assert_eq!(value["spec"]["core"], 4);
        assert_eq!(value["spec"]["memory"], 2048);
        assert_eq!(value["spec"]["disk"], 128);
    }

    #[test]
    fn test_machine_deserialize() {
        let json = r#"{
            "mac": "aa:bb",
            "name": "h1",
            "ipv4_addr": "10.0.0.1",
            "deployed_date": 0,
            "spec": { "core": 4, "memory": 2048, "disk": 128 }
        }"#;
        let machine: Machine = serde_json::from_str(json).unwrap();
        assert_eq!(machine.mac, "aa:bb");
        assert_eq!(machine.spec.memory, 2048);
    }

    #[test]
    fn test_machine_deserialize_rejects_missing_fields() {
        let json = r#"{ "mac": "aa:bb" }"#;
        assert!(serde_json::from_str::<Machine>(json).is_err());
    }

    #[test]
    fn test_machine_equality_is_field_wise() {
        let a = machine1();
        let mut b = machine1();
        assert_eq!(a, b);

        b.spec.disk = 256;
        assert_ne!(a, b);
    }
}
