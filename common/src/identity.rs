/// Stable device identifier derived from the factory-burned MAC value.
///
/// The raw value is the 48-bit base MAC read from efuse, widened to 64 bits.
/// Rendering matches the label printed on deployed units: `ESP32-` followed
/// by the high 16 bits and low 32 bits as uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    label: String,
}

impl DeviceIdentity {
    pub fn from_hardware_id(raw: u64) -> Self {
        let high = ((raw >> 32) & 0xFFFF) as u16;
        let low = raw as u32;
        Self {
            label: format!("ESP32-{high:04X}{low:08X}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl core::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn same_hardware_id_yields_same_label() {
        let a = DeviceIdentity::from_hardware_id(0x1234_89AB_CDEF_0011);
        let b = DeviceIdentity::from_hardware_id(0x1234_89AB_CDEF_0011);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn label_has_fixed_prefix_and_width() {
        let id = DeviceIdentity::from_hardware_id(0x0000_00AB_0000_0001);
        assert_eq!(id.as_str(), "ESP32-00AB00000001");
        assert_eq!(id.as_str().len(), "ESP32-".len() + 12);
        assert!(id.as_str().starts_with("ESP32-"));
    }

    #[test]
    fn upper_sixteen_bits_above_the_mac_are_ignored() {
        // Only bits 47..0 are meaningful for a 48-bit MAC.
        let a = DeviceIdentity::from_hardware_id(0x0000_1234_5678_9ABC);
        let b = DeviceIdentity::from_hardware_id(0xFFFF_1234_5678_9ABC);
        assert_eq!(a, b);
    }
}
