use bitflags::bitflags;
use rdp_nego_pdu::nego::{ResponseFlags, SecurityProtocol};

bitflags! {
    /// Legacy (pre-TLS) RDP encryption methods, populated only when
    /// Standard RDP Security was selected.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EncryptionMethod: u32 {
        const FORTY_BIT = 0x0000_0001;
        const ONE_TWENTY_EIGHT_BIT = 0x0000_0002;
        const FIPS = 0x0000_0010;
    }
}

/// `ENCRYPTION_LEVEL` as used by the legacy RDP security layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionLevel {
    ClientCompatible,
}

/// Legacy encryption fields populated in [`Settings`] when the negotiator
/// selects Standard RDP Security. Negotiation never exchanges these over the
/// wire itself; they describe what the (out-of-scope) connection sequence
/// that follows would need to set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionSettings {
    pub enabled: bool,
    pub methods: EncryptionMethod,
    pub level: EncryptionLevel,
}

/// What the negotiator decided, handed to the caller after `connect()`
/// succeeds.
#[derive(Debug, Clone)]
pub struct Settings {
    pub requested_protocols: SecurityProtocol,
    pub selected_protocol: SecurityProtocol,
    pub flags: ResponseFlags,
    pub encryption: Option<EncryptionSettings>,
}

/// Pure function from the negotiation outcome to the settings delta: kept
/// separate from the state machine so it can be tested without a transport.
pub fn derive_settings(requested: SecurityProtocol, selected: SecurityProtocol, flags: ResponseFlags) -> Settings {
    let encryption = (selected == SecurityProtocol::RDP).then_some(EncryptionSettings {
        enabled: true,
        methods: EncryptionMethod::FORTY_BIT | EncryptionMethod::ONE_TWENTY_EIGHT_BIT | EncryptionMethod::FIPS,
        level: EncryptionLevel::ClientCompatible,
    });

    Settings {
        requested_protocols: requested,
        selected_protocol: selected,
        flags,
        encryption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdp_selection_populates_legacy_encryption() {
        let settings = derive_settings(SecurityProtocol::RDP, SecurityProtocol::RDP, ResponseFlags::empty());
        let encryption = settings.encryption.expect("RDP selection always sets encryption fields");
        assert!(encryption.enabled);
        assert_eq!(
            encryption.methods,
            EncryptionMethod::FORTY_BIT | EncryptionMethod::ONE_TWENTY_EIGHT_BIT | EncryptionMethod::FIPS
        );
    }

    #[test]
    fn tls_selection_has_no_legacy_encryption() {
        let settings = derive_settings(
            SecurityProtocol::TLS,
            SecurityProtocol::TLS,
            ResponseFlags::EXTENDED_CLIENT_DATA_SUPPORTED,
        );
        assert!(settings.encryption.is_none());
    }
}
