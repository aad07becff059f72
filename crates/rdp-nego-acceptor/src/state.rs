use rdp_nego_pdu::nego::SecurityProtocol;

/// Acceptor state. Unlike the client's fallback ladder there is no trial
/// sequence here: one Connection Request comes in, one Connection Confirm
/// goes out, and the acceptor is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Initial,
    Fail,
    Final,
}

/// Which protocols the server's policy allows.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnabledProtocols {
    pub nla: bool,
    pub tls: bool,
    pub rdp: bool,
}

/// Strongest protocol present in both what the client requested and what the
/// server allows, in NLA-before-TLS precedence. `None` when the client asked
/// for TLS and/or NLA but the server's policy has no overlap with either.
pub(crate) fn strongest_common(requested: SecurityProtocol, enabled: EnabledProtocols) -> Option<SecurityProtocol> {
    if requested.contains(SecurityProtocol::NLA) && enabled.nla {
        Some(SecurityProtocol::NLA)
    } else if requested.contains(SecurityProtocol::TLS) && enabled.tls {
        Some(SecurityProtocol::TLS)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: EnabledProtocols = EnabledProtocols {
        nla: true,
        tls: true,
        rdp: true,
    };

    #[test]
    fn prefers_nla_over_tls_when_both_requested_and_enabled() {
        let requested = SecurityProtocol::NLA | SecurityProtocol::TLS;
        assert_eq!(strongest_common(requested, ALL), Some(SecurityProtocol::NLA));
    }

    #[test]
    fn falls_back_to_tls_when_nla_not_enabled() {
        let requested = SecurityProtocol::NLA | SecurityProtocol::TLS;
        let enabled = EnabledProtocols {
            nla: false,
            tls: true,
            rdp: true,
        };
        assert_eq!(strongest_common(requested, enabled), Some(SecurityProtocol::TLS));
    }

    #[test]
    fn no_overlap_returns_none() {
        let requested = SecurityProtocol::NLA | SecurityProtocol::TLS;
        let enabled = EnabledProtocols {
            nla: false,
            tls: false,
            rdp: true,
        };
        assert_eq!(strongest_common(requested, enabled), None);
    }
}
