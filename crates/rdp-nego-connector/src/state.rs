/// Negotiation state. Illegal transitions (e.g. `TryRdp` back to `TryNla`) are
/// unrepresentable: every transition is computed by [`initial_state`] or
/// [`fallback`] rather than by mutating a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Initial,
    TryNla,
    TryTls,
    TryRdp,
    Fail,
    Final,
}

/// Which protocols the caller has enabled, after collapsing per
/// `security_layer_negotiation_enabled`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnabledProtocols {
    pub nla: bool,
    pub tls: bool,
    pub rdp: bool,
}

/// First state to attempt, in strict NLA-before-TLS-before-RDP precedence.
pub(crate) fn initial_state(enabled: EnabledProtocols) -> NegotiationState {
    if enabled.nla {
        NegotiationState::TryNla
    } else if enabled.tls {
        NegotiationState::TryTls
    } else if enabled.rdp {
        NegotiationState::TryRdp
    } else {
        NegotiationState::Fail
    }
}

/// Next tier to try after `tier` was rejected (TCP disconnected, no success).
/// `TryRdp` has no fallback: the caller must leave the post-receive state as is.
pub(crate) fn fallback(tier: NegotiationState, enabled: EnabledProtocols) -> NegotiationState {
    match tier {
        NegotiationState::TryNla => {
            if enabled.tls {
                NegotiationState::TryTls
            } else if enabled.rdp {
                NegotiationState::TryRdp
            } else {
                NegotiationState::Fail
            }
        }
        NegotiationState::TryTls => {
            if enabled.rdp {
                NegotiationState::TryRdp
            } else {
                NegotiationState::Fail
            }
        }
        NegotiationState::Initial | NegotiationState::TryRdp | NegotiationState::Fail | NegotiationState::Final => {
            NegotiationState::Fail
        }
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
    const NONE: EnabledProtocols = EnabledProtocols {
        nla: false,
        tls: false,
        rdp: false,
    };

    #[test]
    fn initial_state_prefers_nla_then_tls_then_rdp() {
        assert_eq!(initial_state(ALL), NegotiationState::TryNla);
        assert_eq!(
            initial_state(EnabledProtocols {
                nla: false,
                tls: true,
                rdp: true
            }),
            NegotiationState::TryTls
        );
        assert_eq!(
            initial_state(EnabledProtocols {
                nla: false,
                tls: false,
                rdp: true
            }),
            NegotiationState::TryRdp
        );
        assert_eq!(initial_state(NONE), NegotiationState::Fail);
    }

    #[test]
    fn fallback_skips_disabled_tiers() {
        assert_eq!(fallback(NegotiationState::TryNla, ALL), NegotiationState::TryTls);
        assert_eq!(
            fallback(
                NegotiationState::TryNla,
                EnabledProtocols {
                    nla: true,
                    tls: false,
                    rdp: true
                }
            ),
            NegotiationState::TryRdp
        );
        assert_eq!(
            fallback(
                NegotiationState::TryNla,
                EnabledProtocols {
                    nla: true,
                    tls: false,
                    rdp: false
                }
            ),
            NegotiationState::Fail
        );
        assert_eq!(fallback(NegotiationState::TryTls, ALL), NegotiationState::TryRdp);
        assert_eq!(
            fallback(
                NegotiationState::TryTls,
                EnabledProtocols {
                    nla: false,
                    tls: true,
                    rdp: false
                }
            ),
            NegotiationState::Fail
        );
    }

    #[test]
    fn try_rdp_never_falls_back() {
        assert_eq!(fallback(NegotiationState::TryRdp, ALL), NegotiationState::Fail);
    }
}
