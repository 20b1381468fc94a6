use crate::config::EngineConfig;
use crate::model::TimeOfDay;

/// Morning gate: when enabled, any time before `cutoff` needs manual approval.
///
/// Independent of the rule set, so an otherwise open slot can still be gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    enabled: bool,
    cutoff: TimeOfDay,
}

impl ApprovalPolicy {
    pub const DISABLED: ApprovalPolicy = ApprovalPolicy {
        enabled: false,
        cutoff: TimeOfDay::NOON,
    };

    pub fn new(enabled: bool, cutoff: TimeOfDay) -> Self {
        Self { enabled, cutoff }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.approval_enabled, config.approval_cutoff)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn cutoff(&self) -> TimeOfDay {
        self.cutoff
    }

    pub fn requires_approval(&self, t: TimeOfDay) -> bool {
        self.enabled && t < self.cutoff
    }
}

impl<S: crate::store::Store> super::Engine<S> {
    pub fn approval_policy(&self) -> ApprovalPolicy {
        self.approval
    }

    pub fn requires_approval(&self, t: TimeOfDay) -> bool {
        self.approval.requires_approval(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn morning_needs_approval_when_enabled() {
        let policy = ApprovalPolicy::new(true, t("12:00"));
        assert!(policy.requires_approval(t("09:00")));
        assert!(policy.requires_approval(t("11:59")));
        assert!(!policy.requires_approval(t("12:00")));
        assert!(!policy.requires_approval(t("14:00")));
    }

    #[test]
    fn disabled_never_requires_approval() {
        for s in ["00:00", "06:30", "11:59", "18:00"] {
            assert!(!ApprovalPolicy::DISABLED.requires_approval(t(s)));
            assert!(!ApprovalPolicy::new(false, t("23:59")).requires_approval(t(s)));
        }
    }

    #[test]
    fn built_from_config() {
        let config = EngineConfig {
            approval_enabled: true,
            approval_cutoff: t("10:00"),
            ..EngineConfig::default()
        };
        let policy = ApprovalPolicy::from_config(&config);
        assert!(policy.enabled());
        assert_eq!(policy.cutoff(), t("10:00"));
    }
}
