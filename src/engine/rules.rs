use tracing::info;

use super::{Engine, EngineError};
use crate::limits::{MAX_RULES_PER_CATEGORY, MAX_RULE_NAME_LEN};
use crate::model::*;
use crate::store::{Store, StoreError};

/// How a rule set treats one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    /// Inside at least one open window and no blocked one.
    Open,
    /// Inside a blocked window. Blocked dominates open.
    Blocked { rule: String },
    /// Inside no window at all.
    OutOfHours,
}

/// Evaluate `t` against a category's rules.
///
/// When several blocked windows match, the first one in (start, end, name)
/// order is reported, whatever order `rules` arrives in.
pub fn evaluate(rules: &[TimeRule], t: TimeOfDay) -> RuleMatch {
    let mut matched = false;
    let mut blocking: Option<&TimeRule> = None;

    for rule in rules.iter().filter(|r| r.window.contains(t)) {
        matched = true;
        if rule.blocked && blocking.is_none_or(|b| rule.sort_key() < b.sort_key()) {
            blocking = Some(rule);
        }
    }

    match blocking {
        Some(rule) => RuleMatch::Blocked {
            rule: rule.name.clone(),
        },
        None if matched => RuleMatch::Open,
        None => RuleMatch::OutOfHours,
    }
}

fn check_rule(name: &str, start: TimeOfDay, end: TimeOfDay) -> Result<Window, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidRule("name must not be empty".into()));
    }
    if name.len() > MAX_RULE_NAME_LEN {
        return Err(EngineError::LimitExceeded("rule name too long"));
    }
    Window::try_new(start, end).ok_or_else(|| {
        EngineError::InvalidRule(format!("{name}: start {start} must be before end {end}"))
    })
}

impl<S: Store> Engine<S> {
    /// All rules of `category`, ordered by start, end, then name.
    pub async fn windows_for(&self, category: Category) -> Result<Vec<TimeRule>, EngineError> {
        Ok(self.store.list_rules(category).await?)
    }

    pub async fn is_blocked(&self, category: Category, t: TimeOfDay) -> Result<RuleMatch, EngineError> {
        let rules = self.windows_for(category).await?;
        Ok(evaluate(&rules, t))
    }

    pub async fn create_rule(
        &self,
        category: Category,
        name: &str,
        start: TimeOfDay,
        end: TimeOfDay,
        blocked: bool,
    ) -> Result<TimeRule, EngineError> {
        let window = check_rule(name, start, end)?;
        if self.store.list_rules(category).await?.len() >= MAX_RULES_PER_CATEGORY {
            return Err(EngineError::LimitExceeded("too many rules in category"));
        }
        let rule = TimeRule::new(category, name.trim(), window, blocked);
        match self.store.create_rule(rule.clone()).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation { .. }) => {
                return Err(EngineError::DuplicateRule {
                    category,
                    name: rule.name,
                });
            }
            Err(e) => return Err(e.into()),
        }
        info!(%category, name = %rule.name, window = %rule.window, blocked, "rule created");
        Ok(rule)
    }

    /// Replace the window and blocked flag of an existing rule.
    pub async fn update_rule(
        &self,
        category: Category,
        name: &str,
        start: TimeOfDay,
        end: TimeOfDay,
        blocked: bool,
    ) -> Result<TimeRule, EngineError> {
        let window = check_rule(name, start, end)?;
        let name = name.trim();
        let existing = self
            .store
            .list_rules(category)
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("rule {category}/{name}")))?;
        let rule = TimeRule {
            window,
            blocked,
            ..existing
        };
        self.store.update_rule(rule.clone()).await?;
        info!(%category, name, window = %rule.window, blocked, "rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, category: Category, name: &str) -> Result<TimeRule, EngineError> {
        let removed = self.store.delete_rule(category, name.trim()).await?;
        info!(%category, name = %removed.name, "rule deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn rule(name: &str, start: &str, end: &str, blocked: bool) -> TimeRule {
        TimeRule::new(Category::Weekday, name, Window::new(t(start), t(end)), blocked)
    }

    #[test]
    fn blocked_dominates_open() {
        let rules = [rule("Day", "08:00", "18:00", false), rule("Lunch", "12:00", "13:00", true)];
        assert_eq!(
            evaluate(&rules, t("12:30")),
            RuleMatch::Blocked { rule: "Lunch".into() }
        );
        assert_eq!(evaluate(&rules, t("13:00")), RuleMatch::Open);
        assert_eq!(evaluate(&rules, t("11:59")), RuleMatch::Open);
    }

    #[test]
    fn outside_every_window() {
        let rules = [rule("Day", "08:00", "18:00", false)];
        assert_eq!(evaluate(&rules, t("18:00")), RuleMatch::OutOfHours);
        assert_eq!(evaluate(&rules, t("07:59")), RuleMatch::OutOfHours);
        assert_eq!(evaluate(&[], t("10:00")), RuleMatch::OutOfHours);
    }

    #[test]
    fn blocked_window_alone_still_blocks() {
        let rules = [rule("Maintenance", "10:00", "11:00", true)];
        assert_eq!(
            evaluate(&rules, t("10:30")),
            RuleMatch::Blocked { rule: "Maintenance".into() }
        );
    }

    #[test]
    fn overlapping_blocks_report_earliest_rule() {
        let rules = [
            rule("Vet", "12:30", "14:00", true),
            rule("Lunch", "12:00", "13:00", true),
            rule("Day", "08:00", "18:00", false),
        ];
        assert_eq!(
            evaluate(&rules, t("12:45")),
            RuleMatch::Blocked { rule: "Lunch".into() }
        );
        let same_window = [rule("b", "12:00", "13:00", true), rule("a", "12:00", "13:00", true)];
        assert_eq!(
            evaluate(&same_window, t("12:00")),
            RuleMatch::Blocked { rule: "a".into() }
        );
    }

    #[test]
    fn rule_checks() {
        assert!(check_rule("Lunch", t("12:00"), t("13:00")).is_ok());
        assert!(matches!(
            check_rule("Lunch", t("13:00"), t("12:00")),
            Err(EngineError::InvalidRule(_))
        ));
        assert!(matches!(
            check_rule("Lunch", t("12:00"), t("12:00")),
            Err(EngineError::InvalidRule(_))
        ));
        assert!(matches!(
            check_rule("   ", t("12:00"), t("13:00")),
            Err(EngineError::InvalidRule(_))
        ));
        let long = "x".repeat(MAX_RULE_NAME_LEN + 1);
        assert!(matches!(
            check_rule(&long, t("12:00"), t("13:00")),
            Err(EngineError::LimitExceeded(_))
        ));
    }
}
