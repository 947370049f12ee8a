use crate::config::RuleConfig;
use crate::resolve::ParsedRuleConfig;
use crate::resolve::merge::merged_over;

use super::Rule;

/// Exclusive use of the rules an alias delegates to.
///
/// Acquiring marks every target as an alias target and lays the alias's
/// config over the target's. Dropping restores each target's config exactly
/// as it was, on success and on error alike.
///
/// Two delegations to the same target at the same time are not serialized:
/// the second snapshot would capture the first one's borrowed config.
pub(crate) struct AliasBorrow<I> {
    borrowed: Vec<(Rule<I>, ParsedRuleConfig)>,
}

impl<I> AliasBorrow<I> {
    pub fn acquire(targets: Vec<Rule<I>>, overrides: &RuleConfig) -> Self {
        let borrowed = targets
            .into_iter()
            .map(|rule| {
                let snapshot = rule.update_config(|config| {
                    config.values = merged_over(overrides, &config.values);
                    config.is_alias_target = true;
                });
                (rule, snapshot)
            })
            .collect();
        Self { borrowed }
    }
}

impl<I> Drop for AliasBorrow<I> {
    fn drop(&mut self) {
        for (rule, snapshot) in self.borrowed.drain(..) {
            rule.update_config(|config| *config = snapshot);
        }
    }
}
