use std::collections::BTreeSet;

use crate::api::CandidatesCollection;

/// A frame of the rule call stack: the rule and the stream index of the
/// token it was entered at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleWithStartToken {
    pub start_token_index: usize,
    pub rule_index: usize,
}

/// Maps a chain of open rules to one of the caller's preferred rules.
pub struct RuleTranslator<'a> {
    preferred_rules: &'a BTreeSet<usize>,
    top_down: bool,
}

impl<'a> RuleTranslator<'a> {
    pub fn new(preferred_rules: &'a BTreeSet<usize>, top_down: bool) -> Self {
        RuleTranslator {
            preferred_rules,
            top_down,
        }
    }

    pub fn is_preferred(&self, rule_index: usize) -> bool {
        self.preferred_rules.contains(&rule_index)
    }

    /// Find the first preferred rule in `stack` and record it as a rule
    /// candidate. Top-down scans from the innermost frame, bottom-up from
    /// the outermost one. Returns true on a match, whether or not a new
    /// entry was added.
    pub fn translate_stack(
        &self,
        stack: &[RuleWithStartToken],
        candidates: &mut CandidatesCollection,
    ) -> bool {
        if self.preferred_rules.is_empty() {
            return false;
        }
        let found = if self.top_down {
            stack.iter().rposition(|f| self.is_preferred(f.rule_index))
        } else {
            stack.iter().position(|f| self.is_preferred(f.rule_index))
        };
        match found {
            Some(i) => {
                let frame = stack[i];
                let path = stack[..i].iter().map(|f| f.rule_index).collect();
                candidates.add_rule(frame.rule_index, frame.start_token_index, path);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(rules: &[usize]) -> Vec<RuleWithStartToken> {
        rules
            .iter()
            .enumerate()
            .map(|(i, &rule_index)| RuleWithStartToken {
                start_token_index: i * 10,
                rule_index,
            })
            .collect()
    }

    #[test]
    fn no_preferred_rules() {
        let pref = BTreeSet::new();
        let mut c = CandidatesCollection::default();
        assert!(!RuleTranslator::new(&pref, true).translate_stack(&stack(&[0, 1]), &mut c));
        assert!(c.rules.is_empty());
    }

    #[test]
    fn bottom_up_takes_outermost() {
        let pref = BTreeSet::from([1, 3]);
        let mut c = CandidatesCollection::default();
        let t = RuleTranslator::new(&pref, false);
        assert!(t.translate_stack(&stack(&[0, 1, 2, 3]), &mut c));
        assert_eq!(c.rules.len(), 1);
        assert_eq!(c.rules[&1].rule_list, vec![0]);
        assert_eq!(c.rules[&1].start_token_index, 10);
    }

    #[test]
    fn top_down_takes_innermost() {
        let pref = BTreeSet::from([1, 3]);
        let mut c = CandidatesCollection::default();
        let t = RuleTranslator::new(&pref, true);
        assert!(t.translate_stack(&stack(&[0, 1, 2, 3]), &mut c));
        assert_eq!(c.rules[&3].rule_list, vec![0, 1, 2]);
        assert_eq!(c.rules[&3].start_token_index, 30);
        // a repeated match reports success without a second entry
        assert!(t.translate_stack(&stack(&[0, 1, 2, 3]), &mut c));
        assert_eq!(c.rules.len(), 1);
    }

    #[test]
    fn no_match() {
        let pref = BTreeSet::from([7]);
        let mut c = CandidatesCollection::default();
        assert!(!RuleTranslator::new(&pref, false).translate_stack(&stack(&[0, 1]), &mut c));
    }
}
