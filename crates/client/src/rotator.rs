//! Round-robin target selection with an excluded set
//!
//! A peer that presented an invalid certificate is untrustworthy and
//! must not be retried, so excluded targets are skipped for the rest
//! of the client's lifetime. Once every target is excluded the rotator
//! reports exhaustion and the client stops attempting reconnection.

use std::collections::HashSet;

use tether_core::Target;

/// Pure round-robin scan: first non-excluded index starting from
/// `(current + 1) mod N`, wrapping around for up to N steps (so a sole
/// remaining target yields itself). Returns `None` when every target
/// is excluded.
pub fn next_index(targets: &[Target], current: usize, excluded: &HashSet<Target>) -> Option<usize> {
    let n = targets.len();
    (1..=n)
        .map(|step| (current + step) % n)
        .find(|&i| !excluded.contains(&targets[i]))
}

/// Rotates through the ordered candidate list
#[derive(Debug, Clone)]
pub struct TargetRotator {
    targets: Vec<Target>,
    current: usize,
    excluded: HashSet<Target>,
}

impl TargetRotator {
    /// The list must be non-empty (validated by the client config)
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets,
            current: 0,
            excluded: HashSet::new(),
        }
    }

    /// The target the client is currently pointed at
    pub fn current(&self) -> &Target {
        &self.targets[self.current]
    }

    /// Permanently exclude a target (bad certificate)
    pub fn exclude(&mut self, target: &Target) {
        self.excluded.insert(target.clone());
    }

    /// Move to the next non-excluded target; `None` means exhausted
    pub fn advance(&mut self) -> Option<&Target> {
        match next_index(&self.targets, self.current, &self.excluded) {
            Some(i) => {
                self.current = i;
                Some(&self.targets[i])
            }
            None => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.excluded.len() >= self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<Target> {
        vec![
            Target::new("a.example.com", 1000).unwrap(),
            Target::new("b.example.com", 1000).unwrap(),
            Target::new("c.example.com", 1000).unwrap(),
        ]
    }

    #[test]
    fn test_round_robin_order() {
        let mut rotator = TargetRotator::new(targets());
        assert_eq!(rotator.current().host, "a.example.com");
        assert_eq!(rotator.advance().unwrap().host, "b.example.com");
        assert_eq!(rotator.advance().unwrap().host, "c.example.com");
        assert_eq!(rotator.advance().unwrap().host, "a.example.com");
    }

    #[test]
    fn test_advance_skips_excluded() {
        let list = targets();
        let mut rotator = TargetRotator::new(list.clone());
        rotator.exclude(&list[1]);
        // From A, B is excluded, so advance yields C
        assert_eq!(rotator.advance().unwrap().host, "c.example.com");
    }

    #[test]
    fn test_sole_survivor_wraps_to_itself() {
        let list = targets();
        let mut rotator = TargetRotator::new(list.clone());
        rotator.exclude(&list[1]);
        rotator.exclude(&list[2]);
        // Only A remains and A is current: the wrap-around step finds A
        assert_eq!(rotator.advance().unwrap().host, "a.example.com");
    }

    #[test]
    fn test_exhaustion_when_all_excluded() {
        let list = targets();
        let mut rotator = TargetRotator::new(list.clone());
        for t in &list {
            rotator.exclude(t);
        }
        assert!(rotator.advance().is_none());
        assert!(rotator.is_exhausted());
    }

    #[test]
    fn test_single_target_reconnects_to_itself() {
        let mut rotator = TargetRotator::new(vec![Target::new("only.example.com", 9).unwrap()]);
        assert_eq!(rotator.advance().unwrap().host, "only.example.com");
    }

    #[test]
    fn test_next_index_never_rechecks_twice() {
        // Scanning [A, B, C] from current=0 visits 1, 2, 0 exactly once
        let list = targets();
        let excluded: HashSet<Target> = list.iter().cloned().collect();
        assert_eq!(next_index(&list, 0, &excluded), None);
        let excluded: HashSet<Target> = HashSet::new();
        assert_eq!(next_index(&list, 2, &excluded), Some(0));
    }
}
