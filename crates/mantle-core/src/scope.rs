use crate::graph::FlowNode;
use indexmap::IndexMap;

/// Identifiers that always stand for runtime-only facts (the machines a
/// build runs on, and the tool's own self object). They resolve to an
/// unknown value no matter what is recorded for them.
pub const IMPLICIT_IDENTIFIERS: [&str; 4] =
    ["mantle", "build_machine", "host_machine", "target_machine"];

pub fn is_implicit(name: &str) -> bool {
    IMPLICIT_IDENTIFIERS.contains(&name)
}

/// Flow-sensitive definition tracker.
///
/// For every variable this keeps the full list of `(control path,
/// definition)` pairs seen during traversal, where the control path is the
/// sequence of branch indices enclosing the definition site. Lookups scan in
/// reverse insertion order and return the first entry whose recorded path is
/// a prefix of the current path: shadowing by control position, not by block
/// scope. Entries are only appended (or pruned wholesale at branch joins by
/// the evaluator); nothing is ever overwritten in place.
#[derive(Debug, Default, Clone)]
pub struct Definitions {
    entries: IndexMap<String, Vec<(Vec<usize>, FlowNode)>>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, var: &str, path: &[usize], def: FlowNode) {
        self.entries
            .entry(var.to_string())
            .or_default()
            .push((path.to_vec(), def));
    }

    /// Last definition of `var` whose path is a prefix of `path`, if any.
    pub fn lookup(&self, var: &str, path: &[usize]) -> Option<FlowNode> {
        let entries = self.entries.get(var)?;
        entries
            .iter()
            .rev()
            .find(|(recorded, _)| {
                path.len() >= recorded.len() && &path[..recorded.len()] == recorded.as_slice()
            })
            .map(|(_, def)| *def)
    }

    /// Every variable a definition was ever recorded for, in first-seen
    /// order. Deterministic so branch-merge node creation is reproducible.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Remove and return (in insertion order) all definitions of `var`
    /// recorded strictly deeper than `depth` nesting levels. Used at branch
    /// join points: the per-arm entries go out of scope and become merge
    /// candidates.
    pub fn take_deeper_than(&mut self, var: &str, depth: usize) -> Vec<FlowNode> {
        let Some(entries) = self.entries.get_mut(var) else {
            return Vec::new();
        };
        let mut taken = Vec::new();
        entries.retain(|(path, def)| {
            if path.len() > depth {
                taken.push(*def);
                false
            } else {
                true
            }
        });
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UnknownId;
    use pretty_assertions::assert_eq;

    fn u(n: u32) -> FlowNode {
        FlowNode::Unknown(UnknownId(n))
    }

    #[test]
    fn lookup_prefers_latest_matching_prefix() {
        let mut defs = Definitions::new();
        defs.record("x", &[], u(0));
        defs.record("x", &[0], u(1));
        defs.record("x", &[1], u(2));

        // Inside the first branch arm both the outer and the arm-local
        // definition match; the arm-local one wins by recency.
        assert_eq!(defs.lookup("x", &[0]), Some(u(1)));
        assert_eq!(defs.lookup("x", &[0, 3]), Some(u(1)));
        // After the branch only the outer entry's path is still a prefix.
        assert_eq!(defs.lookup("x", &[]), Some(u(0)));
        assert_eq!(defs.lookup("y", &[]), None);
    }

    #[test]
    fn take_deeper_than_prunes_and_preserves_order() {
        let mut defs = Definitions::new();
        defs.record("x", &[], u(0));
        defs.record("x", &[0], u(1));
        defs.record("x", &[1, 0], u(2));

        let taken = defs.take_deeper_than("x", 0);
        assert_eq!(taken, vec![u(1), u(2)]);
        assert_eq!(defs.lookup("x", &[0]), Some(u(0)));
    }
}
