//! Scenario - a named, ordered list of steps

use crate::step::Step;

/// Format tag written to documents
pub const FORMAT_VERSION: &str = "1.2";

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Identity and storage key
    pub name: String,
    pub description: String,
    /// Execution order
    pub steps: Vec<Step>,
    pub version: String,
    /// Set by the store on save
    pub saved_at: Option<String>,
    /// Loop count used when a run does not specify one
    pub loops: Option<u32>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            version: FORMAT_VERSION.to_string(),
            saved_at: None,
            loops: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Insert at `index`, clamped to the end of the list. Returns where the
    /// step landed.
    pub fn insert(&mut self, index: usize, step: Step) -> usize {
        let index = index.min(self.steps.len());
        self.steps.insert(index, step);
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<Step> {
        (index < self.steps.len()).then(|| self.steps.remove(index))
    }

    /// Replace the step at `index`, returning the old one.
    pub fn replace(&mut self, index: usize, step: Step) -> Option<Step> {
        let slot = self.steps.get_mut(index)?;
        Some(std::mem::replace(slot, step))
    }

    /// Swap with the previous step. Returns the new index, or `None` at the top.
    pub fn move_up(&mut self, index: usize) -> Option<usize> {
        if index == 0 || index >= self.steps.len() {
            return None;
        }
        self.steps.swap(index, index - 1);
        Some(index - 1)
    }

    /// Swap with the next step. Returns the new index, or `None` at the bottom.
    pub fn move_down(&mut self, index: usize) -> Option<usize> {
        if index + 1 >= self.steps.len() {
            return None;
        }
        self.steps.swap(index, index + 1);
        Some(index + 1)
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Action, Step};

    fn press(key: &str) -> Step {
        Step::new(Action::Press { key: key.to_string() })
    }

    fn keys(s: &Scenario) -> Vec<String> {
        s.steps
            .iter()
            .map(|st| match &st.action {
                Action::Press { key } => key.clone(),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn edit_operations() {
        let mut s = Scenario::new("demo");
        s.push(press("a"));
        s.push(press("b"));
        s.push(press("c"));

        assert_eq!(s.move_up(2), Some(1));
        assert_eq!(keys(&s), ["a", "c", "b"]);
        assert_eq!(s.move_up(0), None);
        assert_eq!(s.move_down(2), None);
        assert_eq!(s.move_down(0), Some(1));
        assert_eq!(keys(&s), ["c", "a", "b"]);

        assert_eq!(s.insert(99, press("z")), 3);
        assert!(s.remove(10).is_none());
        assert_eq!(s.remove(0).map(|st| st.name), Some("Press key: c".to_string()));
        assert!(s.replace(0, press("q")).is_some());
        assert_eq!(keys(&s), ["q", "b", "z"]);

        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn new_scenario_defaults() {
        let s = Scenario::new("x").description("does things");
        assert_eq!(s.version, FORMAT_VERSION);
        assert_eq!(s.description, "does things");
        assert!(s.saved_at.is_none());
    }
}
