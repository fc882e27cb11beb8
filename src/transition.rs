use std::fmt;

use crate::state::StateId;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TransitionId(pub usize);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// One execution of a label on a source state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    id: TransitionId,
    start: StateId,
    end: Option<StateId>,
    labels: Vec<String>,
    reached_new_value: bool,
    reached_error: bool,
}

impl Transition {
    pub fn new(id: TransitionId, start: StateId, label: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end: None,
            labels: vec![label.into()],
            reached_new_value: false,
            reached_error: false,
        }
    }

    pub fn id(&self) -> TransitionId {
        self.id
    }
    pub fn start(&self) -> StateId {
        self.start
    }
    pub fn end(&self) -> Option<StateId> {
        self.end
    }
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
    pub fn reached_new_value(&self) -> bool {
        self.reached_new_value
    }
    pub fn reached_error(&self) -> bool {
        self.reached_error
    }

    pub(crate) fn set_end(&mut self, end: StateId) {
        self.end = Some(end);
    }
    pub(crate) fn set_reached_new_value(&mut self, value: bool) {
        self.reached_new_value = value;
    }
    pub(crate) fn set_reached_error(&mut self, value: bool) {
        self.reached_error = value;
    }

    /// Synchronised products fire several labels at once.
    pub fn add_label(&mut self, label: impl Into<String>) {
        self.labels.push(label.into());
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = match self.end {
            Some(end) => end.to_string(),
            None => "?".to_string(),
        };
        write!(f, "{}: {} --[{}]--> {}", self.id, self.start, self.labels.join(", "), end)?;
        if self.reached_error {
            write!(f, " (error)")?;
        } else if self.reached_new_value {
            write!(f, " (new)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_display() {
        let mut t = Transition::new(TransitionId(4), StateId(1), "inc");
        assert_eq!(t.to_string(), "t4: s_1 --[inc]--> ?");
        t.set_end(StateId(2));
        t.set_reached_new_value(true);
        assert_eq!(t.to_string(), "t4: s_1 --[inc]--> s_2 (new)");
        t.add_label("tick");
        t.set_reached_error(true);
        assert_eq!(t.to_string(), "t4: s_1 --[inc, tick]--> s_2 (error)");
        assert_eq!(t.labels().len(), 2);
    }
}
