//! Conversation-scoped discovery state.
//!
//! One entry per in-flight loop, created at loop start and removed at
//! loop end. Workers on different conversations never observe each
//! other's entries.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use tracing::debug;

use crate::tools::ToolCallback;

/// Discovery state for one conversation loop.
pub struct SessionState {
    /// Full callbacks configured on the inbound request, keyed by name.
    pub callbacks: HashMap<String, Arc<dyn ToolCallback>>,
    /// Ordered set of tool names the model has named through search.
    pub discovered: Vec<String>,
}

impl SessionState {
    pub fn new(callbacks: HashMap<String, Arc<dyn ToolCallback>>) -> Self {
        Self {
            callbacks,
            discovered: Vec::new(),
        }
    }

    /// Fold newly named tools into the discovered set.
    ///
    /// Accumulating mode unions, preserving first-seen order;
    /// non-accumulating mode replaces the set with the latest names.
    /// Names with no registered callback are dropped here, so everything
    /// in `discovered` is promotable.
    pub fn promote(&mut self, names: Vec<String>, accumulate: bool) {
        let known: Vec<String> = names
            .into_iter()
            .filter(|name| {
                let registered = self.callbacks.contains_key(name);
                if !registered {
                    debug!(tool = %name, "dropping search result with no registered callback");
                }
                registered
            })
            .collect();

        if accumulate {
            for name in known {
                if !self.discovered.contains(&name) {
                    self.discovered.push(name);
                }
            }
        } else {
            self.discovered = known;
        }
    }

    /// Callback handles for the discovered set, in discovery order.
    pub fn discovered_callbacks(&self) -> Vec<Arc<dyn ToolCallback>> {
        self.discovered
            .iter()
            .filter_map(|name| self.callbacks.get(name).cloned())
            .collect()
    }
}

pub type SessionRegistry = Arc<Mutex<HashMap<String, SessionState>>>;

pub fn new_registry() -> SessionRegistry {
    Arc::new(Mutex::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;

    fn callbacks(names: &[&str]) -> HashMap<String, Arc<dyn ToolCallback>> {
        names
            .iter()
            .map(|name| {
                let callback: Arc<dyn ToolCallback> = Arc::new(FunctionTool::simple(
                    *name,
                    format!("{name} description"),
                    |_| Ok(String::new()),
                ));
                (name.to_string(), callback)
            })
            .collect()
    }

    #[test]
    fn accumulating_mode_unions_in_order() {
        let mut state = SessionState::new(callbacks(&["weather", "currentTime", "clothing"]));

        state.promote(vec!["currentTime".to_string()], true);
        state.promote(vec!["weather".to_string(), "currentTime".to_string()], true);

        assert_eq!(state.discovered, vec!["currentTime", "weather"]);
    }

    #[test]
    fn non_accumulating_mode_replaces() {
        let mut state = SessionState::new(callbacks(&["weather", "currentTime"]));

        state.promote(vec!["currentTime".to_string()], false);
        state.promote(vec!["weather".to_string()], false);

        assert_eq!(state.discovered, vec!["weather"]);
    }

    #[test]
    fn unknown_names_are_dropped() {
        let mut state = SessionState::new(callbacks(&["weather"]));

        state.promote(
            vec!["weather".to_string(), "hallucinatedTool".to_string()],
            true,
        );

        assert_eq!(state.discovered, vec!["weather"]);
        assert_eq!(state.discovered_callbacks().len(), 1);
    }
}
