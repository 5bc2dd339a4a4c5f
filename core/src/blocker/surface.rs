use std::collections::HashMap;
use std::sync::Mutex;

use super::BlockingScope;
use crate::util::lock;

/// The foreground surface a presentation layer exposes to the engine.
///
/// Both methods are only ever called on the foreground coordinator.
pub trait ForegroundSurface: Send + Sync {
    /// Resolves a scope (and the optional element it is anchored to) into the
    /// concrete elements it covers right now.
    fn resolve(&self, scope: BlockingScope, target: Option<&str>) -> Vec<String>;

    fn set_blocked(&self, scope: BlockingScope, elements: &[String], blocked: bool);
}

/// Surface for hosts without a UI. Tracks nested blocks per element and
/// logs every change.
#[derive(Debug)]
pub struct HeadlessSurface {
    main_window: String,
    blocked: Mutex<HashMap<String, usize>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::with_main_window("main")
    }

    pub fn with_main_window(name: impl Into<String>) -> Self {
        Self {
            main_window: name.into(),
            blocked: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_blocked(&self, element: &str) -> bool {
        lock(&self.blocked).get(element).copied().unwrap_or(0) > 0
    }

    pub fn blocked_elements(&self) -> Vec<String> {
        let mut out: Vec<String> = lock(&self.blocked)
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, _)| k.clone())
            .collect();
        out.sort();
        out
    }
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundSurface for HeadlessSurface {
    fn resolve(&self, scope: BlockingScope, target: Option<&str>) -> Vec<String> {
        match scope {
            BlockingScope::None => Vec::new(),
            BlockingScope::Application => vec!["application".to_string()],
            BlockingScope::Window => {
                vec![format!("window:{}", target.unwrap_or(&self.main_window))]
            }
            BlockingScope::Component => {
                vec![format!("component:{}", target.unwrap_or("focused"))]
            }
            BlockingScope::Action => match target {
                Some(t) => vec![format!("action:{t}")],
                // an action scope with nothing to anchor to has nothing to disable
                None => Vec::new(),
            },
        }
    }

    fn set_blocked(&self, scope: BlockingScope, elements: &[String], blocked: bool) {
        let mut map = lock(&self.blocked);
        for element in elements {
            let count = map.entry(element.clone()).or_insert(0);
            if blocked {
                *count += 1;
            } else {
                *count = count.saturating_sub(1);
            }
            tracing::debug!(
                scope = %scope,
                element = %element,
                depth = *count,
                "{}",
                if blocked { "input blocked" } else { "input unblocked" }
            );
        }
        map.retain(|_, n| *n > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_scopes() {
        let surface = HeadlessSurface::with_main_window("editor");
        assert!(surface.resolve(BlockingScope::None, None).is_empty());
        assert_eq!(
            surface.resolve(BlockingScope::Window, None),
            vec!["window:editor"]
        );
        assert_eq!(
            surface.resolve(BlockingScope::Window, Some("prefs")),
            vec!["window:prefs"]
        );
        assert_eq!(
            surface.resolve(BlockingScope::Action, Some("save")),
            vec!["action:save"]
        );
        assert!(surface.resolve(BlockingScope::Action, None).is_empty());
    }

    #[test]
    fn test_nested_blocks() {
        let surface = HeadlessSurface::new();
        let elements = surface.resolve(BlockingScope::Application, None);
        surface.set_blocked(BlockingScope::Application, &elements, true);
        surface.set_blocked(BlockingScope::Application, &elements, true);
        surface.set_blocked(BlockingScope::Application, &elements, false);
        assert!(surface.is_blocked("application"));
        surface.set_blocked(BlockingScope::Application, &elements, false);
        assert!(!surface.is_blocked("application"));
        assert!(surface.blocked_elements().is_empty());
    }
}
